use std::sync::Arc;

use tokio::sync::watch;

use crate::dao::storage::{StorageError, StorageResult};

/// Authenticated principal used for claims and for authorising backend requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable identity id used as the binding key.
    pub uid: String,
    /// Bearer credential forwarded to the backend, when it needs one.
    pub token: Option<String>,
    /// Long-lived credential exchanged for a fresh `token` once it expires.
    pub refresh_token: Option<String>,
}

impl Identity {
    /// Identity with an optional bearer token and no refresh credential.
    pub fn new(uid: impl Into<String>, token: Option<String>) -> Self {
        Self {
            uid: uid.into(),
            token,
            refresh_token: None,
        }
    }

    /// Attach the credential used to renew `token`.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }
}

/// Shared slot holding the currently established identity.
///
/// Cloned into every remote store so write-class calls can fail fast with
/// [`StorageError::Unauthenticated`] before touching the network.
#[derive(Clone)]
pub struct IdentitySlot {
    sender: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for IdentitySlot {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentitySlot {
    /// Empty slot.
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(None);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Identity currently installed, if any.
    pub fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    /// Identity currently installed, or [`StorageError::Unauthenticated`].
    pub fn require(&self) -> StorageResult<Identity> {
        self.current().ok_or(StorageError::Unauthenticated)
    }

    /// Install or clear the identity.
    pub fn set(&self, identity: Option<Identity>) {
        self.sender.send_replace(identity);
    }

    /// Swap in renewed credentials for the same uid.
    ///
    /// Returns `false` and leaves the slot alone when the session ended or
    /// changed hands while the renewal was in flight.
    pub fn renew(&self, identity: Identity) -> bool {
        self.sender.send_if_modified(|current| match current {
            Some(installed) if installed.uid == identity.uid => {
                *installed = identity;
                true
            }
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_fails_until_an_identity_is_set() {
        let slot = IdentitySlot::new();
        assert!(matches!(slot.require(), Err(StorageError::Unauthenticated)));

        slot.set(Some(Identity::new("u1", None)));
        assert_eq!(slot.require().unwrap().uid, "u1");

        slot.clone().set(None);
        assert!(slot.current().is_none());
    }

    #[test]
    fn renewal_only_applies_to_the_same_uid() {
        let slot = IdentitySlot::new();
        let renewed = Identity::new("u1", Some("fresh".into())).with_refresh_token("r2");
        assert!(!slot.renew(renewed.clone()));
        assert!(slot.current().is_none());

        slot.set(Some(Identity::new("u1", Some("stale".into())).with_refresh_token("r1")));
        assert!(slot.renew(renewed.clone()));
        assert_eq!(slot.current(), Some(renewed));

        slot.set(Some(Identity::new("u2", None)));
        assert!(!slot.renew(Identity::new("u1", Some("late".into()))));
        assert_eq!(slot.require().unwrap().uid, "u2");
    }
}
