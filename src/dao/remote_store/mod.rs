pub mod cas;
#[cfg(feature = "firebase-store")]
pub mod firebase;
pub mod memory;
#[cfg(feature = "supabase-store")]
pub mod supabase;

use std::{
    fmt,
    str::FromStr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

use crate::dao::{
    identity::{Identity, IdentitySlot},
    models::{CanonicalState, Snapshot, WriteOrigin},
    storage::StorageResult,
};

/// Push listener invoked with every normalized snapshot (or delivery failure).
pub type SnapshotListener = Arc<dyn Fn(StorageResult<Snapshot>) + Send + Sync>;

/// Update function run inside a transaction; may be re-run after a lost race.
pub type TxUpdate = Box<dyn FnMut(&CanonicalState) -> TxDecision + Send>;

/// Uniform contract over the backends holding the shared tracker state.
pub trait RemoteStore: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;
    /// Slot consulted before every read, write, subscribe and transaction.
    fn identity(&self) -> &IdentitySlot;
    /// Obtain a fresh anonymous identity from the backend's auth service.
    fn sign_in_anonymously(&self) -> BoxFuture<'static, StorageResult<Identity>>;
    /// Check a caller-supplied identity with the backend's auth service.
    ///
    /// Resolves to the identity to install. A missing or invalid credential,
    /// or one issued to another uid, fails with `Unauthenticated`.
    fn verify_identity(&self, identity: Identity) -> BoxFuture<'static, StorageResult<Identity>>;
    /// Fetch the current durable state; an empty backend yields an empty state.
    fn read(&self) -> BoxFuture<'static, StorageResult<Snapshot>>;
    /// Replace the durable state wholesale.
    fn write(
        &self,
        state: CanonicalState,
        origin: WriteOrigin,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Register a push listener; the current state is delivered first.
    fn subscribe(&self, listener: SnapshotListener) -> StorageResult<Subscription>;
    /// Atomic read-modify-write, retried internally on concurrent modification.
    fn transact(
        &self,
        origin: WriteOrigin,
        update: TxUpdate,
    ) -> BoxFuture<'static, StorageResult<TransactOutcome>>;
    /// Cheap reachability probe that does not require an identity.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Decision returned by a transaction update function.
#[derive(Debug, Clone, PartialEq)]
pub enum TxDecision {
    /// Write this state if nothing changed since the update ran.
    Commit(CanonicalState),
    /// Write nothing.
    Abort(TxAbort),
}

/// Business reason for refusing to commit a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAbort {
    /// The targeted player is not on the roster.
    ProfileNotFound { player: String },
    /// The targeted player is bound to a different identity.
    AlreadyClaimed { player: String },
    /// Adding another player would exceed the roster capacity.
    RosterFull { limit: usize },
}

/// Final result of a transaction; races are never visible here.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactOutcome {
    /// The state now durable.
    Committed(CanonicalState),
    /// The update refused to commit against `current`.
    Aborted {
        /// Why the update refused.
        reason: TxAbort,
        /// State the update last ran against.
        current: CanonicalState,
    },
}

/// Handle to a live subscription. Disposing is idempotent and also happens on drop.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
    disposed: AtomicBool,
}

impl Subscription {
    /// Wrap the task that feeds a listener.
    pub fn from_task(task: JoinHandle<()>) -> Self {
        Self {
            task,
            disposed: AtomicBool::new(false),
        }
    }

    /// Stop delivering snapshots.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.task.abort();
        }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        !self.disposed.load(Ordering::Acquire) && !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Backend variants selectable by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Realtime tree store (Firebase Realtime Database).
    Firebase,
    /// Relational single-row store (Supabase).
    Supabase,
    /// In-process store used for tests and offline demos.
    Memory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::Firebase => "firebase",
            BackendKind::Supabase => "supabase",
            BackendKind::Memory => "memory",
        })
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "firebase" | "rtdb" => Ok(BackendKind::Firebase),
            "supabase" => Ok(BackendKind::Supabase),
            "memory" => Ok(BackendKind::Memory),
            other => Err(format!("unknown backend `{other}`")),
        }
    }
}

/// Build the configured remote store from environment variables.
pub async fn connect(kind: BackendKind) -> StorageResult<Arc<dyn RemoteStore>> {
    match kind {
        #[cfg(feature = "firebase-store")]
        BackendKind::Firebase => {
            let config = firebase::FirebaseConfig::from_env()?;
            Ok(Arc::new(firebase::FirebaseStore::connect(config)?))
        }
        #[cfg(feature = "supabase-store")]
        BackendKind::Supabase => {
            let config = supabase::SupabaseConfig::from_env()?;
            Ok(Arc::new(supabase::SupabaseStore::connect(config)?))
        }
        BackendKind::Memory => Ok(Arc::new(memory::MemoryStore::new())),
        #[allow(unreachable_patterns)]
        other => Err(crate::dao::storage::StorageError::unavailable(
            format!("backend `{other}` is not compiled in"),
            std::io::Error::from(std::io::ErrorKind::Unsupported),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("Firebase".parse::<BackendKind>(), Ok(BackendKind::Firebase));
        assert_eq!("supabase".parse::<BackendKind>(), Ok(BackendKind::Supabase));
        assert_eq!(" memory ".parse::<BackendKind>(), Ok(BackendKind::Memory));
        assert!("mongo".parse::<BackendKind>().is_err());
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let subscription = Subscription::from_task(tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }));
        assert!(subscription.is_active());
        subscription.dispose();
        subscription.dispose();
        assert!(!subscription.is_active());
    }
}
