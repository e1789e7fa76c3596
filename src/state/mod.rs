//! Domain state: the sync engine, its cache and the pure scoring logic.

/// Weekly totals, rankings and winners.
pub mod aggregation;
/// Canonical state cache and self-echo reconciliation.
pub mod cache;
/// Activity catalog and rank tiers.
pub mod catalog;
/// Claim transaction update functions.
pub mod claim;
/// Player name and score input validation.
pub mod input;
/// Session state machine.
pub mod session;
mod sse;
/// Engine coordinating sessions, writes and subscriptions.
pub mod sync_engine;

use std::sync::Arc;

use tokio::sync::watch;

pub use self::sse::SseHub;
use self::sync_engine::SyncEngine;

/// Shared handle passed to every route.
pub type SharedState = Arc<AppState>;

const SSE_CAPACITY: usize = 32;

/// Central application state wiring the engine to the HTTP surface.
pub struct AppState {
    engine: Arc<SyncEngine>,
    sse: SseHub,
    degraded: watch::Sender<bool>,
    admin_password: Option<String>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until the first successful health probe.
    pub fn new(engine: Arc<SyncEngine>, admin_password: Option<String>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            engine,
            sse: SseHub::new(SSE_CAPACITY),
            degraded: degraded_tx,
            admin_password: admin_password.filter(|password| !password.is_empty()),
        })
    }

    /// The sync engine shared by every request.
    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Broadcast hub used for the SSE stream.
    pub fn sse(&self) -> &SseHub {
        &self.sse
    }

    /// Secret required by destructive routes, when configured.
    pub fn admin_password(&self) -> Option<&str> {
        self.admin_password.as_deref()
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Update the degraded flag, returning whether it changed.
    pub fn update_degraded(&self, value: bool) -> bool {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::remote_store::memory::MemoryStore, state::sync_engine::EngineSettings,
    };

    fn app_state(password: Option<&str>) -> SharedState {
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()), EngineSettings::default());
        AppState::new(engine, password.map(str::to_owned))
    }

    #[test]
    fn degraded_flag_only_reports_real_changes() {
        let state = app_state(None);
        assert!(state.is_degraded());
        assert!(!state.update_degraded(true));
        assert!(state.update_degraded(false));
        assert!(!state.is_degraded());
    }

    #[test]
    fn empty_admin_password_counts_as_unset() {
        assert_eq!(app_state(Some("")).admin_password(), None);
        assert_eq!(app_state(Some("s3cret")).admin_password(), Some("s3cret"));
    }
}
