//! In-process copy of the shared state and the self-echo bookkeeping.
//!
//! Every local write is stamped with a fresh `seq`. The seq stays in
//! `awaiting_echo` until the subscription hands the write back. A delivery
//! carrying one of our own seqs while a newer one is still outstanding
//! describes a superseded state and is dropped; anything else replaces the
//! cache wholesale.
//!
//! Debounced score edits are queued here until they are flushed. Every
//! replacement re-applies the queue on top of the incoming state, so an
//! unflushed edit survives echoes and foreign deliveries alike.

use std::{collections::BTreeSet, mem};

use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{CanonicalState, ScoreKey, Snapshot, WriteOrigin};

/// Why the cached state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// Initial read after sign-in.
    Loaded,
    /// Optimistic local mutation or committed transaction.
    Local,
    /// Our own write came back through the subscription.
    SelfEcho,
    /// Another client changed the shared state.
    External,
    /// Session ended; the cache was emptied.
    Cleared,
}

/// Notification broadcast for every applied change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct StateChange {
    /// Cache version after the change.
    pub version: u64,
    /// What caused it.
    pub kind: ChangeKind,
}

/// Result of offering a subscription delivery to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// The delivery replaced the cached state.
    Applied(StateChange),
    /// One of our superseded writes; a newer local write is still in flight.
    SkippedStale { seq: u64, newest_pending: u64 },
}

/// Canonical state cache with version counter and echo tracking.
#[derive(Debug)]
pub struct StateCache {
    client: Uuid,
    state: CanonicalState,
    version: u64,
    next_seq: u64,
    awaiting_echo: BTreeSet<u64>,
    /// Highest of our own seqs seen in a delivery.
    echoed_through: u64,
    /// Score edits shown locally but not yet written, oldest first.
    queued: Vec<(ScoreKey, Option<f64>)>,
}

impl StateCache {
    /// Empty cache whose writes are stamped with `client`.
    pub fn new(client: Uuid) -> Self {
        Self {
            client,
            state: CanonicalState::default(),
            version: 0,
            next_seq: 0,
            awaiting_echo: BTreeSet::new(),
            echoed_through: 0,
            queued: Vec::new(),
        }
    }

    /// Current state, queued edits included.
    pub fn state(&self) -> &CanonicalState {
        &self.state
    }

    /// Monotonic counter bumped by every applied change.
    pub fn version(&self) -> u64 {
        self.version
    }

    #[cfg(test)]
    fn has_pending_echo(&self) -> bool {
        !self.awaiting_echo.is_empty()
    }

    /// Allocate the stamp for the next durable write.
    pub fn next_origin(&mut self) -> WriteOrigin {
        self.next_seq += 1;
        WriteOrigin {
            client: self.client,
            seq: self.next_seq,
        }
    }

    fn replace(&mut self, mut state: CanonicalState, kind: ChangeKind) -> StateChange {
        for (key, value) in &self.queued {
            if state.has_player(&key.player) {
                state.set_score(key, *value);
            }
        }
        self.state = state;
        self.version += 1;
        StateChange {
            version: self.version,
            kind,
        }
    }

    /// Install the result of the initial read.
    pub fn load(&mut self, snapshot: Snapshot) -> StateChange {
        self.awaiting_echo.clear();
        if let Some(origin) = snapshot.origin.filter(|origin| origin.client == self.client) {
            self.echoed_through = self.echoed_through.max(origin.seq);
        }
        self.replace(snapshot.state, ChangeKind::Loaded)
    }

    /// Show a score edit now and hold it until [`StateCache::take_queued`].
    pub fn queue_edit(&mut self, key: ScoreKey, value: Option<f64>) -> StateChange {
        self.queued.push((key, value));
        let state = self.state.clone();
        self.replace(state, ChangeKind::Local)
    }

    /// Hand over the queued edits for writing. The current state already contains them.
    pub fn take_queued(&mut self) -> Vec<(ScoreKey, Option<f64>)> {
        mem::take(&mut self.queued)
    }

    /// Apply a state about to be written under `origin` and await its echo.
    pub fn apply_local(&mut self, state: CanonicalState, origin: WriteOrigin) -> StateChange {
        self.awaiting_echo.insert(origin.seq);
        self.replace(state, ChangeKind::Local)
    }

    /// Apply a state a transaction already committed under `origin`.
    ///
    /// Returns `None` when the echo already arrived, since the cache then
    /// holds that state or something newer.
    pub fn apply_committed(
        &mut self,
        state: CanonicalState,
        origin: WriteOrigin,
    ) -> Option<StateChange> {
        if origin.seq <= self.echoed_through {
            return None;
        }
        Some(self.apply_local(state, origin))
    }

    /// Forget a write that never reached the backend.
    pub fn write_failed(&mut self, seq: u64) {
        self.awaiting_echo.remove(&seq);
    }

    /// Offer a subscription delivery to the cache.
    pub fn reconcile(&mut self, snapshot: Snapshot) -> Reconciliation {
        let own_seq = snapshot
            .origin
            .filter(|origin| origin.client == self.client)
            .map(|origin| origin.seq);

        let Some(seq) = own_seq else {
            return Reconciliation::Applied(self.replace(snapshot.state, ChangeKind::External));
        };

        self.echoed_through = self.echoed_through.max(seq);
        self.awaiting_echo.retain(|pending| *pending > seq);
        if let Some(newest_pending) = self.awaiting_echo.last().copied() {
            return Reconciliation::SkippedStale {
                seq,
                newest_pending,
            };
        }
        Reconciliation::Applied(self.replace(snapshot.state, ChangeKind::SelfEcho))
    }

    /// Empty the cache at the end of a session.
    pub fn clear(&mut self) -> StateChange {
        self.awaiting_echo.clear();
        self.queued.clear();
        self.replace(CanonicalState::default(), ChangeKind::Cleared)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(players: &[&str]) -> CanonicalState {
        let mut state = CanonicalState::default();
        for player in players {
            state.players.insert((*player).to_owned());
        }
        state
    }

    fn foreign(state: CanonicalState) -> Snapshot {
        Snapshot {
            state,
            origin: Some(WriteOrigin {
                client: Uuid::new_v4(),
                seq: 1,
            }),
        }
    }

    #[test]
    fn own_echo_is_classified_as_self_echo() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let origin = cache.next_origin();
        let optimistic = state_with(&["AA"]);
        cache.apply_local(optimistic.clone(), origin);

        let outcome = cache.reconcile(Snapshot {
            state: optimistic.clone(),
            origin: Some(origin),
        });

        assert!(matches!(
            outcome,
            Reconciliation::Applied(StateChange {
                kind: ChangeKind::SelfEcho,
                ..
            })
        ));
        assert_eq!(cache.state(), &optimistic);
        assert!(!cache.has_pending_echo());
    }

    #[test]
    fn superseded_echo_does_not_clobber_newer_optimistic_state() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let first = cache.next_origin();
        cache.apply_local(state_with(&["AA"]), first);
        let second = cache.next_origin();
        cache.apply_local(state_with(&["AA", "BB"]), second);

        let outcome = cache.reconcile(Snapshot {
            state: state_with(&["AA"]),
            origin: Some(first),
        });

        assert_eq!(
            outcome,
            Reconciliation::SkippedStale {
                seq: 1,
                newest_pending: 2
            }
        );
        assert_eq!(cache.state(), &state_with(&["AA", "BB"]));

        cache.reconcile(Snapshot {
            state: state_with(&["AA", "BB"]),
            origin: Some(second),
        });
        assert!(!cache.has_pending_echo());
    }

    #[test]
    fn foreign_deliveries_always_win() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let origin = cache.next_origin();
        cache.apply_local(state_with(&["AA"]), origin);

        let outcome = cache.reconcile(foreign(state_with(&["ZZ"])));

        assert!(matches!(
            outcome,
            Reconciliation::Applied(StateChange {
                kind: ChangeKind::External,
                ..
            })
        ));
        assert_eq!(cache.state(), &state_with(&["ZZ"]));
        // Our own write is still expected back.
        assert!(cache.has_pending_echo());
    }

    #[test]
    fn failed_writes_stop_blocking_older_echoes() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let first = cache.next_origin();
        cache.apply_local(state_with(&["AA"]), first);
        let second = cache.next_origin();
        cache.apply_local(state_with(&["AA", "BB"]), second);
        cache.write_failed(second.seq);

        let outcome = cache.reconcile(Snapshot {
            state: state_with(&["AA"]),
            origin: Some(first),
        });

        assert!(matches!(outcome, Reconciliation::Applied(_)));
        assert_eq!(cache.state(), &state_with(&["AA"]));
    }

    #[test]
    fn committed_state_arriving_after_its_echo_is_ignored() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let origin = cache.next_origin();
        cache.reconcile(Snapshot {
            state: state_with(&["AA"]),
            origin: Some(origin),
        });
        cache.reconcile(foreign(state_with(&["AA", "ZZ"])));

        assert_eq!(cache.apply_committed(state_with(&["AA"]), origin), None);
        assert_eq!(cache.state(), &state_with(&["AA", "ZZ"]));
    }

    fn key(player: &str) -> ScoreKey {
        ScoreKey::new(time::macros::date!(2024 - 01 - 01), player, "steps")
    }

    #[test]
    fn queued_edits_survive_echoes_and_foreign_deliveries() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let origin = cache.next_origin();
        cache.apply_local(state_with(&["AA"]), origin);
        cache.queue_edit(key("AA"), Some(4000.0));

        cache.reconcile(Snapshot {
            state: state_with(&["AA"]),
            origin: Some(origin),
        });
        assert_eq!(cache.state().scores[&key("AA").to_string()], 4000.0);

        cache.reconcile(foreign(state_with(&["AA", "ZZ"])));
        assert_eq!(cache.state().players.len(), 2);
        assert_eq!(cache.state().scores[&key("AA").to_string()], 4000.0);

        let queued = cache.take_queued();
        assert_eq!(queued, vec![(key("AA"), Some(4000.0))]);
        cache.reconcile(foreign(state_with(&["AA"])));
        assert!(cache.state().scores.is_empty());
    }

    #[test]
    fn queued_edits_for_removed_players_are_not_resurrected() {
        let mut cache = StateCache::new(Uuid::new_v4());
        cache.load(Snapshot {
            state: state_with(&["AA", "BB"]),
            origin: None,
        });
        cache.queue_edit(key("BB"), Some(10.0));

        cache.reconcile(foreign(state_with(&["AA"])));

        assert!(!cache.state().has_player("BB"));
        assert!(cache.state().scores.is_empty());
        cache.clear();
        assert!(cache.take_queued().is_empty());
    }

    #[test]
    fn versions_increase_with_every_applied_change() {
        let mut cache = StateCache::new(Uuid::new_v4());
        let loaded = cache.load(Snapshot::default());
        let cleared = cache.clear();
        assert_eq!(loaded.version, 1);
        assert_eq!(cleared.version, 2);
        assert_eq!(cleared.kind, ChangeKind::Cleared);
    }
}
