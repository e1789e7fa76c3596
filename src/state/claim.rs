//! Update functions for the claim transactions.
//!
//! Both builders only express the abort predicates; retries after a lost
//! compare-and-set race are handled by the store.

use crate::dao::{
    models::CanonicalState,
    remote_store::{TxAbort, TxDecision, TxUpdate},
};

/// Bind `identity` to the existing profile `player`.
///
/// Idempotent for the current owner; an identity that already holds another
/// profile moves its binding.
pub fn claim_update(player: String, identity: String) -> TxUpdate {
    Box::new(move |current: &CanonicalState| claim(current, &player, &identity))
}

/// Register `player` and bind it to `identity`, or claim it when it already exists.
///
/// A freshly added profile is only bound when `identity` holds no profile yet.
pub fn add_or_claim_update(player: String, identity: String, max_players: usize) -> TxUpdate {
    Box::new(move |current: &CanonicalState| {
        if current.has_player(&player) {
            return claim(current, &player, &identity);
        }
        if current.players.len() >= max_players {
            return TxDecision::Abort(TxAbort::RosterFull { limit: max_players });
        }

        let mut next = current.clone();
        next.players.insert(player.clone());
        if next.binding_for(&identity).is_none() {
            next.bindings.insert(identity.clone(), player.clone());
        }
        TxDecision::Commit(next)
    })
}

fn claim(current: &CanonicalState, player: &str, identity: &str) -> TxDecision {
    if !current.has_player(player) {
        return TxDecision::Abort(TxAbort::ProfileNotFound {
            player: player.to_owned(),
        });
    }
    if current.owner_of(player).is_some_and(|owner| owner != identity) {
        return TxDecision::Abort(TxAbort::AlreadyClaimed {
            player: player.to_owned(),
        });
    }

    let mut next = current.clone();
    next.bindings.insert(identity.to_owned(), player.to_owned());
    TxDecision::Commit(next)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;

    use super::*;
    use crate::dao::{
        identity::Identity,
        models::WriteOrigin,
        remote_store::{RemoteStore, TransactOutcome, memory::MemoryStore},
    };

    fn origin() -> WriteOrigin {
        WriteOrigin {
            client: Uuid::new_v4(),
            seq: 1,
        }
    }

    fn roster(players: &[&str]) -> CanonicalState {
        let mut state = CanonicalState::default();
        for player in players {
            state.players.insert((*player).to_owned());
        }
        state
    }

    fn run(update: TxUpdate, state: &CanonicalState) -> TxDecision {
        let mut update = update;
        update(state)
    }

    #[test]
    fn claim_sequence_is_exclusive_and_idempotent() {
        let state = roster(&["AA"]);

        let TxDecision::Commit(state) = run(claim_update("AA".into(), "u1".into()), &state) else {
            panic!("first claim should commit");
        };
        assert_eq!(state.binding_for("u1"), Some("AA"));

        assert_eq!(
            run(claim_update("AA".into(), "u2".into()), &state),
            TxDecision::Abort(TxAbort::AlreadyClaimed {
                player: "AA".into()
            })
        );
        assert_eq!(
            run(claim_update("AA".into(), "u1".into()), &state),
            TxDecision::Commit(state.clone())
        );
    }

    #[test]
    fn claiming_a_missing_profile_aborts() {
        assert_eq!(
            run(claim_update("ZZ".into(), "u1".into()), &roster(&["AA"])),
            TxDecision::Abort(TxAbort::ProfileNotFound {
                player: "ZZ".into()
            })
        );
    }

    #[test]
    fn reclaiming_moves_the_binding() {
        let mut state = roster(&["AA", "BB"]);
        state.bindings.insert("u1".into(), "AA".into());

        let TxDecision::Commit(next) = run(claim_update("BB".into(), "u1".into()), &state) else {
            panic!("reclaim should commit");
        };
        assert_eq!(next.binding_for("u1"), Some("BB"));
        assert_eq!(next.owner_of("AA"), None);
    }

    #[test]
    fn adding_keeps_an_existing_binding() {
        let mut state = roster(&["AA"]);
        state.bindings.insert("u1".into(), "AA".into());

        let TxDecision::Commit(next) = run(add_or_claim_update("BB".into(), "u1".into(), 10), &state)
        else {
            panic!("add should commit");
        };
        assert!(next.has_player("BB"));
        assert_eq!(next.binding_for("u1"), Some("AA"));
        assert_eq!(next.owner_of("BB"), None);
    }

    #[test]
    fn full_roster_refuses_new_names_but_allows_claims() {
        let state = roster(&["AA", "BB"]);
        assert_eq!(
            run(add_or_claim_update("CC".into(), "u1".into(), 2), &state),
            TxDecision::Abort(TxAbort::RosterFull { limit: 2 })
        );
        assert!(matches!(
            run(add_or_claim_update("AA".into(), "u1".into(), 2), &state),
            TxDecision::Commit(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_add_or_claim_yields_one_entry_and_one_binding() {
        let store = MemoryStore::new();
        store.identity().set(Some(Identity::new("u1", None)));
        let store = Arc::new(store);

        let first = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .transact(origin(), add_or_claim_update("CC".into(), "u1".into(), 10))
                    .await
            })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .transact(origin(), add_or_claim_update("CC".into(), "u2".into(), 10))
                    .await
            })
        };

        let outcomes = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
        let committed = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, TransactOutcome::Committed(_)))
            .count();
        let refused = outcomes
            .iter()
            .filter(|outcome| {
                matches!(
                    outcome,
                    TransactOutcome::Aborted {
                        reason: TxAbort::AlreadyClaimed { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!((committed, refused), (1, 1));

        let state = store.read().await.unwrap().state;
        assert_eq!(state.players.iter().filter(|p| *p == "CC").count(), 1);
        assert_eq!(state.bindings.len(), 1);
    }
}
