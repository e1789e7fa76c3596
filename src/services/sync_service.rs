//! Session and mutation helpers behind the REST routes. They translate DTOs
//! into engine calls and engine errors into service errors.

use tracing::debug;

use crate::{
    dao::identity::Identity,
    dto::{
        players::{ActionResponse, AddPlayerRequest, ClaimResponse},
        scores::{ScoreUpdateResponse, UpdateScoreRequest},
        session::{SessionResponse, SignInRequest},
        state::StateResponse,
    },
    error::ServiceError,
    state::SharedState,
};

/// Refuse calls that need the backend while its health probe is failing.
fn ensure_available(state: &SharedState) -> Result<(), ServiceError> {
    if state.is_degraded() {
        return Err(ServiceError::Degraded);
    }
    Ok(())
}

/// Current session without the state payload.
pub async fn session(state: &SharedState) -> SessionResponse {
    SessionResponse::from(&state.engine().view().await)
}

/// Sign in with the supplied identity, or anonymously when none is given.
///
/// A supplied identity is checked with the backend's auth service, so a uid
/// only opens a session together with a token issued to it.
pub async fn sign_in(
    state: &SharedState,
    request: SignInRequest,
) -> Result<SessionResponse, ServiceError> {
    ensure_available(state)?;
    let identity = match (request.uid, request.token) {
        (Some(uid), token) => {
            let identity = Identity::new(uid, token);
            Some(match request.refresh_token {
                Some(refresh_token) => identity.with_refresh_token(refresh_token),
                None => identity,
            })
        }
        (None, Some(_)) => {
            return Err(ServiceError::InvalidInput(
                "a token must come with its uid".into(),
            ));
        }
        (None, None) => None,
    };

    let identity = state.engine().sign_in(identity).await?;
    debug!(uid = %identity.uid, "signed in through the API");
    Ok(session(state).await)
}

/// End the current session.
pub async fn sign_out(state: &SharedState) -> Result<SessionResponse, ServiceError> {
    state.engine().sign_out().await?;
    Ok(session(state).await)
}

/// Canonical state with the session it was read under.
pub async fn current_state(state: &SharedState) -> StateResponse {
    state.engine().view().await.into()
}

/// Register a player, or claim it when the name is taken.
pub async fn add_player(
    state: &SharedState,
    request: AddPlayerRequest,
) -> Result<ClaimResponse, ServiceError> {
    ensure_available(state)?;
    Ok(state.engine().add_or_claim(&request.name).await?.into())
}

/// Claim an existing player for the caller.
pub async fn claim_player(state: &SharedState, name: &str) -> Result<ClaimResponse, ServiceError> {
    ensure_available(state)?;
    Ok(state.engine().claim(name).await?.into())
}

/// Remove a player with every score and claim pointing at it.
pub async fn delete_player(state: &SharedState, name: &str) -> Result<ActionResponse, ServiceError> {
    ensure_available(state)?;
    state.engine().delete_player(name).await?;
    Ok(ActionResponse::new(format!("player `{}` deleted", name.trim().to_uppercase())))
}

/// Wipe the shared state.
pub async fn reset(state: &SharedState) -> Result<ActionResponse, ServiceError> {
    ensure_available(state)?;
    state.engine().reset_all().await?;
    Ok(ActionResponse::new("scoreboard reset"))
}

/// Set or clear one score; resolves once the coalesced write settled.
///
/// Allowed in degraded mode: the cache updates regardless and the write
/// outcome is reported.
pub async fn update_score(
    state: &SharedState,
    request: UpdateScoreRequest,
) -> Result<ScoreUpdateResponse, ServiceError> {
    let engine = state.engine();
    engine
        .update_score(&request.date, &request.player, &request.activity, &request.value)
        .await?;
    Ok(ScoreUpdateResponse {
        version: engine.view().await.version,
    })
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{
        dao::remote_store::memory::MemoryStore,
        state::{
            AppState,
            session::SessionPhase,
            sync_engine::{EngineSettings, SyncEngine},
        },
    };

    fn app_state() -> SharedState {
        let settings = EngineSettings {
            debounce: Duration::from_millis(10),
            ..EngineSettings::default()
        };
        let engine = SyncEngine::new(Arc::new(MemoryStore::new()), settings);
        let state = AppState::new(engine, None);
        state.update_degraded(false);
        state
    }

    #[tokio::test]
    async fn degraded_mode_refuses_sign_in() {
        let state = app_state();
        state.update_degraded(true);

        let err = sign_in(&state, SignInRequest::default()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn token_without_uid_is_rejected() {
        let state = app_state();
        let request = SignInRequest {
            token: Some("t".into()),
            ..SignInRequest::default()
        };

        let err = sign_in(&state, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn sign_in_claim_and_score_round_trip() {
        let state = app_state();
        let request = SignInRequest {
            uid: Some("u1".into()),
            ..SignInRequest::default()
        };
        let session = sign_in(&state, request).await.unwrap();
        assert_eq!(session.phase, SessionPhase::Live);
        assert_eq!(session.identity.as_deref(), Some("u1"));

        let claim = add_player(&state, AddPlayerRequest { name: " ace ".into() })
            .await
            .unwrap();
        assert_eq!(claim.player, "ACE");
        assert!(claim.bound);

        update_score(
            &state,
            UpdateScoreRequest {
                date: "2024-01-01".into(),
                player: "ACE".into(),
                activity: "steps".into(),
                value: "4200".into(),
            },
        )
        .await
        .unwrap();

        let snapshot = current_state(&state).await;
        assert_eq!(snapshot.session.active_player.as_deref(), Some("ACE"));
        assert_eq!(snapshot.scores.get("2024-01-01::ACE::steps"), Some(&4200.0));
    }

    #[cfg(feature = "firebase-store")]
    #[tokio::test]
    async fn asserted_uid_without_token_is_unauthorized() {
        use crate::dao::remote_store::firebase::{FirebaseConfig, FirebaseStore};

        let store = FirebaseStore::connect(FirebaseConfig::new("http://127.0.0.1:9")).unwrap();
        let engine = SyncEngine::new(Arc::new(store), EngineSettings::default());
        let state = AppState::new(engine, None);
        state.update_degraded(false);

        let request = SignInRequest {
            uid: Some("owner-of-ace".into()),
            ..SignInRequest::default()
        };
        let err = sign_in(&state, request).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        assert_eq!(session(&state).await.phase, SessionPhase::Unauthenticated);
    }

    #[tokio::test]
    async fn mutations_before_sign_in_are_unauthorized() {
        let state = app_state();

        let err = add_player(&state, AddPlayerRequest { name: "ACE".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
