use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::state::{session::SessionPhase, sync_engine::EngineView};

/// Sign-in payload; an empty body signs in anonymously.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct SignInRequest {
    /// Identity already established with the backend's auth service.
    #[validate(length(min = 1, max = 128))]
    #[serde(default)]
    pub uid: Option<String>,
    /// Bearer credential issued to `uid`; the backend verifies it before the
    /// session opens. Only the in-memory backend accepts a bare `uid`.
    #[validate(length(min = 1))]
    #[serde(default)]
    pub token: Option<String>,
    /// Lets the server renew `token` when it expires.
    #[validate(length(min = 1))]
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Current session, as seen by the engine.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub phase: SessionPhase,
    /// Bumped on every session transition.
    pub session_version: u64,
    pub identity: Option<String>,
    /// Profile claimed by `identity`, if any.
    pub active_player: Option<String>,
}

impl From<&EngineView> for SessionResponse {
    fn from(view: &EngineView) -> Self {
        Self {
            phase: view.session.phase,
            session_version: view.session.version,
            identity: view.identity.clone(),
            active_player: view.active_player().map(str::to_owned),
        }
    }
}
