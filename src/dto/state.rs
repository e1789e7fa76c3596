use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dto::session::SessionResponse,
    state::sync_engine::EngineView,
};

/// Canonical state plus the session and cache version it was read at.
#[derive(Debug, Serialize, ToSchema)]
pub struct StateResponse {
    pub session: SessionResponse,
    /// Cache version; matches the `version` of `state_changed` events.
    pub version: u64,
    /// Roster in registration order.
    pub players: Vec<String>,
    /// `date::PLAYER::activity` keys to values.
    pub scores: BTreeMap<String, f64>,
    /// Identity id to claimed player.
    pub bindings: BTreeMap<String, String>,
}

impl From<EngineView> for StateResponse {
    fn from(view: EngineView) -> Self {
        let session = SessionResponse::from(&view);
        Self {
            session,
            version: view.version,
            players: view.state.players.into_iter().collect(),
            scores: view.state.scores,
            bindings: view.state.bindings,
        }
    }
}
