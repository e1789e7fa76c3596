use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::state::sync_engine::ClaimOutcome;

/// Register a player name, or claim it when it already exists.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct AddPlayerRequest {
    /// Raw name; trimmed and upper-cased before use.
    #[validate(length(min = 1, max = 64))]
    pub name: String,
}

/// Result of an add-or-claim or claim request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimResponse {
    /// Sanitised player name.
    pub player: String,
    /// Whether the caller's identity is now bound to `player`.
    pub bound: bool,
}

impl From<ClaimOutcome> for ClaimResponse {
    fn from(outcome: ClaimOutcome) -> Self {
        Self {
            player: outcome.player,
            bound: outcome.bound,
        }
    }
}

/// Generic acknowledgement for destructive operations.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

impl ActionResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
