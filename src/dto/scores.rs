use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::dto::validation::{validate_activity_id, validate_date};

/// Set or clear one score of the caller's claimed profile.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateScoreRequest {
    /// Day the score belongs to (`YYYY-MM-DD`).
    #[validate(custom(function = validate_date))]
    pub date: String,
    /// Profile to edit; must be the caller's claimed profile.
    #[validate(length(min = 1, max = 64))]
    pub player: String,
    #[validate(custom(function = validate_activity_id))]
    pub activity: String,
    /// Raw value as typed; blank clears the entry.
    #[validate(length(max = 32))]
    pub value: String,
}

/// Acknowledgement returned once the debounced write settled.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreUpdateResponse {
    /// Cache version after the write.
    pub version: u64,
}
