use axum::{Json, Router, extract::State, routing::put};
use axum_valid::Valid;

use crate::{
    dto::scores::{ScoreUpdateResponse, UpdateScoreRequest},
    error::AppError,
    services::sync_service,
    state::SharedState,
};

/// Score edits for the caller's claimed profile.
pub fn router() -> Router<SharedState> {
    Router::new().route("/scores", put(update_score))
}

/// Set or clear one score. Edits arriving close together are written once.
#[utoipa::path(
    put,
    path = "/scores",
    tag = "scores",
    request_body = UpdateScoreRequest,
    responses(
        (status = 200, description = "Score written", body = ScoreUpdateResponse),
        (status = 400, description = "Value rejected"),
        (status = 403, description = "Profile not claimed by this login")
    )
)]
pub async fn update_score(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<UpdateScoreRequest>>,
) -> Result<Json<ScoreUpdateResponse>, AppError> {
    Ok(Json(sync_service::update_score(&state, payload).await?))
}
