use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use axum_valid::Valid;

use crate::{
    dto::players::{AddPlayerRequest, ClaimResponse},
    error::AppError,
    services::sync_service,
    state::SharedState,
};

/// Roster registration and claims.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/players", post(add_player))
        .route("/players/{name}/claim", post(claim_player))
}

/// Register a player and claim it, or claim it when the name already exists.
#[utoipa::path(
    post,
    path = "/players",
    tag = "players",
    request_body = AddPlayerRequest,
    responses(
        (status = 200, description = "Player registered or claimed", body = ClaimResponse),
        (status = 400, description = "Invalid player name"),
        (status = 409, description = "Roster full or profile claimed by another login")
    )
)]
pub async fn add_player(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<AddPlayerRequest>>,
) -> Result<Json<ClaimResponse>, AppError> {
    Ok(Json(sync_service::add_player(&state, payload).await?))
}

/// Bind the caller's login to an existing player.
#[utoipa::path(
    post,
    path = "/players/{name}/claim",
    tag = "players",
    params(("name" = String, Path, description = "Player name")),
    responses(
        (status = 200, description = "Player claimed", body = ClaimResponse),
        (status = 404, description = "Unknown player"),
        (status = 409, description = "Profile claimed by another login")
    )
)]
pub async fn claim_player(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<Json<ClaimResponse>, AppError> {
    Ok(Json(sync_service::claim_player(&state, &name).await?))
}
