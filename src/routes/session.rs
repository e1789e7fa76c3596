use axum::{Json, Router, extract::State, routing::get};
use axum_valid::Valid;

use crate::{
    dto::{
        session::{SessionResponse, SignInRequest},
        state::StateResponse,
    },
    error::AppError,
    services::sync_service,
    state::SharedState,
};

/// Session lifecycle and the canonical state snapshot.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/session",
            get(get_session).post(sign_in).delete(sign_out),
        )
        .route("/state", get(get_state))
}

/// Describe the current session.
#[utoipa::path(
    get,
    path = "/session",
    tag = "session",
    responses((status = 200, description = "Current session", body = SessionResponse))
)]
pub async fn get_session(State(state): State<SharedState>) -> Json<SessionResponse> {
    Json(sync_service::session(&state).await)
}

/// Sign in with a supplied identity, or anonymously with an empty object.
#[utoipa::path(
    post,
    path = "/session",
    tag = "session",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Session is live", body = SessionResponse),
        (status = 503, description = "Backend unreachable")
    )
)]
pub async fn sign_in(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<SignInRequest>>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(sync_service::sign_in(&state, payload).await?))
}

/// End the current session.
#[utoipa::path(
    delete,
    path = "/session",
    tag = "session",
    responses(
        (status = 200, description = "Session ended", body = SessionResponse),
        (status = 409, description = "No session to end")
    )
)]
pub async fn sign_out(State(state): State<SharedState>) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(sync_service::sign_out(&state).await?))
}

/// Canonical state, session phase and cache version.
#[utoipa::path(
    get,
    path = "/state",
    tag = "session",
    responses((status = 200, description = "Cached canonical state", body = StateResponse))
)]
pub async fn get_state(State(state): State<SharedState>) -> Json<StateResponse> {
    Json(sync_service::current_state(&state).await)
}
