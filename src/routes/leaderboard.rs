use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::leaderboard::{LeaderboardQuery, LeaderboardResponse, WeeklyWinnersDto},
    services::leaderboard_service,
    state::SharedState,
};

/// Derived scoreboard views.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/leaderboard", get(get_leaderboard))
        .route("/weekly-winners", get(get_weekly_winners))
}

/// Rankings, MVP, lead feed and the caller's duels for one week.
#[utoipa::path(
    get,
    path = "/leaderboard",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Weekly leaderboard", body = LeaderboardResponse))
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<LeaderboardQuery>>,
) -> Json<LeaderboardResponse> {
    Json(leaderboard_service::leaderboard(&state, &query).await)
}

/// Winners of every recorded week, newest first.
#[utoipa::path(
    get,
    path = "/weekly-winners",
    tag = "leaderboard",
    responses((status = 200, description = "Weekly winner history", body = [WeeklyWinnersDto]))
)]
pub async fn get_weekly_winners(State(state): State<SharedState>) -> Json<Vec<WeeklyWinnersDto>> {
    Json(leaderboard_service::weekly_winners(&state).await)
}
