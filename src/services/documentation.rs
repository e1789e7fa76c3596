use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the scoreboard sync bridge.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::session::get_session,
        crate::routes::session::sign_in,
        crate::routes::session::sign_out,
        crate::routes::session::get_state,
        crate::routes::players::add_player,
        crate::routes::players::claim_player,
        crate::routes::scores::update_score,
        crate::routes::leaderboard::get_leaderboard,
        crate::routes::leaderboard::get_weekly_winners,
        crate::routes::admin::delete_player,
        crate::routes::admin::reset,
        crate::routes::sse::stream,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::SignInRequest,
            crate::dto::session::SessionResponse,
            crate::dto::state::StateResponse,
            crate::dto::players::AddPlayerRequest,
            crate::dto::players::ClaimResponse,
            crate::dto::players::ActionResponse,
            crate::dto::scores::UpdateScoreRequest,
            crate::dto::scores::ScoreUpdateResponse,
            crate::dto::leaderboard::LeaderboardResponse,
            crate::dto::leaderboard::WeeklyWinnersDto,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::StateChangedEvent,
            crate::state::session::SessionPhase,
            crate::state::cache::ChangeKind,
            crate::state::catalog::Activity,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "session", description = "Sign-in lifecycle and canonical state"),
        (name = "players", description = "Roster registration and claims"),
        (name = "scores", description = "Score edits"),
        (name = "leaderboard", description = "Derived weekly views"),
        (name = "admin", description = "Destructive operations gated by ADMIN_PASSWORD"),
        (name = "sse", description = "Server-sent events stream"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/session",
            "/state",
            "/players",
            "/players/{name}/claim",
            "/players/{name}",
            "/scores",
            "/reset",
            "/leaderboard",
            "/weekly-winners",
            "/sse",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
