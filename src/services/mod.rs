/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Derived scoreboard views.
pub mod leaderboard_service;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Background health probe toggling degraded mode.
pub mod storage_supervisor;
/// Session and mutation wrappers around the sync engine.
pub mod sync_service;
