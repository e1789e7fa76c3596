use serde::Serialize;
use utoipa::ToSchema;

/// Simple health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Remote store the engine talks to.
    pub backend: String,
}

impl HealthResponse {
    /// Create a health response indicating the system is operational.
    pub fn ok(backend: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            backend: backend.into(),
        }
    }

    /// Create a health response indicating the backend probe is failing.
    pub fn degraded(backend: impl Into<String>) -> Self {
        Self {
            status: "degraded".to_string(),
            backend: backend.into(),
        }
    }
}
