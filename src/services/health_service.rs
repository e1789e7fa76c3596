use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the degraded flag while logging a failing probe.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let store = state.engine().store();
    if let Err(err) = store.health_check().await {
        warn!(error = %err, "storage health check failed");
    }

    let backend = store.kind().to_string();
    if state.is_degraded() {
        HealthResponse::degraded(backend)
    } else {
        HealthResponse::ok(backend)
    }
}
