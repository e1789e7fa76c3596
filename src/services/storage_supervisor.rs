use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{services::sse_service::broadcast_system_status, state::SharedState};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Probe the remote store forever, keeping the shared state's degraded flag current.
///
/// A failing probe is retried with exponential backoff; a healthy store is
/// polled at a fixed interval.
pub async fn run(state: SharedState) {
    let mut delay = INITIAL_DELAY;
    let mut attempt: u32 = 0;

    loop {
        if probe(&state).await {
            delay = INITIAL_DELAY;
            attempt = 0;
            sleep(HEALTH_POLL_INTERVAL).await;
        } else {
            attempt += 1;
            sleep(delay).await;
            delay = (delay * 2).min(MAX_DELAY);
            if attempt % 10 == 0 {
                warn!(attempt, "storage still unreachable; staying in degraded mode");
            }
        }
    }
}

/// Run one health check and update the degraded flag. Returns whether the store is healthy.
pub async fn probe(state: &SharedState) -> bool {
    let store = state.engine().store();
    match store.health_check().await {
        Ok(()) => {
            if state.update_degraded(false) {
                info!(backend = %store.kind(), "storage healthy; leaving degraded mode");
                broadcast_system_status(state.sse(), false);
            }
            true
        }
        Err(err) => {
            if state.update_degraded(true) {
                warn!(backend = %store.kind(), error = %err, "storage health check failed; entering degraded mode");
                broadcast_system_status(state.sse(), true);
            }
            false
        }
    }
}
