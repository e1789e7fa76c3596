use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::{
    dto::sse::{Handshake, ServerEvent, StateChangedEvent, SystemStatus},
    state::{SharedState, SseHub},
};

/// Subscribe to the shared SSE stream.
pub fn subscribe(state: &SharedState) -> broadcast::Receiver<ServerEvent> {
    state.sse().subscribe()
}

/// First event sent to a freshly connected client.
pub async fn handshake(state: &SharedState) -> Option<ServerEvent> {
    let view = state.engine().view().await;
    ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            message: "scoreboard stream connected".into(),
            degraded: state.is_degraded(),
            phase: view.session.phase,
            version: view.version,
        },
    )
    .ok()
}

/// Convert a broadcast receiver into an SSE response, forwarding events until
/// the client disconnects.
pub fn to_sse_stream(
    initial: Option<ServerEvent>,
    mut receiver: broadcast::Receiver<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(payload) = initial {
            if tx.send(Ok(to_event(payload))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            // Clients refetch on the next change anyway.
                            debug!(skipped, "SSE client lagging");
                            continue;
                        }
                    }
                }
            }
        }

        info!("SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

/// Relay every engine state change onto the SSE hub as a `state_changed` event.
///
/// Runs until the engine is dropped.
pub async fn forward_state_changes(state: SharedState) {
    let mut changes = state.engine().subscribe_changes();
    loop {
        match changes.recv().await {
            Ok(change) => {
                let payload = StateChangedEvent {
                    version: change.version,
                    kind: change.kind,
                };
                match ServerEvent::json(Some("state_changed".to_string()), &payload) {
                    Ok(event) => state.sse().broadcast(event),
                    Err(err) => warn!(error = %err, "failed to serialise state change"),
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "state change forwarder lagging");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Announce a degraded mode change to every SSE client.
pub fn broadcast_system_status(hub: &SseHub, degraded: bool) {
    if let Ok(event) = ServerEvent::json(Some("system_status".to_string()), &SystemStatus { degraded })
    {
        hub.broadcast(event);
    }
}
