//! Row-change push over Supabase Realtime.
//!
//! The socket speaks Phoenix channels: join a topic carrying a
//! `postgres_changes` filter on the managed row, send a heartbeat every 25
//! seconds, and refetch the row whenever a change is announced. While the
//! channel cannot be joined the row is polled at the configured interval.

use std::time::Duration;

use futures::{Sink, SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    config::SupabaseConfig,
    error::{SupabaseDaoError, SupabaseResult},
    models::{ChannelFrame, CompetitionRow},
    store::{SupabaseStore, snapshot_of},
};
use crate::dao::{
    remote_store::{RemoteStore, SnapshotListener},
    storage::StorageError,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
/// How long to poll before trying the channel again.
const FALLBACK_WINDOW: Duration = Duration::from_secs(30);
const REJOIN_DELAY: Duration = Duration::from_secs(1);
const JOIN_REF: &str = "1";

type RowMarker = Option<(Option<Uuid>, Option<String>)>;

/// What an incoming channel message means for the subscription.
#[derive(Debug, PartialEq)]
enum ChannelSignal {
    Joined,
    Rejected(String),
    RowChanged,
    Closed,
    Ignored,
}

/// Deliver the row now and after every change until the subscription is dropped.
pub(super) async fn follow(store: SupabaseStore, listener: SnapshotListener) {
    let mut last_seen: Option<RowMarker> = None;

    loop {
        // Picks up anything missed while the channel was down.
        if !deliver_if_changed(&store, &listener, &mut last_seen).await {
            return;
        }

        if !store.config().realtime {
            poll(&store, &listener, &mut last_seen, None).await;
            return;
        }

        match listen(&store, &listener, &mut last_seen).await {
            Ok(true) => {
                debug!("Supabase realtime channel closed; rejoining");
                sleep(REJOIN_DELAY).await;
            }
            Ok(false) => return,
            Err(err) => {
                warn!(error = %err, "Supabase realtime unavailable; polling");
                if !poll(&store, &listener, &mut last_seen, Some(FALLBACK_WINDOW)).await {
                    return;
                }
            }
        }
    }
}

fn marker_of(row: &CompetitionRow) -> (Option<Uuid>, Option<String>) {
    (row.revision, row.updated_at.clone())
}

/// Fetch the row and deliver it when its revision moved. `false` once signed out.
async fn deliver_if_changed(
    store: &SupabaseStore,
    listener: &SnapshotListener,
    last_seen: &mut Option<RowMarker>,
) -> bool {
    match store.fetch_row().await {
        Ok(row) => {
            let marker = row.as_ref().map(marker_of);
            if last_seen.as_ref() != Some(&marker) {
                listener(Ok(snapshot_of(row.as_ref())));
                *last_seen = Some(marker);
            }
            true
        }
        Err(StorageError::Unauthenticated) => false,
        Err(err) => {
            listener(Err(err));
            true
        }
    }
}

/// Poll for `window`, or for good when `None`. `false` once signed out.
async fn poll(
    store: &SupabaseStore,
    listener: &SnapshotListener,
    last_seen: &mut Option<RowMarker>,
    window: Option<Duration>,
) -> bool {
    let deadline = window.map(|window| Instant::now() + window);
    let mut ticker = interval(store.config().poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if !deliver_if_changed(store, listener, last_seen).await {
            return false;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return true;
        }
    }
}

/// Join the row channel and refetch on every announced change.
///
/// `Ok(true)` when the server closed the channel, `Ok(false)` once signed out.
async fn listen(
    store: &SupabaseStore,
    listener: &SnapshotListener,
    last_seen: &mut Option<RowMarker>,
) -> SupabaseResult<bool> {
    let Some(identity) = store.identity().current() else {
        return Ok(false);
    };
    let config = store.config();
    let url = config.realtime_url();
    let (socket, _response) = connect_async(url.as_str())
        .await
        .map_err(|source| socket_error(&url, source))?;
    let (mut sink, mut frames) = socket.split();

    let topic = channel_topic(config);
    send(&mut sink, &url, join_frame(config, &topic, identity.token.as_deref())).await?;

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    heartbeat.tick().await;
    let mut next_ref: u64 = 2;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                send(&mut sink, &url, heartbeat_frame(next_ref)).await?;
                next_ref += 1;
            }
            frame = frames.next() => {
                let text = match frame {
                    None | Some(Ok(Message::Close(_))) => return Ok(true),
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    Some(Err(source)) => return Err(socket_error(&url, source)),
                };
                match classify(&text, &topic) {
                    ChannelSignal::Joined => info!(%topic, "Supabase realtime channel joined"),
                    ChannelSignal::Rejected(reason) => {
                        return Err(SupabaseDaoError::RealtimeRejected { reason });
                    }
                    ChannelSignal::RowChanged => {
                        if !deliver_if_changed(store, listener, last_seen).await {
                            return Ok(false);
                        }
                    }
                    ChannelSignal::Closed => return Ok(true),
                    ChannelSignal::Ignored => {}
                }
            }
        }
    }
}

async fn send<S>(sink: &mut S, url: &str, frame: Value) -> SupabaseResult<()>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    sink.send(Message::text(frame.to_string()))
        .await
        .map_err(|source| socket_error(url, source))
}

fn socket_error(url: &str, source: tungstenite::Error) -> SupabaseDaoError {
    SupabaseDaoError::RealtimeSocket {
        url: url.to_owned(),
        source: Box::new(source),
    }
}

fn channel_topic(config: &SupabaseConfig) -> String {
    format!("realtime:{}:{}", config.table, config.row_id)
}

fn join_frame(config: &SupabaseConfig, topic: &str, access_token: Option<&str>) -> Value {
    let mut payload = json!({
        "config": {
            "broadcast": {"ack": false, "self": false},
            "presence": {"key": ""},
            "postgres_changes": [{
                "event": "*",
                "schema": "public",
                "table": config.table,
                "filter": format!("id=eq.{}", config.row_id),
            }],
            "private": false,
        }
    });
    if let Some(token) = access_token {
        payload["access_token"] = json!(token);
    }
    json!({
        "topic": topic,
        "event": "phx_join",
        "payload": payload,
        "ref": JOIN_REF,
        "join_ref": JOIN_REF,
    })
}

fn heartbeat_frame(reference: u64) -> Value {
    json!({
        "topic": "phoenix",
        "event": "heartbeat",
        "payload": {},
        "ref": reference.to_string(),
    })
}

fn classify(text: &str, topic: &str) -> ChannelSignal {
    let Ok(frame) = serde_json::from_str::<ChannelFrame>(text) else {
        debug!("ignoring unreadable realtime frame");
        return ChannelSignal::Ignored;
    };
    if frame.topic != topic {
        return ChannelSignal::Ignored;
    }

    let status = frame.payload.get("status").and_then(Value::as_str);
    match frame.event.as_str() {
        "phx_reply" if frame.reference.as_deref() == Some(JOIN_REF) => match status {
            Some("ok") => ChannelSignal::Joined,
            _ => ChannelSignal::Rejected(reason_of(&frame.payload)),
        },
        "postgres_changes" => ChannelSignal::RowChanged,
        "system" if status == Some("error") => ChannelSignal::Rejected(reason_of(&frame.payload)),
        "phx_error" | "phx_close" => ChannelSignal::Closed,
        _ => ChannelSignal::Ignored,
    }
}

fn reason_of(payload: &Value) -> String {
    payload
        .pointer("/response/reason")
        .or_else(|| payload.get("message"))
        .and_then(Value::as_str)
        .unwrap_or("no reason given")
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SupabaseConfig {
        SupabaseConfig::new("https://ref.supabase.co", "anon").with_row_id("week1")
    }

    #[test]
    fn join_filters_on_the_managed_row() {
        let config = config();
        let topic = channel_topic(&config);
        assert_eq!(topic, "realtime:competition:week1");

        let frame = join_frame(&config, &topic, Some("jwt"));
        assert_eq!(frame["event"], "phx_join");
        assert_eq!(frame["ref"], JOIN_REF);
        assert_eq!(frame["payload"]["access_token"], "jwt");
        let changes = &frame["payload"]["config"]["postgres_changes"][0];
        assert_eq!(changes["table"], "competition");
        assert_eq!(changes["filter"], "id=eq.week1");

        let anonymous = join_frame(&config, &topic, None);
        assert!(anonymous["payload"].get("access_token").is_none());
    }

    #[test]
    fn heartbeats_use_the_phoenix_topic() {
        let frame = heartbeat_frame(7);
        assert_eq!(frame["topic"], "phoenix");
        assert_eq!(frame["ref"], "7");
    }

    #[test]
    fn channel_messages_are_classified() {
        let topic = channel_topic(&config());
        let frame = |event: &str, payload: Value, reference: Option<&str>| {
            json!({"topic": topic, "event": event, "payload": payload, "ref": reference})
                .to_string()
        };

        assert_eq!(
            classify(&frame("phx_reply", json!({"status": "ok", "response": {}}), Some("1")), &topic),
            ChannelSignal::Joined
        );
        assert_eq!(
            classify(
                &frame(
                    "phx_reply",
                    json!({"status": "error", "response": {"reason": "invalid JWT"}}),
                    Some("1")
                ),
                &topic
            ),
            ChannelSignal::Rejected("invalid JWT".into())
        );
        assert_eq!(
            classify(
                &frame(
                    "postgres_changes",
                    json!({"data": {"type": "UPDATE", "table": "competition"}}),
                    None
                ),
                &topic
            ),
            ChannelSignal::RowChanged
        );
        assert_eq!(
            classify(
                &frame(
                    "system",
                    json!({"status": "error", "message": "publication missing"}),
                    None
                ),
                &topic
            ),
            ChannelSignal::Rejected("publication missing".into())
        );
        assert_eq!(
            classify(&frame("phx_close", json!({}), Some("1")), &topic),
            ChannelSignal::Closed
        );
        // Heartbeat replies arrive on the phoenix topic.
        let heartbeat_reply =
            json!({"topic": "phoenix", "event": "phx_reply", "payload": {"status": "ok"}, "ref": "1"});
        assert_eq!(
            classify(&heartbeat_reply.to_string(), &topic),
            ChannelSignal::Ignored
        );
        assert_eq!(classify("not json", &topic), ChannelSignal::Ignored);
    }
}
