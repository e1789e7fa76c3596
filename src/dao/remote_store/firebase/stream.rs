//! Client side of the Realtime Database REST streaming protocol.
//!
//! The server speaks server-sent events: `put` replaces the value at a path,
//! `patch` replaces a set of children, `keep-alive` is a heartbeat. We mirror
//! the subscribed subtree locally and hand the whole normalized document to
//! the listener after every change. An `auth_revoked` event renews the ID
//! token and resumes the stream.

use std::time::Duration;

use futures::{Stream, StreamExt};
use rand::Rng;
use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::{
    error::{FirebaseDaoError, FirebaseResult},
    models::{StreamEvent, StreamPayload},
    store::FirebaseStore,
};
use crate::dao::{
    normalize::normalize,
    remote_store::SnapshotListener,
    storage::StorageError,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);

/// Keep a stream open for as long as the subscription lives, reconnecting with backoff.
pub(super) async fn follow(store: FirebaseStore, listener: SnapshotListener) {
    let mut delay = INITIAL_DELAY;

    'connect: loop {
        match store.open_stream().await {
            Ok(response) => {
                info!("Firebase event stream connected");
                delay = INITIAL_DELAY;
                let mut tree = Value::Null;
                let mut events = Box::pin(event_stream(response));

                while let Some(event) = events.next().await {
                    match event {
                        Ok(StreamEvent::Put(payload)) => {
                            apply_put(&mut tree, &payload.path, payload.data);
                            listener(Ok(normalize(&tree)));
                        }
                        Ok(StreamEvent::Patch(payload)) => {
                            apply_patch(&mut tree, &payload.path, payload.data);
                            listener(Ok(normalize(&tree)));
                        }
                        Ok(StreamEvent::KeepAlive) => {}
                        Ok(StreamEvent::Cancel) => {
                            listener(Err(FirebaseDaoError::StreamCancelled.into()));
                            break;
                        }
                        Ok(StreamEvent::AuthRevoked) => match store.refresh_identity().await {
                            Ok(_) => {
                                info!("resuming Firebase event stream with a renewed token");
                                continue 'connect;
                            }
                            Err(StorageError::Unauthenticated) => return,
                            Err(err) => {
                                warn!(error = %err, "could not renew the stream credential");
                                listener(Err(FirebaseDaoError::AuthRevoked.into()));
                                return;
                            }
                        },
                        Err(err) => {
                            listener(Err(err.into()));
                            break;
                        }
                    }
                }
                warn!("Firebase event stream ended; reconnecting");
            }
            Err(StorageError::Unauthenticated) => return,
            Err(err) => {
                warn!(error = %err, "Firebase event stream connection failed");
                listener(Err(err));
            }
        }

        sleep(jittered(delay)).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

fn jittered(delay: Duration) -> Duration {
    let spread = (delay.as_millis() / 4) as u64;
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

/// Split a streaming response body into protocol events.
fn event_stream(response: reqwest::Response) -> impl Stream<Item = FirebaseResult<StreamEvent>> {
    async_stream::try_stream! {
        let mut body = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|source| FirebaseDaoError::StreamRead { source })?;
            buffer.extend_from_slice(&chunk);

            while let Some(frame) = next_frame(&mut buffer) {
                if let Some(event) = parse_frame(&frame)? {
                    yield event;
                }
            }
        }
    }
}

/// Cut the first complete frame off `buffer`.
///
/// Frames end at a blank line. Bytes of an unfinished frame stay buffered, so
/// a UTF-8 sequence split across network chunks is decoded whole.
fn next_frame(buffer: &mut Vec<u8>) -> Option<String> {
    let lf = buffer
        .windows(2)
        .position(|window| window == b"\n\n")
        .map(|at| (at, 2));
    let crlf = buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|at| (at, 4));
    let (end, separator) = [lf, crlf].into_iter().flatten().min_by_key(|(at, _)| *at)?;

    let frame: Vec<u8> = buffer.drain(..end + separator).collect();
    Some(String::from_utf8_lossy(&frame[..end]).into_owned())
}

/// Parse one `event:`/`data:` frame. Unknown event names are skipped.
fn parse_frame(frame: &str) -> FirebaseResult<Option<StreamEvent>> {
    let mut name = None;
    let mut data = Vec::new();
    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("data:") {
            data.push(value.trim_start());
        }
    }
    let data = data.join("\n");

    let payload = |event: &str| {
        serde_json::from_str::<StreamPayload>(&data).map_err(|source| {
            FirebaseDaoError::MalformedEvent {
                event: event.to_owned(),
                source,
            }
        })
    };

    let event = match name {
        Some("put") => StreamEvent::Put(payload("put")?),
        Some("patch") => StreamEvent::Patch(payload("patch")?),
        Some("keep-alive") => StreamEvent::KeepAlive,
        Some("cancel") => StreamEvent::Cancel,
        Some("auth_revoked") => StreamEvent::AuthRevoked,
        Some(other) => {
            debug!(event = other, "ignoring unknown Firebase stream event");
            return Ok(None);
        }
        None => return Ok(None),
    };
    Ok(Some(event))
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Replace the value at `path`; `null` removes it.
///
/// The server sends dense lists as JSON arrays. Writing below one turns it
/// into a map keyed by position, which [`normalize`] reads back in order.
fn apply_put(tree: &mut Value, path: &str, data: Value) {
    let segments = segments(path);
    let Some((last, parents)) = segments.split_last() else {
        *tree = data;
        return;
    };

    let mut node = tree;
    for segment in parents {
        node = object_mut(node)
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if data.is_null() {
        if node.is_object() || node.is_array() {
            object_mut(node).remove(*last);
        }
        return;
    }
    object_mut(node).insert((*last).to_owned(), data);
}

/// View `node` as an object, keeping array elements under their index and
/// discarding scalars.
fn object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        let map = match node.take() {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            _ => Map::new(),
        };
        *node = Value::Object(map);
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just made an object"),
    }
}

/// Replace each child of `data` under `path`, leaving siblings alone.
fn apply_patch(tree: &mut Value, path: &str, data: Value) {
    let Value::Object(children) = data else {
        apply_put(tree, path, data);
        return;
    };
    let base = path.trim_end_matches('/');
    for (key, value) in children {
        apply_put(tree, &format!("{base}/{key}"), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_put_and_heartbeat_frames() {
        let frame = "event: put\ndata: {\"path\":\"/\",\"data\":{\"operatives\":[\"AA\"]}}\n\n";
        match parse_frame(frame).unwrap() {
            Some(StreamEvent::Put(payload)) => {
                assert_eq!(payload.path, "/");
                assert_eq!(payload.data, json!({"operatives": ["AA"]}));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let frame = "event: keep-alive\ndata: null\n\n";
        assert!(matches!(
            parse_frame(frame).unwrap(),
            Some(StreamEvent::KeepAlive)
        ));
        assert!(parse_frame("event: mystery\ndata: 1\n\n").unwrap().is_none());
        assert!(parse_frame("event: put\ndata: {oops\n\n").is_err());
    }

    #[test]
    fn put_replaces_nested_values_and_null_deletes() {
        let mut tree = Value::Null;
        apply_put(&mut tree, "/", json!({"scores": {"k1": 1}}));
        apply_put(&mut tree, "/scores/k2", json!(2));
        apply_put(&mut tree, "/userBindings/u1", json!("AA"));
        assert_eq!(
            tree,
            json!({"scores": {"k1": 1, "k2": 2}, "userBindings": {"u1": "AA"}})
        );

        apply_put(&mut tree, "/scores/k1", Value::Null);
        assert_eq!(tree["scores"], json!({"k2": 2}));
    }

    #[test]
    fn writes_below_a_list_keep_its_entries() {
        let mut tree = Value::Null;
        apply_put(&mut tree, "/", json!({"operatives": ["AA", "BB"]}));
        apply_put(&mut tree, "/operatives/2", json!("CC"));
        let players: Vec<_> = normalize(&tree).state.players.into_iter().collect();
        assert_eq!(players, vec!["AA", "BB", "CC"]);

        apply_put(&mut tree, "/operatives/0", Value::Null);
        let players: Vec<_> = normalize(&tree).state.players.into_iter().collect();
        assert_eq!(players, vec!["BB", "CC"]);

        let mut tree = json!({"operatives": ["AA"], "scores": {"k1": 1}});
        apply_patch(&mut tree, "/operatives", json!({"1": "BB", "11": "KK"}));
        let players: Vec<_> = normalize(&tree).state.players.into_iter().collect();
        assert_eq!(players, vec!["AA", "BB", "KK"]);
        assert_eq!(tree["scores"], json!({"k1": 1}));
    }

    #[test]
    fn deleting_under_a_scalar_leaves_it_alone() {
        let mut tree = json!({"scores": 3});
        apply_put(&mut tree, "/scores/k1", Value::Null);
        assert_eq!(tree, json!({"scores": 3}));
    }

    #[test]
    fn frames_are_cut_only_once_complete() {
        let frame = "event: put\ndata: {\"path\":\"/operatives/0\",\"data\":\"Zoë\"}\n\n";
        let bytes = frame.as_bytes();
        let split = frame.find('ë').unwrap() + 1;

        let mut buffer = bytes[..split].to_vec();
        assert!(next_frame(&mut buffer).is_none());
        buffer.extend_from_slice(&bytes[split..]);
        buffer.extend_from_slice(b"event: keep-alive\r\ndata: null\r\n\r\nevent: pu");

        let first = next_frame(&mut buffer).unwrap();
        match parse_frame(&first).unwrap() {
            Some(StreamEvent::Put(payload)) => assert_eq!(payload.data, json!("Zoë")),
            other => panic!("unexpected event {other:?}"),
        }
        let second = next_frame(&mut buffer).unwrap();
        assert!(matches!(parse_frame(&second).unwrap(), Some(StreamEvent::KeepAlive)));
        assert!(next_frame(&mut buffer).is_none());
        assert_eq!(buffer, b"event: pu");
    }

    #[test]
    fn patch_merges_children_only() {
        let mut tree = json!({"operatives": {"0": "AA"}, "scores": {"k1": 1}});
        apply_patch(&mut tree, "/", json!({"operatives": {"0": "AA", "1": "BB"}}));
        assert_eq!(tree["operatives"], json!({"0": "AA", "1": "BB"}));
        assert_eq!(tree["scores"], json!({"k1": 1}));

        let snapshot = normalize(&tree);
        assert_eq!(snapshot.state.players.len(), 2);
    }
}
