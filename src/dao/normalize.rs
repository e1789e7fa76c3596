//! Reshapes raw backend payloads into the canonical tracker state.
//!
//! Backends disagree on how they hand back the same document: the realtime
//! tree turns dense arrays into maps keyed by position, empty containers
//! disappear entirely, and rows may carry `null` columns. Everything funnels
//! through [`normalize`] so the rest of the crate only sees [`Snapshot`].

use serde_json::{Map, Value};
use tracing::debug;

use crate::dao::models::{
    BINDINGS_FIELD, BindingMap, CanonicalState, ORIGIN_FIELD, PLAYERS_FIELD, Roster,
    SCORES_FIELD, ScoreMap, Snapshot, WriteOrigin,
};

/// Normalize a raw durable document. `null` or non-object payloads yield an empty state.
pub fn normalize(raw: &Value) -> Snapshot {
    let Some(document) = raw.as_object() else {
        return Snapshot::default();
    };

    Snapshot {
        state: CanonicalState {
            players: normalize_players(document.get(PLAYERS_FIELD)),
            scores: normalize_scores(document.get(SCORES_FIELD)),
            bindings: normalize_bindings(document.get(BINDINGS_FIELD)),
        },
        origin: document
            .get(ORIGIN_FIELD)
            .and_then(|origin| serde_json::from_value::<WriteOrigin>(origin.clone()).ok()),
    }
}

/// Accepts a dense array, a map keyed by position, or nothing.
fn normalize_players(raw: Option<&Value>) -> Roster {
    let candidates: Vec<&Value> = match raw {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Object(entries)) => positional_values(entries),
        _ => Vec::new(),
    };

    candidates
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Integer-like keys in numeric order first, then any remaining keys in map order.
fn positional_values(entries: &Map<String, Value>) -> Vec<&Value> {
    let mut indexed: Vec<(u64, &Value)> = Vec::new();
    let mut named: Vec<&Value> = Vec::new();
    for (key, value) in entries {
        match key.parse::<u64>() {
            Ok(index) => indexed.push((index, value)),
            Err(_) => named.push(value),
        }
    }
    indexed.sort_by_key(|(index, _)| *index);
    indexed
        .into_iter()
        .map(|(_, value)| value)
        .chain(named)
        .collect()
}

fn normalize_scores(raw: Option<&Value>) -> ScoreMap {
    let Some(Value::Object(entries)) = raw else {
        return ScoreMap::new();
    };

    entries
        .iter()
        .filter_map(|(key, value)| match value.as_f64() {
            Some(number) if number.is_finite() && number >= 0.0 => Some((key.clone(), number)),
            _ => {
                debug!(key = %key, "dropping malformed score entry");
                None
            }
        })
        .collect()
}

fn normalize_bindings(raw: Option<&Value>) -> BindingMap {
    let Some(Value::Object(entries)) = raw else {
        return BindingMap::new();
    };

    entries
        .iter()
        .filter_map(|(identity, player)| match player.as_str() {
            Some(name) if !name.is_empty() && !identity.is_empty() => {
                Some((identity.clone(), name.to_owned()))
            }
            _ => None,
        })
        .collect()
}
