use std::{collections::BTreeMap, fmt};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};
use uuid::Uuid;

/// Wire format of the date component in score keys (`YYYY-MM-DD`).
pub const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
/// Separator between the components of a score key.
pub const SCORE_KEY_SEPARATOR: &str = "::";

/// Durable field holding the roster.
pub const PLAYERS_FIELD: &str = "operatives";
/// Durable field holding the flat score map.
pub const SCORES_FIELD: &str = "scores";
/// Durable field holding identity to player bindings.
pub const BINDINGS_FIELD: &str = "userBindings";
/// Durable field holding the stamp of the last writer.
pub const ORIGIN_FIELD: &str = "origin";

/// Ordered set of unique player names in display order.
pub type Roster = IndexSet<String>;
/// Flat `date::player::activity` to value map.
pub type ScoreMap = BTreeMap<String, f64>;
/// Identity id to claimed player name.
pub type BindingMap = BTreeMap<String, String>;

/// The shared tracker state: roster, scores and claims.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalState {
    pub players: Roster,
    pub scores: ScoreMap,
    pub bindings: BindingMap,
}

impl CanonicalState {
    /// Whether `player` is part of the roster.
    pub fn has_player(&self, player: &str) -> bool {
        self.players.contains(player)
    }

    /// Identity currently holding a claim on `player`, if any.
    pub fn owner_of(&self, player: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(_, bound)| bound.as_str() == player)
            .map(|(identity, _)| identity.as_str())
    }

    /// Player claimed by `identity`, if any.
    pub fn binding_for(&self, identity: &str) -> Option<&str> {
        self.bindings.get(identity).map(String::as_str)
    }

    /// Copy of the state without `player`, cascading to their scores and claims.
    pub fn without_player(&self, player: &str) -> Self {
        let mut players = self.players.clone();
        players.shift_remove(player);

        let scores = self
            .scores
            .iter()
            .filter(|(key, _)| {
                ScoreKey::player_segment(key).is_none_or(|segment| segment != player)
            })
            .map(|(key, value)| (key.clone(), *value))
            .collect();

        let bindings = self
            .bindings
            .iter()
            .filter(|(_, bound)| bound.as_str() != player)
            .map(|(identity, bound)| (identity.clone(), bound.clone()))
            .collect();

        Self {
            players,
            scores,
            bindings,
        }
    }

    /// Copy of the state with a single score set, or removed when `value` is `None`.
    pub fn with_score(&self, key: &ScoreKey, value: Option<f64>) -> Self {
        let mut next = self.clone();
        next.set_score(key, value);
        next
    }

    /// Set or clear a single score in place.
    pub fn set_score(&mut self, key: &ScoreKey, value: Option<f64>) {
        let key = key.to_string();
        match value {
            Some(value) => {
                self.scores.insert(key, value);
            }
            None => {
                self.scores.remove(&key);
            }
        }
    }

    /// Render the durable document shape shared by every backend.
    pub fn to_document(&self, origin: Option<&WriteOrigin>) -> Value {
        let mut document = json!({
            PLAYERS_FIELD: self.players.iter().collect::<Vec<_>>(),
            SCORES_FIELD: self.scores,
            BINDINGS_FIELD: self.bindings,
        });
        if let (Some(origin), Some(map)) = (origin, document.as_object_mut()) {
            map.insert(ORIGIN_FIELD.to_owned(), json!(origin));
        }
        document
    }
}

/// Stamp attached to every durable write so a client can recognise its own echoes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOrigin {
    /// Session-scoped identifier of the writing client.
    pub client: Uuid,
    /// Monotonic per-client sequence number.
    pub seq: u64,
}

/// Normalized state as delivered by a read or a subscription.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub state: CanonicalState,
    pub origin: Option<WriteOrigin>,
}

/// Parsed `date::player::activity` score key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScoreKey {
    pub date: Date,
    pub player: String,
    pub activity: String,
}

impl ScoreKey {
    pub fn new(date: Date, player: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            date,
            player: player.into(),
            activity: activity.into(),
        }
    }

    /// Parse a raw key, rejecting anything that is not exactly three well-formed segments.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split(SCORE_KEY_SEPARATOR);
        let (date, player, activity) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || player.is_empty() || activity.is_empty() {
            return None;
        }
        Some(Self {
            date: parse_date(date)?,
            player: player.to_owned(),
            activity: activity.to_owned(),
        })
    }

    /// Player component of a raw key without validating the rest of it.
    pub fn player_segment(raw: &str) -> Option<&str> {
        raw.split(SCORE_KEY_SEPARATOR).nth(1)
    }
}

impl fmt::Display for ScoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            format_date(self.date),
            self.player,
            self.activity,
            sep = SCORE_KEY_SEPARATOR
        )
    }
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Option<Date> {
    let bytes = raw.as_bytes();
    let shape_ok = bytes.len() == 10
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            _ => byte.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    Date::parse(raw, DATE_FORMAT).ok()
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT)
        .unwrap_or_else(|_| "invalid-date".into())
}
