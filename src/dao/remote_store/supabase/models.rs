use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

use crate::dao::{
    identity::Identity,
    models::{BINDINGS_FIELD, CanonicalState, ORIGIN_FIELD, PLAYERS_FIELD, SCORES_FIELD, WriteOrigin},
};

/// `Prefer` value turning an insert into an upsert.
pub const PREFER_UPSERT: &str = "resolution=merge-duplicates";
/// `Prefer` value making PostgREST echo the affected rows.
pub const PREFER_REPRESENTATION: &str = "return=representation";

/// The single row holding the tracker state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionRow {
    pub id: String,
    #[serde(default)]
    pub operatives: Value,
    #[serde(default)]
    pub scores: Value,
    #[serde(default)]
    pub user_bindings: Value,
    #[serde(default)]
    pub origin: Value,
    /// Changes on every write; the compare-and-set token.
    #[serde(default)]
    pub revision: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CompetitionRow {
    /// Row image of `state`, stamped with `origin` and a fresh revision.
    pub fn from_state(id: &str, state: &CanonicalState, origin: &WriteOrigin) -> Self {
        let mut document = state.to_document(Some(origin));
        let mut take = |field: &str| {
            document
                .as_object_mut()
                .and_then(|map| map.remove(field))
                .unwrap_or(Value::Null)
        };
        Self {
            id: id.to_owned(),
            operatives: take(PLAYERS_FIELD),
            scores: take(SCORES_FIELD),
            user_bindings: take(BINDINGS_FIELD),
            origin: take(ORIGIN_FIELD),
            revision: Some(Uuid::new_v4()),
            updated_at: OffsetDateTime::now_utc().format(&Rfc3339).ok(),
        }
    }

    /// Document shape understood by the normalizer.
    pub fn document(&self) -> Value {
        json!({
            PLAYERS_FIELD: self.operatives,
            SCORES_FIELD: self.scores,
            BINDINGS_FIELD: self.user_bindings,
            ORIGIN_FIELD: self.origin,
        })
    }
}

/// Compare-and-set token for the managed row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowVersion {
    /// No row exists yet; the next conditional write must insert it.
    Missing,
    /// Row exists with this revision (null for rows created outside the app).
    Present(Option<Uuid>),
}

/// Subset of a GoTrue session, as returned by sign-up and token refresh.
#[derive(Debug, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

impl From<AuthSession> for Identity {
    fn from(value: AuthSession) -> Self {
        let identity = Identity::new(value.user.id, Some(value.access_token));
        match value.refresh_token {
            Some(refresh_token) => identity.with_refresh_token(refresh_token),
            None => identity,
        }
    }
}

/// GoTrue user record; only the id matters here.
#[derive(Debug, Deserialize)]
pub struct AuthUser {
    pub id: String,
}

/// Body of a `grant_type=refresh_token` call.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// One Phoenix channel message on the Realtime socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelFrame {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_ref: Option<String>,
}
