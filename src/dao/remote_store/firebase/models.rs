use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::identity::Identity;

/// Header asking the Realtime Database to return an ETag with a read.
pub const ETAG_REQUEST_HEADER: &str = "X-Firebase-ETag";
/// Identity Toolkit endpoint for anonymous accounts.
pub const SIGN_UP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signUp";
/// Identity Toolkit endpoint resolving an ID token to its account.
pub const LOOKUP_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:lookup";
/// Secure Token endpoint exchanging a refresh token for a new ID token.
pub const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Body of an anonymous `accounts:signUp` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    pub return_secure_token: bool,
}

/// Subset of the `accounts:signUp` response we rely on.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub local_id: String,
}

impl From<SignUpResponse> for Identity {
    fn from(value: SignUpResponse) -> Self {
        Identity::new(value.local_id, Some(value.id_token)).with_refresh_token(value.refresh_token)
    }
}

/// Form body of a Secure Token refresh.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub grant_type: &'static str,
    pub refresh_token: &'a str,
}

impl<'a> RefreshRequest<'a> {
    pub fn new(refresh_token: &'a str) -> Self {
        Self {
            grant_type: "refresh_token",
            refresh_token,
        }
    }
}

/// Subset of the Secure Token response. Unlike the Identity Toolkit it answers in snake case.
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub id_token: String,
    pub refresh_token: String,
    pub user_id: String,
}

impl From<RefreshResponse> for Identity {
    fn from(value: RefreshResponse) -> Self {
        Identity::new(value.user_id, Some(value.id_token)).with_refresh_token(value.refresh_token)
    }
}

/// Body of an `accounts:lookup` call.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupRequest<'a> {
    pub id_token: &'a str,
}

/// Accounts an ID token resolved to.
#[derive(Debug, Default, Deserialize)]
pub struct LookupResponse {
    #[serde(default)]
    pub users: Vec<LookupUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupUser {
    pub local_id: String,
}

impl LookupResponse {
    /// Whether the token was issued to `uid`.
    pub fn belongs_to(&self, uid: &str) -> bool {
        self.users.iter().any(|user| user.local_id == uid)
    }
}

/// Data carried by `put` and `patch` stream events.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamPayload {
    /// Location relative to the subscribed path, `/` for the root.
    pub path: String,
    /// New value at that location; `null` deletes.
    #[serde(default)]
    pub data: Value,
}

/// Events of the REST streaming protocol we act upon.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Replace the value at `path`.
    Put(StreamPayload),
    /// Replace each child listed in `data` under `path`.
    Patch(StreamPayload),
    /// Heartbeat.
    KeepAlive,
    /// The server cancelled the stream.
    Cancel,
    /// The stream credential expired.
    AuthRevoked,
}
