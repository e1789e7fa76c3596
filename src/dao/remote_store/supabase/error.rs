//! Error types raised by the Supabase row store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`SupabaseDaoError`] failures.
pub type SupabaseResult<T> = Result<T, SupabaseDaoError>;

/// Failures that can occur while talking to PostgREST or GoTrue.
#[derive(Debug, Error)]
pub enum SupabaseDaoError {
    /// Required environment variable is missing.
    #[error("missing Supabase environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// `SUPABASE_POLL_MS` is not a positive integer.
    #[error("invalid Supabase poll interval `{value}`")]
    InvalidPollInterval { value: String },
    /// `SUPABASE_REALTIME` is not a recognised switch.
    #[error("invalid Supabase realtime switch `{value}`")]
    InvalidRealtimeFlag { value: String },
    /// The access token expired and the identity has nothing to renew it with.
    #[error("Supabase identity carries no refresh token")]
    MissingRefreshToken,
    /// The Realtime websocket could not be opened or broke mid-flight.
    #[error("Supabase realtime socket failed for `{url}`")]
    RealtimeSocket {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    /// The server refused the channel join or the row-change subscription.
    #[error("Supabase realtime refused the channel: {reason}")]
    RealtimeRejected { reason: String },
    #[error("failed to build Supabase client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to send Supabase request to `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected Supabase response status {status} for `{url}`")]
    RequestStatus { url: String, status: StatusCode },
    #[error("failed to decode Supabase response for `{url}`")]
    DecodeResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<SupabaseDaoError> for StorageError {
    fn from(err: SupabaseDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
