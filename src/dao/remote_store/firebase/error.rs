//! Error types raised by the Firebase Realtime Database store.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`FirebaseDaoError`] failures.
pub type FirebaseResult<T> = Result<T, FirebaseDaoError>;

/// Failures that can occur while talking to the Realtime Database REST API.
#[derive(Debug, Error)]
pub enum FirebaseDaoError {
    /// Required environment variable is missing.
    #[error("missing Firebase environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build Firebase client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A request could not be sent.
    #[error("failed to send Firebase request to `{url}`")]
    RequestSend {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Firebase answered with an unexpected status code.
    #[error("unexpected Firebase response status {status} for `{url}`")]
    RequestStatus { url: String, status: StatusCode },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode Firebase response for `{url}`")]
    DecodeResponse {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// A versioned read came back without an ETag header.
    #[error("Firebase response for `{url}` carried no ETag")]
    MissingEtag { url: String },
    /// Identity Toolkit and Secure Token calls need a web API key.
    #[error("Firebase auth calls require `FIREBASE_API_KEY`")]
    MissingApiKey,
    /// The ID token expired and the identity has nothing to renew it with.
    #[error("Firebase identity carries no refresh token")]
    MissingRefreshToken,
    /// The event stream broke mid-flight.
    #[error("Firebase event stream interrupted")]
    StreamRead {
        #[source]
        source: reqwest::Error,
    },
    /// The event stream delivered a payload we could not parse.
    #[error("malformed Firebase `{event}` event")]
    MalformedEvent {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    /// The server cancelled the stream (security rules changed, path removed).
    #[error("Firebase cancelled the event stream")]
    StreamCancelled,
    /// The credential used for the stream expired or was revoked.
    #[error("Firebase revoked the stream credential")]
    AuthRevoked,
}

impl From<FirebaseDaoError> for StorageError {
    fn from(err: FirebaseDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
