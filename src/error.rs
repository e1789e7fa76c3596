use std::sync::Arc;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::{remote_store::TxAbort, storage::StorageError},
    state::{input::InputError, session::InvalidTransition},
};

/// Failures surfaced by the sync engine.
///
/// Cloneable so a single debounced write can report its outcome to every
/// caller that contributed an edit.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// No identity is established or the session is not live.
    #[error("not signed in")]
    Unauthenticated,
    /// The targeted profile is not on the roster.
    #[error("profile `{player}` does not exist")]
    ProfileNotFound { player: String },
    /// The targeted profile is bound to another identity.
    #[error("profile `{player}` is already claimed by another login")]
    AlreadyClaimed { player: String },
    /// No room for another profile.
    #[error("roster is full ({limit} players)")]
    RosterFull { limit: usize },
    /// The caller tried to edit a profile it does not own.
    #[error("profile `{player}` is not claimed by this login")]
    NotProfileOwner { player: String },
    /// The backend could not be reached or kept losing races.
    #[error("backend unavailable")]
    BackendUnavailable(#[source] Arc<StorageError>),
    /// Input was refused before reaching the backend.
    #[error("rejected input: {0}")]
    ValidationRejected(#[from] InputError),
    /// Session event not valid from the current phase.
    #[error(transparent)]
    InvalidSession(#[from] InvalidTransition),
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unauthenticated => SyncError::Unauthenticated,
            other => SyncError::BackendUnavailable(Arc::new(other)),
        }
    }
}

impl From<TxAbort> for SyncError {
    fn from(reason: TxAbort) -> Self {
        match reason {
            TxAbort::ProfileNotFound { player } => SyncError::ProfileNotFound { player },
            TxAbort::AlreadyClaimed { player } => SyncError::AlreadyClaimed { player },
            TxAbort::RosterFull { limit } => SyncError::RosterFull { limit },
        }
    }
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] Arc<StorageError>),
    /// The backend health probe is failing.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// No session, or an admin secret is missing or wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated, but not allowed to touch this resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<SyncError> for ServiceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Unauthenticated => ServiceError::Unauthorized(err.to_string()),
            SyncError::ProfileNotFound { .. } => ServiceError::NotFound(err.to_string()),
            SyncError::AlreadyClaimed { .. }
            | SyncError::RosterFull { .. }
            | SyncError::InvalidSession(_) => ServiceError::InvalidState(err.to_string()),
            SyncError::NotProfileOwner { .. } => ServiceError::Forbidden(err.to_string()),
            SyncError::BackendUnavailable(source) => ServiceError::Unavailable(source),
            SyncError::ValidationRejected(input) => ServiceError::InvalidInput(input.to_string()),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        SyncError::from(err).into()
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated caller lacks rights on the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_auth_failures_stay_unauthenticated() {
        assert!(matches!(
            SyncError::from(StorageError::Unauthenticated),
            SyncError::Unauthenticated
        ));
        assert!(matches!(
            SyncError::from(StorageError::Contention { attempts: 25 }),
            SyncError::BackendUnavailable(_)
        ));
    }

    #[test]
    fn sync_errors_map_to_http_statuses() {
        let status = |err: SyncError| {
            AppError::from(ServiceError::from(err))
                .into_response()
                .status()
        };
        assert_eq!(status(SyncError::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(SyncError::AlreadyClaimed {
                player: "AA".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status(SyncError::NotProfileOwner {
                player: "AA".into()
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(SyncError::ValidationRejected(InputError::EmptyName)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(SyncError::ProfileNotFound {
                player: "ZZ".into()
            }),
            StatusCode::NOT_FOUND
        );
    }
}
