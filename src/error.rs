use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError, services::action_queue::QueueError,
    state::duel_flow::InvalidTransition,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Cache or durable tier is unreachable.
    #[error("storage transport failure")]
    Transport(#[source] StorageError),
    /// Application is running in degraded mode without a durable store.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Caller exceeded a rate limit; soft rejection, not retried.
    #[error("rate limited; retry in {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the window admits another action.
        retry_after_seconds: u64,
    },
    /// The player's cooldown has not elapsed; soft rejection, not retried.
    #[error("cooldown active for another {remaining_ms}ms")]
    CooldownActive {
        /// Milliseconds left on the cooldown.
        remaining_ms: u64,
    },
    /// Input analysis rejected the action. The message is deliberately
    /// generic; detail goes to the server log only.
    #[error("action rejected")]
    ValidationFailed,
    /// Optimistic update retries exhausted; nothing was persisted.
    #[error("state update conflict retries exhausted")]
    ConflictExhausted,
    /// The action expired waiting for its turn on the actor lane.
    #[error("queued action timed out")]
    QueueTimeout,
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

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Transport(err)
    }
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::TimedOut => ServiceError::QueueTimeout,
            QueueError::LaneClosed => ServiceError::QueueTimeout,
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
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
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The action was rejected before reward processing.
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    /// Caller must slow down.
    #[error("too many requests: {0}")]
    TooManyRequests(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Transport(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::RateLimited {
                retry_after_seconds,
            } => AppError::TooManyRequests(format!("retry in {retry_after_seconds}s")),
            ServiceError::CooldownActive { remaining_ms } => {
                AppError::TooManyRequests(format!("cooldown for {remaining_ms}ms"))
            }
            // Deliberately generic toward the client.
            ServiceError::ValidationFailed => AppError::Unprocessable("action rejected".into()),
            ServiceError::ConflictExhausted => {
                AppError::Conflict("state update conflict; try again".into())
            }
            ServiceError::QueueTimeout => {
                AppError::ServiceUnavailable("action timed out in queue".into())
            }
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
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
