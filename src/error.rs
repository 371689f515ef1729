//! Shared error boundary for both binaries (§7 of the design).
//!
//! Handlers return `AppResult<T>`. A bare [`StatusCode`] carries no context and
//! maps straight to a response; anything else is wrapped as `Internal` and
//! logged with its full source chain before being turned into a 500. This is
//! the same two-variant shape the director and the streaming node's HTTP
//! surfaces share, so a helper like the keyspace client can be written once
//! against `AppResult` and used from both.

use axum::{http::StatusCode, response::IntoResponse};
use tracing::error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    /// A response with no body beyond the status itself is the whole story:
    /// client error, not-found, or service-unavailable (§7 taxonomy a/b/c).
    Status(StatusCode),
    /// Something unexpected happened; logged with its source chain and
    /// reported to the caller as a bare 500 (§7 taxonomy d).
    Internal(anyhow::Error),
}

impl AppError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::Status(status) => status.into_response(),
            AppError::Internal(err) => {
                error!("unhandled error: {err:?}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Internal(err.into())
    }
}
