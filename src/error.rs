//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Cache Error Enum ==
/// Unified error type for the cache and its HTTP front-end.
///
/// The type is `Clone` because a single failed computation is handed to every
/// thread that joined it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Bad builder input or key
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The loader failed while computing a value
    #[error("Failed to load key '{key}': {cause:#}")]
    Execution {
        key: String,
        cause: Arc<anyhow::Error>,
    },

    /// The loader completed without producing a value
    #[error("Loader returned no value for key '{0}'")]
    InvalidLoadResult(String),

    /// Key not present in the cache
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Gave up waiting on an in-flight computation
    #[error("Timed out after {waited:?} waiting for key '{key}'")]
    Timeout { key: String, waited: Duration },

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Wraps a loader failure for `key`.
    pub fn execution(key: impl Into<String>, cause: anyhow::Error) -> Self {
        CacheError::Execution {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CacheError::KeyNotFound(_) | CacheError::InvalidLoadResult(_) => StatusCode::NOT_FOUND,
            CacheError::Execution { .. } => StatusCode::BAD_GATEWAY,
            CacheError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_error_keeps_cause_chain() {
        let cause = anyhow::anyhow!("connection refused").context("fetching origin");
        let err = CacheError::execution("user:1", cause);

        let message = err.to_string();
        assert!(message.contains("user:1"));
        assert!(message.contains("fetching origin"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CacheError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (CacheError::KeyNotFound("x".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidLoadResult("x".into()), StatusCode::NOT_FOUND),
            (
                CacheError::execution("x", anyhow::anyhow!("boom")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                CacheError::Timeout {
                    key: "x".into(),
                    waited: Duration::from_millis(5),
                },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (CacheError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
