//! Request-path error taxonomy for the query façade.
//!
//! Only query handlers surface these to callers. Collector failures never
//! reach an HTTP response; they are recorded in the collector run state and
//! retried on the next cycle.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// ---

/// Errors a query-façade operation can surface to an HTTP caller.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Malformed query parameter: bad duration token, out-of-range bin
    /// count or bucket width, missing/non-integer station id.
    #[error("{0}")]
    Validation(String),

    /// The station has no stored readings yet, so no "latest" timestamp
    /// exists to anchor a window. Distinct from an empty-but-valid range.
    #[error("{0}")]
    NotFound(String),

    /// I/O failure on the durable store; fatal for the operation.
    #[error("storage failure: {0}")]
    Storage(#[from] sqlx::Error),

    /// Anything else that leaked out of a handler.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Helper: build a `Validation` error from any message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Helper: build a `NotFound` error from any message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Storage(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // ---
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {self}");
        }

        (status, Json(json!({ "ok": false, "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_status_mapping() {
        // ---
        assert_eq!(
            ApiError::validation("bins must be between 4 and 36")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("no data for station 9")
                .into_response()
                .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Storage(sqlx::Error::PoolClosed)
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Internal(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
