//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use marquee_core::error::MarqueeError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// Body returned while the catalog is still being indexed.
#[derive(Debug, Serialize)]
pub struct NotReadyBody {
    pub error: String,
    pub indexed: u64,
    pub expected: u64,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 500 Internal Server Error - store or embedding failure.
    Internal(String),
    /// 503 Service Unavailable - catalog not fully indexed yet.
    NotReady { indexed: u64, expected: u64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::NotReady { indexed, expected } => {
                let body = NotReadyBody {
                    error: format!(
                        "Embeddings are still being created ({} of {} already created). \
                         Try again in a few minutes.",
                        indexed, expected
                    ),
                    indexed,
                    expected,
                };
                return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<MarqueeError> for ApiError {
    fn from(err: MarqueeError) -> Self {
        match err {
            MarqueeError::Validation(msg) | MarqueeError::Config(msg) => ApiError::BadRequest(msg),
            other => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}
