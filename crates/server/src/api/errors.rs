//! API error type mapped to HTTP status codes.
//!
//! Every [`ApiError`] produces a JSON body `{"error": "message"}`. Core
//! errors map onto the wire as:
//!
//! - `InvalidInput` → 400
//! - `RateLimited` → 429
//! - `UnsupportedOperation` → 409
//! - `Unavailable` → 503
//! - `DeadlineExceeded` → 504
//! - `Persist` → 500

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use paperscan_core::CoreError;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    TooManyRequests(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    Internal(String),
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        metrics::counter!("paperscan_api_errors", "kind" => err.kind()).increment(1);
        match err {
            CoreError::InvalidInput(msg) => ApiError::BadRequest(msg),
            CoreError::RateLimited => ApiError::TooManyRequests("rate limited".to_string()),
            CoreError::UnsupportedOperation(msg) => ApiError::Conflict(msg),
            CoreError::Unavailable(msg) => ApiError::ServiceUnavailable(msg),
            CoreError::DeadlineExceeded => {
                ApiError::GatewayTimeout("deadline exceeded".to_string())
            }
            CoreError::Persist(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::TooManyRequests(msg) => (StatusCode::TOO_MANY_REQUESTS, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}
