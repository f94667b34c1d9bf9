//! Response helpers shared by the pipeline stages.
//!
//! Every rejection the edge produces itself (413, 429, 500) uses the same
//! JSON body shape so clients can handle them uniformly.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// JSON body of an edge-generated error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retry_after: None,
        }
    }
}

/// 429 with retry guidance when a refill is expected.
pub fn too_many_requests(retry_after: Option<Duration>) -> Response {
    let secs = retry_after.map(retry_after_secs);
    let body = ErrorBody {
        error: "Too many requests".to_string(),
        retry_after: secs.map(|s| format!("{s}s")),
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    if let Some(secs) = secs {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

/// 413 naming the configured limit.
pub fn payload_too_large(limit: u64) -> Response {
    let body = ErrorBody::new(format!(
        "Request size exceeds maximum allowed size of {limit} bytes"
    ));
    (StatusCode::PAYLOAD_TOO_LARGE, Json(body)).into_response()
}

/// Generic 500. Never exposes the underlying failure.
pub fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody::new("Internal server error")),
    )
        .into_response()
}

/// Whole seconds to wait, rounded up, at least one.
fn retry_after_secs(wait: Duration) -> u64 {
    let secs = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(2)), 2);
        assert_eq!(retry_after_secs(Duration::from_millis(2001)), 3);
    }

    #[test]
    fn test_too_many_requests_headers() {
        let response = too_many_requests(Some(Duration::from_millis(1500)));
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "2");

        let response = too_many_requests(None);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_error_body_omits_missing_retry() {
        let json = serde_json::to_value(ErrorBody::new("nope")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "nope" }));
    }
}
