//! Request size limits.
//!
//! # Responsibilities
//! - Reject requests whose declared body size exceeds the configured maximum
//! - Cap undeclared (chunked) bodies at the same limit while streaming
//! - Give every 413, including ones raised while streaming, the JSON body
//!
//! # Design Decisions
//! - Limits checked before the handler runs (early rejection)
//! - The body is never read here, so a rejected body is never consumed

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::payload_too_large;
use crate::http::server::AppState;

/// Size-limit stage: 413 when `Content-Length` is over the limit.
///
/// Bodies without a declared length are capped by the body-limit layer
/// further in; the plain-text 413 that produces is replaced here.
pub async fn request_size_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limit = state.config.limits.max_request_bytes;

    if let Some(declared) = declared_length(&request) {
        if declared > limit {
            tracing::warn!(declared, limit, path = %request.uri().path(), "Request body too large");
            return payload_too_large(limit);
        }
    }

    let response = next.run(request).await;
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json(response.headers()) {
        tracing::warn!(limit, "Streamed request body exceeded the limit");
        return payload_too_large(limit);
    }
    response
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

fn declared_length(request: &Request) -> Option<u64> {
    request
        .headers()
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_declared_length_parsing() {
        let req = Request::builder()
            .header(header::CONTENT_LENGTH, "42")
            .body(Body::empty())
            .unwrap();
        assert_eq!(declared_length(&req), Some(42));

        let req = Request::builder()
            .header(header::CONTENT_LENGTH, "forty")
            .body(Body::empty())
            .unwrap();
        assert_eq!(declared_length(&req), None);

        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(declared_length(&req), None);
    }

    #[test]
    fn test_is_json() {
        let mut headers = HeaderMap::new();
        assert!(!is_json(&headers));
        headers.insert(header::CONTENT_TYPE, "text/plain; charset=utf-8".parse().unwrap());
        assert!(!is_json(&headers));
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        assert!(is_json(&headers));
    }
}
