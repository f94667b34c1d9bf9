//! Security response headers.
//!
//! # Responsibilities
//! - Attach a fixed set of hardening headers to every response
//! - Including responses produced by later stages (429, 413) and recovery (500)
//!
//! # Design Decisions
//! - Header values are built once at startup; only the CSP is configurable
//! - Existing values set by handlers are overwritten

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

use crate::config::SecurityConfig;
use crate::http::server::AppState;

const FIXED: [(HeaderName, &str); 6] = [
    (header::X_FRAME_OPTIONS, "DENY"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_XSS_PROTECTION, "1; mode=block"),
    (header::REFERRER_POLICY, "strict-origin-when-cross-origin"),
    (
        HeaderName::from_static("permissions-policy"),
        "camera=(), microphone=(), geolocation=()",
    ),
    (
        header::STRICT_TRANSPORT_SECURITY,
        "max-age=31536000; includeSubDomains",
    ),
];

/// Precomputed security headers.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaders {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, header::InvalidHeaderValue> {
        let mut headers: Vec<(HeaderName, HeaderValue)> = FIXED
            .into_iter()
            .map(|(name, value)| (name, HeaderValue::from_static(value)))
            .collect();
        headers.push((
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_str(&config.content_security_policy)?,
        ));
        Ok(Self { headers })
    }

    pub fn apply(&self, target: &mut HeaderMap) {
        for (name, value) in &self.headers {
            target.insert(name.clone(), value.clone());
        }
    }
}

/// Security-headers stage.
pub async fn security_headers_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    state.security_headers.apply(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_headers_applied() {
        let headers = SecurityHeaders::from_config(&SecurityConfig::default()).unwrap();
        let mut map = HeaderMap::new();
        map.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        headers.apply(&mut map);

        assert_eq!(map.len(), 7);
        assert_eq!(map[header::X_FRAME_OPTIONS], "DENY");
        assert_eq!(map["permissions-policy"], "camera=(), microphone=(), geolocation=()");
        assert!(map[header::CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .starts_with("default-src 'self'"));
    }

    #[test]
    fn test_invalid_csp_rejected() {
        let config = SecurityConfig {
            content_security_policy: "bad\nvalue".into(),
            ..SecurityConfig::default()
        };
        assert!(SecurityHeaders::from_config(&config).is_err());
    }
}
