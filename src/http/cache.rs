//! Cache-control stage.

use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Reserved prefix for static assets.
pub const STATIC_PREFIX: &str = "/static/";

const STATIC_ASSETS: HeaderValue = HeaderValue::from_static("public, max-age=31536000");
const NO_STORE: HeaderValue = HeaderValue::from_static("no-store, must-revalidate");

pub fn cache_policy(path: &str) -> HeaderValue {
    if path.starts_with(STATIC_PREFIX) {
        STATIC_ASSETS
    } else {
        NO_STORE
    }
}

/// Long-lived public caching for static assets, no-store for everything else.
pub async fn cache_control_middleware(request: Request, next: Next) -> Response {
    let policy = cache_policy(request.uri().path());
    let mut response = next.run(request).await;
    response.headers_mut().insert(header::CACHE_CONTROL, policy);
    response
}
