//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::ConnectInfo;
use axum::http::{Method, Request};
use axum::response::Response;
use tempfile::TempDir;

use static_edge::config::ServerConfig;
use static_edge::http::AppState;
use static_edge::templates::FileTemplates;

pub const HOME_BODY: &str = "<h1>Welcome</h1>";
pub const NOT_FOUND_BODY: &str = "<h1>Page not found</h1>";
pub const ASSET_BODY: &str = "body { color: #333; }";

/// Application state backed by in-memory templates and a temporary static dir.
pub struct TestEdge {
    pub state: AppState,
    _static_dir: TempDir,
}

/// Config tuned for tests: small burst, no refill, local-only listener.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config.rate_limit.requests_per_second = 0.0;
    config.rate_limit.burst = 3;
    config.limits.max_request_bytes = 64;
    config
}

pub fn edge(mut config: ServerConfig) -> TestEdge {
    let static_dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(static_dir.path().join("css")).unwrap();
    std::fs::write(static_dir.path().join("css/site.css"), ASSET_BODY).unwrap();
    config.assets.static_dir = static_dir.path().to_string_lossy().into_owned();

    let templates = FileTemplates::from_sources([
        ("index.html", HOME_BODY),
        ("404.html", NOT_FOUND_BODY),
    ]);
    let state = AppState::new(config, Arc::new(templates)).unwrap();

    TestEdge {
        state,
        _static_dir: static_dir,
    }
}

/// A request as the server would hand it to the router, peer address attached.
pub fn request(method: Method, uri: &str, peer: &str) -> Request<Body> {
    let peer: SocketAddr = peer.parse().unwrap();
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(peer))
        .body(Body::empty())
        .unwrap()
}

pub fn get(uri: &str, peer: &str) -> Request<Body> {
    request(Method::GET, uri, peer)
}

pub async fn body_string(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}
