//! Request admission pipeline.
//!
//! # Stage Order
//! ```text
//! recovery            (catch panics → 500)
//!   → request logging (observes the final status)
//!     → security headers
//!       → rate limit  (429 short-circuit)
//!         → cache-control
//!           → size limit (413 short-circuit)
//!             → routes
//! ```
//!
//! Each stage continues only by calling `next.run(request)`; returning a
//! response instead halts the chain, and no later stage or handler runs.

use axum::{
    handler::Handler,
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, services::ServeDir};

use crate::http::cache::cache_control_middleware;
use crate::http::handlers;
use crate::http::recovery::recovery_layer;
use crate::http::server::AppState;
use crate::observability::logging::request_logger_middleware;
use crate::security::headers::security_headers_middleware;
use crate::security::limits::request_size_middleware;
use crate::security::rate_limit::rate_limit_middleware;

/// Full router: routes wrapped in the admission chain.
pub fn build_router(state: AppState) -> Router {
    admission_chain(routes(state.clone()), state)
}

/// Terminal route table.
///
/// Unmatched paths and methods render the 404 page, as do missing assets.
pub fn routes(state: AppState) -> Router {
    let assets = ServeDir::new(&state.config.assets.static_dir)
        .append_index_html_on_directories(false)
        .not_found_service(handlers::not_found.with_state(state.clone()));

    Router::new()
        .route("/", get(handlers::home).fallback(handlers::not_found))
        .route("/health", get(handlers::health).fallback(handlers::not_found))
        .nest_service("/static", assets)
        .fallback(handlers::not_found)
        .with_state(state)
}

/// Wrap `router` in the admission stages, outermost first.
pub fn admission_chain(router: Router, state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.limits.max_request_bytes).unwrap_or(usize::MAX);

    router.layer(
        ServiceBuilder::new()
            .layer(recovery_layer(state.security_headers.clone()))
            .layer(from_fn_with_state(state.clone(), request_logger_middleware))
            .layer(from_fn_with_state(state.clone(), security_headers_middleware))
            .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
            .layer(from_fn(cache_control_middleware))
            .layer(from_fn_with_state(state, request_size_middleware))
            .layer(RequestBodyLimitLayer::new(body_limit)),
    )
}
