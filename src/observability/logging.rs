//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Request-logging stage: one event per request with its final status
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config and `RUST_LOG`

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use futures_util::FutureExt;
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::http::recovery::{panic_message, panic_response};
use crate::http::server::AppState;
use crate::observability::metrics;

/// Correlation header echoed on every response.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const MAX_REQUEST_ID_LEN: usize = 128;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Identifier attached to a request for log correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Reuse a sane incoming id, otherwise mint a UUID v4.
fn request_id(request: &Request) -> RequestId {
    let incoming = request
        .headers()
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN);

    match incoming {
        Some(id) => RequestId(id.to_string()),
        None => RequestId(Uuid::new_v4().to_string()),
    }
}

macro_rules! log_completed {
    ($level:ident, $id:expr, $method:expr, $path:expr, $client:expr, $status:expr, $ms:expr) => {
        tracing::$level!(
            request_id = %$id,
            method = %$method,
            path = %$path,
            client = %$client,
            status = $status,
            elapsed_ms = $ms,
            "Request completed"
        )
    };
}

/// Request-logging stage.
///
/// Wraps the rest of the chain so the logged status is the final one,
/// including short-circuit rejections from later stages. A panic further in
/// is turned into the recovery 500 here, so it is still logged and tagged
/// with the request id.
pub async fn request_logger_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let id = request_id(&request);
    let client = state.proxies.client_key(&request);
    let method = request.method().clone();
    let path = match request.uri().query() {
        Some(query) => format!("{}?{}", request.uri().path(), query),
        None => request.uri().path().to_string(),
    };

    request.extensions_mut().insert(client.clone());
    request.extensions_mut().insert(id.clone());

    let span = tracing::info_span!("request", request_id = %id.0);
    let outcome = AssertUnwindSafe(next.run(request).instrument(span))
        .catch_unwind()
        .await;

    let mut response = match outcome {
        Ok(response) => response,
        Err(panic) => {
            tracing::error!(
                request_id = %id.0,
                method = %method,
                path = %path,
                client = %client,
                panic = %panic_message(panic.as_ref()),
                "Request handler panicked"
            );
            panic_response(&state.security_headers)
        }
    };

    let status = response.status();
    if let Ok(value) = HeaderValue::from_str(&id.0) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }

    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
    let code = status.as_u16();
    if status.is_server_error() {
        log_completed!(error, id.0, method, path, client, code, elapsed_ms);
    } else if status.is_client_error() {
        log_completed!(warn, id.0, method, path, client, code, elapsed_ms);
    } else {
        log_completed!(info, id.0, method, path, client, code, elapsed_ms);
    }

    metrics::record_request(method.as_str(), code, start);
    response
}
