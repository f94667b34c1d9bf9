//! Startup orchestration.
//!
//! # Responsibilities
//! - Build shared state from a validated configuration
//! - Initialize metrics, bind the listener, install signal handling
//! - Run the server until a termination signal drains it
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener binds last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

use crate::config::{ConfigError, ServerConfig};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::{signals, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::templates::{FileTemplates, TemplateError};

/// Anything that stops the server from coming up or serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Templates(#[from] TemplateError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("observability.metrics_address `{0}` is not a socket address")]
    MetricsAddress(String),
}

/// Load templates and build the shared state without binding anything.
pub fn prepare(config: ServerConfig) -> Result<AppState, StartupError> {
    let templates = FileTemplates::load(&config.assets.templates_pattern)?;
    Ok(AppState::new(config, Arc::new(templates))?)
}

/// Start the server and block until it has shut down.
pub async fn start(config: ServerConfig) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        let raw = &config.observability.metrics_address;
        let addr: SocketAddr = raw
            .parse()
            .map_err(|_| StartupError::MetricsAddress(raw.clone()))?;
        crate::observability::metrics::init_metrics(addr)?;
    }

    let state = prepare(config)?;
    let listener = Listener::bind(&state.config.listener).await?;

    tracing::info!(
        rate_limit = state.config.rate_limit.requests_per_second,
        burst = state.config.rate_limit.burst,
        max_request_bytes = state.config.limits.max_request_bytes,
        static_dir = %state.config.assets.static_dir,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    let server = HttpServer::new(state);

    tokio::spawn(async move {
        signals::termination().await;
        shutdown.trigger();
    });

    server.run(listener, signal).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
