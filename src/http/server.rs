//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build shared application state from the validated config
//! - Accept connections and hand each one to its own task
//! - Apply transport timeouts (read, write, idle) per connection
//! - Graceful shutdown: stop accepting, drain within the grace period,
//!   then abort whatever is still running

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinSet;

use crate::config::{ConfigError, ServerConfig, ValidationError};
use crate::http::pipeline::build_router;
use crate::lifecycle::ShutdownSignal;
use crate::net::connection::{serve_connection, ConnectionTimeouts};
use crate::net::listener::{Listener, ListenerError};
use crate::security::{KeyedLimiter, SecurityHeaders, TrustedProxies};
use crate::templates::TemplateRenderer;

/// Pause after a failed accept (e.g. file descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Application state shared by every pipeline stage and handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub limiter: Arc<KeyedLimiter>,
    pub proxies: Arc<TrustedProxies>,
    pub security_headers: Arc<SecurityHeaders>,
    pub templates: Arc<dyn TemplateRenderer>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        templates: Arc<dyn TemplateRenderer>,
    ) -> Result<Self, ConfigError> {
        let proxies = TrustedProxies::parse(&config.security.trusted_proxies).map_err(|e| {
            ConfigError::Validation(vec![ValidationError::InvalidTrustedProxy(
                e.entry().to_string(),
            )])
        })?;
        let security_headers = SecurityHeaders::from_config(&config.security).map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidContentSecurityPolicy])
        })?;

        Ok(Self {
            limiter: Arc::new(KeyedLimiter::from_config(&config.rate_limit)),
            proxies: Arc::new(proxies),
            security_headers: Arc::new(security_headers),
            templates,
            config: Arc::new(config),
        })
    }
}

/// HTTP server for the edge.
pub struct HttpServer {
    router: Router,
    config: Arc<ServerConfig>,
}

impl HttpServer {
    /// Create a server running the full admission pipeline.
    pub fn new(state: AppState) -> Self {
        let config = state.config.clone();
        Self {
            router: build_router(state),
            config,
        }
    }

    /// Create a server around an already-built router.
    pub fn with_router(config: Arc<ServerConfig>, router: Router) -> Self {
        Self { router, config }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain.
    ///
    /// Connections still open when the grace period ends are aborted; that
    /// is logged and is not an error.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(address = %addr, "HTTP server starting");

        let timeouts = ConnectionTimeouts::from_config(&self.config.timeouts);
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        connections.spawn(serve_connection(
                            stream,
                            peer,
                            permit,
                            self.router.clone(),
                            timeouts,
                            shutdown.clone(),
                        ));
                    }
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                    Err(e) => return Err(e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
        drop(listener);

        let grace = self.config.timeouts.shutdown_grace();
        tracing::info!(
            open_connections = connections.len(),
            grace_secs = grace.as_secs_f64(),
            "Draining connections"
        );

        let drain = async { while connections.join_next().await.is_some() {} };
        let drained = tokio::time::timeout(grace, drain).await.is_ok();
        if !drained {
            tracing::warn!(
                abandoned = connections.len(),
                "Shutdown grace period elapsed, closing remaining connections"
            );
            connections.shutdown().await;
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
