//! Static-site HTTP edge: per-client rate limiting, security and cache
//! headers, request size limits, panic recovery and graceful shutdown in
//! front of a small set of pages and static assets.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod templates;

pub use config::{load_config, ServerConfig};
pub use http::{AppState, HttpServer};
pub use lifecycle::{Shutdown, ShutdownSignal};
