//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (accept loop, per-connection tasks, drain)
//!     → pipeline.rs (admission chain, outermost first):
//!         recovery.rs → request logger → security headers
//!         → rate limit → cache.rs → size limit
//!     → handlers.rs / static files
//!     → response.rs (shared error bodies)
//!     → Send to client
//! ```

pub mod cache;
pub mod handlers;
pub mod pipeline;
pub mod recovery;
pub mod response;
pub mod server;

pub use pipeline::build_router;
pub use server::{AppState, HttpServer};
