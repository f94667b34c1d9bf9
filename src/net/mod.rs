//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (HTTP/1.1, timeouts, activity tracking)
//!     → Hand off to the request pipeline
//!
//! Connection States:
//!     Active → Draining (shutdown or idle) → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection runs in its own task so shutdown can drain or abort it
//! - Transport timeouts apply independently of the middleware chain

pub mod connection;
pub mod listener;

pub use listener::{Listener, ListenerError};
