//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → client_ip.rs (derive client key, honoring trusted proxies)
//!     → headers.rs (hardening headers on the way out)
//!     → rate_limit.rs (per-client token bucket)
//!     → limits.rs (declared request size)
//!     → Pass to handlers
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; forwarding headers only from trusted peers

pub mod client_ip;
pub mod headers;
pub mod limits;
pub mod rate_limit;

pub use client_ip::{ClientKey, TrustedProxies};
pub use headers::SecurityHeaders;
pub use rate_limit::{Decision, KeyedLimiter, TokenBucket};
