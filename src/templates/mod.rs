//! Template rendering.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     templates_pattern → file.rs (load every matching file) → FileTemplates
//!
//! Request:
//!     handler → TemplateRenderer::render(name, data) → HTML body
//! ```
//!
//! # Design Decisions
//! - Handlers depend on the trait only; the file-backed store is one implementation
//! - All templates load at startup; a pattern with no matches is fatal

pub mod file;

use std::path::PathBuf;

use thiserror::Error;

pub use file::FileTemplates;

/// Errors from loading or rendering templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read templates from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid template pattern `{0}`: at most one `*` is supported")]
    InvalidPattern(String),

    #[error("Template pattern `{0}` matches no files")]
    NoMatches(String),

    #[error("Template `{0}` is not defined")]
    NotFound(String),
}

/// Renders a named template with a JSON data mapping.
pub trait TemplateRenderer: Send + Sync {
    fn render(&self, name: &str, data: &serde_json::Value) -> Result<String, TemplateError>;
}
