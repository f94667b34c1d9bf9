//! Static-site HTTP edge.
//!
//! ```text
//!     Client ──▶ listener ──▶ connection (read/write/idle timeouts)
//!                                 │
//!                                 ▼
//!          recovery → logging → security headers → rate limit
//!                  → cache-control → size limit → routes
//!                                 │
//!                 ┌───────────────┼────────────────┐
//!                 ▼               ▼                ▼
//!           GET / (home)     GET /health     /static/* (files)
//! ```
//!
//! Configuration comes from an optional TOML file plus `EDGE_*`/`PORT`
//! environment overrides. SIGINT or SIGTERM drains open connections for
//! the configured grace period before exiting.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use static_edge::config::load_config;
use static_edge::lifecycle::startup;
use static_edge::observability::logging::init_tracing;

#[derive(Parser)]
#[command(name = "static-edge")]
#[command(about = "Rate-limited HTTP edge for a static site", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate configuration and templates, then exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("static-edge: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "static-edge starting");

    let result = if cli.check {
        startup::prepare(config).map(|_| tracing::info!("Configuration OK"))
    } else {
        startup::start(config).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}
