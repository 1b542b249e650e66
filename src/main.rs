//! Authenticating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http server ──▶ routing (longest prefix)
//!                                          │
//!                                          ▼
//!                                   auth required? ──no──────────────┐
//!                                          │ yes                     │
//!                                          ▼                         │
//!                                   introspection ──▶ decision       │
//!                                          │            │            │
//!                                   deny ◀─┘      allow │            │
//!                                    │                  ▼            ▼
//!     Client Response                ▼             forwarder ──▶ upstream
//!     ◀────────────── redirect / bare status      (rewrite, identity headers)
//! ```

use std::path::PathBuf;

use clap::Parser;

use auth_proxy::config::load_config;
use auth_proxy::lifecycle::startup;

#[derive(Parser)]
#[command(name = "auth-proxy")]
#[command(about = "Reverse proxy that authorizes requests by token introspection", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "AUTH_PROXY_CONFIG", default_value = "auth-proxy.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    startup::run(config).await
}
