//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize logging and metrics from the loaded configuration
//! - Compile the route table (fails fast on bad config)
//! - Bind the listener and serve until a shutdown signal
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::net::tls::load_tls_config;
use crate::observability::{logging, metrics};

/// Run the proxy with a validated configuration until shutdown.
pub async fn run(config: ProxyConfig) -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging(&config.observability)?;

    tracing::info!("auth-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        tls = config.listener.tls.is_some(),
        routes = config.routes.len(),
        introspection_timeout_ms = config.auth.timeout_ms,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let tls = config.listener.tls.clone();
    let bind_address: SocketAddr = config.listener.bind_address.parse()?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    match tls {
        Some(tls) => {
            let tls = load_tls_config(&tls).await?;
            server.run_tls(bind_address, tls, server_shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(bind_address).await?;
            server.run(listener, server_shutdown).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
