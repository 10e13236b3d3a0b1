//! `ojsandbox serve`: the HTTP sandbox.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use ojsandbox::api;
use ojsandbox::config::Config;
use ojsandbox::sandbox::DockerRuntime;
use ojsandbox::service::SandboxService;

/// Runs the server until SIGINT/SIGTERM, then tears the pool down.
pub async fn run(config: Config) -> Result<()> {
    let runtime = DockerRuntime::connect().context("Failed to connect to Docker. Is Docker running?")?;
    let service = Arc::new(SandboxService::from_config(Arc::new(runtime), &config)?);
    service.start().await;

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server.bind))?;
    let app = api::router(Arc::clone(&service), &config.server);

    let served = api::serve(listener, app, shutdown_signal()).await;

    let report = service.shutdown().await;
    info!("Shutdown complete: {}", report);

    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
