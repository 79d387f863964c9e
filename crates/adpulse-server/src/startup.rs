//! Server startup utilities.

use adpulse_config::{ObservabilityConfig, ServerConfig};
use tokio::signal;
use tracing::{error, info};

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    ___       ______        __
   /   | ____/ / __ \__  __/ /_______
  / /| |/ __  / /_/ / / / / / ___/ _ \
 / ___ / /_/ / ____/ /_/ / (__  )  __/
/_/  |_\__,_/_/    \__,_/_/____/\___/
    "#);
}

/// Prints where the server can be reached.
pub fn print_startup_info(server: &ServerConfig, observability: &ObservabilityConfig) {
    let separator = "=".repeat(60);
    let addr = server.addr();
    info!("{}", separator);
    info!("REST API:  http://{}/api/v1/jobs", addr);
    info!("WebSocket: ws://{}/ws", addr);
    info!("Health:    http://{}/health", addr);
    if observability.metrics_enabled {
        info!("Metrics:   http://{}{}", addr, observability.metrics_path);
    }
    info!("{}", separator);
}

/// Resolves on Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        }
    }
}
