//! # AdPulse Server
//!
//! Main entry point. Loads configuration, installs tracing, and runs the
//! application until Ctrl+C or SIGTERM.

use adpulse_config::ConfigLoader;
use adpulse_core::{telemetry::init_tracing, AdpulseResult};
use adpulse_server::{app, startup};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Tracing may not be up yet.
        eprintln!("Application error: {e}");
        error!("Application error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> AdpulseResult<()> {
    let config_loader = ConfigLoader::from_default_location()?;
    let config = config_loader.get().await;

    init_tracing(
        &config.observability.log_level,
        config.observability.log_format,
    )?;
    startup::print_banner();

    info!("Starting AdPulse server...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.environment);

    app::run(config, startup::shutdown_signal()).await
}
