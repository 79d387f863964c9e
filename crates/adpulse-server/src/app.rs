//! Application lifecycle.

use crate::di::{AppComponents, AppComponentsBuilder};
use crate::startup;
use adpulse_config::{validate_config, AppConfig};
use adpulse_core::{AdpulseError, AdpulseResult};
use adpulse_repository::{create_pool, DatabasePoolInterface};
use adpulse_rest::{create_router, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

/// How long background tasks get to stop after the HTTP server has.
const BACKGROUND_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

const METRICS_UPKEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Connects to PostgreSQL and Redis, starts the relay and sweep, and serves
/// HTTP until `shutdown` resolves.
pub async fn run<F>(config: AppConfig, shutdown: F) -> AdpulseResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    validate_config(&config)?;

    let metrics = if config.observability.metrics_enabled {
        Some(install_metrics()?)
    } else {
        None
    };

    let db_pool = create_pool(&config.database).await?;
    if config.database.run_migrations {
        db_pool.run_migrations().await?;
    }
    let db_pool: Arc<dyn DatabasePoolInterface> = db_pool;

    let redis_pool = adpulse_jobs::redis::create_pool(&config.redis).await?;
    let redis_client = adpulse_jobs::redis::create_client(&config.redis)?;

    let components = AppComponentsBuilder::new(config.jobs.clone())
        .with_database_pool(db_pool.clone())
        .with_redis_pool(redis_pool.clone())
        .build();

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let background = spawn_background(&config, &components, redis_client, metrics.clone(), &shutdown_tx);

    let mut state = AppState::new(components.producer.clone(), components.hub.clone())
        .with_database(db_pool.clone())
        .with_redis(redis_pool);
    if let Some(handle) = metrics {
        state = state.with_metrics(handle);
    }
    let router = create_router(state, &config.server, &config.observability);

    let addr = config.server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AdpulseError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
    startup::print_startup_info(&config.server, &config.observability);

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AdpulseError::Internal(format!("HTTP server error: {}", e)));

    info!("HTTP server stopped, stopping background tasks...");
    // Receivers were subscribed at spawn; an error only means none are running.
    if shutdown_tx.send(()).is_err() {
        debug!("No background tasks to stop");
    }
    for (name, task) in background {
        match tokio::time::timeout(BACKGROUND_SHUTDOWN_TIMEOUT, task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = name, error = %e, "Background task panicked"),
            Err(_) => warn!(task = name, "Background task did not stop in time"),
        }
    }

    db_pool.close().await;
    info!("Server shutdown complete");
    served
}

fn install_metrics() -> AdpulseResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AdpulseError::Configuration(format!("Failed to install metrics recorder: {}", e)))?;
    adpulse_jobs::register_metrics();
    Ok(handle)
}

fn spawn_background(
    config: &AppConfig,
    components: &AppComponents,
    redis_client: redis::Client,
    metrics: Option<PrometheusHandle>,
    shutdown_tx: &broadcast::Sender<()>,
) -> Vec<(&'static str, JoinHandle<()>)> {
    let mut tasks = Vec::new();

    if config.jobs.relay.enabled {
        let relay = components.relay.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push((
            "relay",
            tokio::spawn(
                async move { relay.run(redis_client, shutdown).await }.instrument(info_span!("relay")),
            ),
        ));
    } else {
        warn!("Progress relay disabled; job progress will not reach the ledger");
    }

    if config.jobs.sweep.enabled {
        let sweeper = components.sweeper.clone();
        let shutdown = shutdown_tx.subscribe();
        tasks.push((
            "sweep",
            tokio::spawn(async move { sweeper.run(shutdown).await }.instrument(info_span!("sweep"))),
        ));
    }

    if let Some(handle) = metrics {
        let mut shutdown = shutdown_tx.subscribe();
        tasks.push((
            "metrics-upkeep",
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(METRICS_UPKEEP_INTERVAL);
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = ticker.tick() => handle.run_upkeep(),
                    }
                }
            }),
        ));
    }

    tasks
}
