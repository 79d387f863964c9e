//! Application state for Axum handlers.

use adpulse_hub::FanoutHub;
use adpulse_jobs::JobProducer;
use adpulse_repository::DatabasePoolInterface;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<JobProducer>,
    pub hub: Arc<FanoutHub>,
    /// Checked by `/ready` when present.
    pub database: Option<Arc<dyn DatabasePoolInterface>>,
    /// Checked by `/ready` when present.
    pub redis: Option<deadpool_redis::Pool>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a state without readiness dependencies or metrics.
    pub fn new(producer: Arc<JobProducer>, hub: Arc<FanoutHub>) -> Self {
        Self {
            producer,
            hub,
            database: None,
            redis: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn with_database(mut self, database: Arc<dyn DatabasePoolInterface>) -> Self {
        self.database = Some(database);
        self
    }

    #[must_use]
    pub fn with_redis(mut self, redis: deadpool_redis::Pool) -> Self {
        self.redis = Some(redis);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: PrometheusHandle) -> Self {
        self.metrics = Some(metrics);
        self
    }
}
