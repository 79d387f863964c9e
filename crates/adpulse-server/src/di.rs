//! Component wiring.
//!
//! Builds the ledger, queue, hub, producer, relay, and sweep from whatever
//! backends were provided. Without a database pool the ledger lives in
//! memory; without a Redis pool so do the queue and the cancellation signal.
//! The in-memory mode serves single-node local runs and tests.

use adpulse_config::JobsConfig;
use adpulse_hub::FanoutHub;
use adpulse_jobs::{
    CancellationSignal, InMemoryCancellation, InMemoryTaskQueue, JobProducer, ProgressRelay,
    RedisCancellation, RedisKeys, RedisTaskQueue, StaleJobSweeper, TaskQueue,
};
use adpulse_repository::{
    AssetStatusRepository, DatabasePoolInterface, InMemoryAssetStatusRepository,
    InMemoryJobLedger, JobLedger, PgAssetStatusRepository, PgJobLedger,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Every long-lived component of the server.
pub struct AppComponents {
    pub hub: Arc<FanoutHub>,
    pub ledger: Arc<dyn JobLedger>,
    pub assets: Arc<dyn AssetStatusRepository>,
    pub queue: Arc<dyn TaskQueue>,
    pub cancellation: Arc<dyn CancellationSignal>,
    pub producer: Arc<JobProducer>,
    pub relay: Arc<ProgressRelay>,
    pub sweeper: Arc<StaleJobSweeper>,
    pub database: Option<Arc<dyn DatabasePoolInterface>>,
    pub redis: Option<deadpool_redis::Pool>,
}

/// Builder for [`AppComponents`].
pub struct AppComponentsBuilder {
    jobs: JobsConfig,
    database: Option<Arc<dyn DatabasePoolInterface>>,
    redis: Option<deadpool_redis::Pool>,
}

impl AppComponentsBuilder {
    #[must_use]
    pub const fn new(jobs: JobsConfig) -> Self {
        Self {
            jobs,
            database: None,
            redis: None,
        }
    }

    /// Backs the ledger and entity statuses with PostgreSQL.
    #[must_use]
    pub fn with_database_pool(mut self, pool: Arc<dyn DatabasePoolInterface>) -> Self {
        self.database = Some(pool);
        self
    }

    /// Backs the queue and cancellation signal with Redis.
    #[must_use]
    pub fn with_redis_pool(mut self, pool: deadpool_redis::Pool) -> Self {
        self.redis = Some(pool);
        self
    }

    #[must_use]
    pub fn build(self) -> AppComponents {
        let keys = RedisKeys::from_config(&self.jobs);

        let (ledger, assets): (Arc<dyn JobLedger>, Arc<dyn AssetStatusRepository>) =
            match &self.database {
                Some(pool) => (
                    Arc::new(PgJobLedger::new(pool.clone())),
                    Arc::new(PgAssetStatusRepository::new(pool.clone())),
                ),
                None => {
                    warn!("No database pool configured, job ledger is in memory");
                    (
                        Arc::new(InMemoryJobLedger::new()),
                        Arc::new(InMemoryAssetStatusRepository::new()),
                    )
                }
            };

        let (queue, cancellation): (Arc<dyn TaskQueue>, Arc<dyn CancellationSignal>) =
            match &self.redis {
                Some(pool) => (
                    Arc::new(RedisTaskQueue::new(pool.clone(), keys.clone())),
                    Arc::new(RedisCancellation::new(
                        pool.clone(),
                        keys.clone(),
                        self.jobs.cancel_ttl(),
                    )),
                ),
                None => {
                    warn!("No Redis pool configured, task queue is in memory");
                    (
                        Arc::new(InMemoryTaskQueue::new()),
                        Arc::new(InMemoryCancellation::new()),
                    )
                }
            };

        let hub = Arc::new(FanoutHub::new());

        let producer = Arc::new(JobProducer::new(
            ledger.clone(),
            assets.clone(),
            queue.clone(),
            cancellation.clone(),
            hub.clone(),
        ));

        let relay = Arc::new(
            ProgressRelay::new(ledger.clone(), assets.clone(), hub.clone(), keys)
                .with_max_reconnect_interval(self.jobs.relay.max_reconnect_interval()),
        );

        let sweeper = Arc::new(StaleJobSweeper::new(
            ledger.clone(),
            assets.clone(),
            hub.clone(),
            &self.jobs.sweep,
        ));

        info!("Application components built");

        AppComponents {
            hub,
            ledger,
            assets,
            queue,
            cancellation,
            producer,
            relay,
            sweeper,
            database: self.database,
            redis: self.redis,
        }
    }
}
