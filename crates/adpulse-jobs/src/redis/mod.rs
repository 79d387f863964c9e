//! Redis-backed queue, event bus, and cancellation signal.

mod cancellation;
mod publisher;
mod queue;

pub use cancellation::RedisCancellation;
pub use publisher::RedisEventPublisher;
pub use queue::RedisTaskQueue;

use crate::error::{JobError, JobResult};
use adpulse_config::{JobsConfig, RedisConfig};
use adpulse_core::JobId;
use adpulse_domain::{ChannelKind, EventChannel, JobType};
use deadpool_redis::{Config, Pool, Runtime};
use tracing::info;

/// Create a Redis connection pool.
pub async fn create_pool(config: &RedisConfig) -> JobResult<Pool> {
    info!("Creating Redis connection pool...");

    let cfg = Config::from_url(&config.url);

    let pool = cfg
        .builder()
        .map_err(|e| JobError::Configuration(format!("Invalid Redis config: {}", e)))?
        .max_size(config.pool_size)
        .wait_timeout(Some(config.connection_timeout()))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| JobError::Configuration(format!("Failed to create pool: {}", e)))?;

    // Test connection
    let mut conn = pool.get().await?;
    redis::cmd("PING")
        .query_async::<String>(&mut *conn)
        .await?;

    info!("Redis connection pool created successfully");

    Ok(pool)
}

/// Opens a client for pub/sub, which needs a dedicated connection.
pub fn create_client(config: &RedisConfig) -> JobResult<redis::Client> {
    redis::Client::open(config.url.as_str())
        .map_err(|e| JobError::Configuration(format!("Invalid Redis URL: {}", e)))
}

/// Redis key and channel builder.
#[derive(Debug, Clone)]
pub struct RedisKeys {
    queue_prefix: String,
    namespace: String,
}

impl RedisKeys {
    /// Create a key builder from a queue prefix and a channel namespace.
    pub fn new(queue_prefix: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            queue_prefix: queue_prefix.into(),
            namespace: namespace.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &JobsConfig) -> Self {
        Self::new(&config.queue_prefix, &config.channel_namespace)
    }

    /// Channel namespace, the first segment of every event channel.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Queue list for a job type.
    #[must_use]
    pub fn queue(&self, job_type: JobType) -> String {
        format!("{}:{}", self.queue_prefix, job_type)
    }

    /// Channel a worker event travels on.
    #[must_use]
    pub fn event_channel(&self, kind: ChannelKind, job_id: &JobId) -> String {
        EventChannel::format(&self.namespace, kind, job_id)
    }

    /// Pattern matching every channel in the namespace.
    #[must_use]
    pub fn event_pattern(&self) -> String {
        format!("{}:*", self.namespace)
    }

    /// Cancellation flag key; the signal is published on the same name.
    #[must_use]
    pub fn cancel(&self, job_id: &JobId) -> String {
        self.event_channel(ChannelKind::Cancel, job_id)
    }
}

impl Default for RedisKeys {
    fn default() -> Self {
        Self::from_config(&JobsConfig::default())
    }
}
