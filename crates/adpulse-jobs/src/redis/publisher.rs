//! Redis pub/sub event publisher.

use super::RedisKeys;
use crate::error::JobResult;
use crate::publisher::EventPublisher;
use adpulse_domain::WorkerEvent;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use tracing::trace;

/// Publishes worker events on `{namespace}:{event}:{job_id}`.
pub struct RedisEventPublisher {
    pool: Pool,
    keys: RedisKeys,
}

impl RedisEventPublisher {
    #[must_use]
    pub const fn new(pool: Pool, keys: RedisKeys) -> Self {
        Self { pool, keys }
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, event: &WorkerEvent) -> JobResult<()> {
        let channel = self.keys.event_channel(event.kind(), event.job_id());
        let payload = event.to_payload().to_string();

        let mut conn = self.pool.get().await?;
        let receivers: i64 = conn.publish(&channel, payload).await?;

        trace!(channel = %channel, receivers, "Published worker event");
        Ok(())
    }
}
