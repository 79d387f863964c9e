//! Redis cancellation flag plus notification.

use super::RedisKeys;
use crate::cancellation::CancellationSignal;
use crate::error::JobResult;
use adpulse_core::JobId;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

/// Sets `{namespace}:cancel:{job_id}` with a TTL and publishes on the same
/// name, so workers can either poll the flag or listen for it.
pub struct RedisCancellation {
    pool: Pool,
    keys: RedisKeys,
    ttl: Duration,
}

impl RedisCancellation {
    #[must_use]
    pub const fn new(pool: Pool, keys: RedisKeys, ttl: Duration) -> Self {
        Self { pool, keys, ttl }
    }
}

#[async_trait]
impl CancellationSignal for RedisCancellation {
    async fn cancel(&self, job_id: &JobId) -> JobResult<()> {
        let key = self.keys.cancel(job_id);
        let mut conn = self.pool.get().await?;

        let _: () = conn.set_ex(&key, 1, self.ttl.as_secs()).await?;
        let receivers: i64 = conn.publish(&key, job_id.as_str()).await?;

        debug!(job_id = %job_id, receivers, "Raised cancellation signal");
        Ok(())
    }

    async fn is_cancelled(&self, job_id: &JobId) -> JobResult<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.exists(self.keys.cancel(job_id)).await?)
    }
}
