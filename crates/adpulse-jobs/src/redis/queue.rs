//! Redis list queue, compatible with the Python workers' `BRPOP` loop.

use super::RedisKeys;
use crate::descriptor::TaskDescriptor;
use crate::error::JobResult;
use crate::queue::TaskQueue;
use adpulse_domain::JobType;
use async_trait::async_trait;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, error};

/// Redis-backed task queue: `LPUSH` to enqueue, `BRPOP` to dequeue.
pub struct RedisTaskQueue {
    pool: Pool,
    keys: RedisKeys,
}

impl RedisTaskQueue {
    /// Create a new Redis task queue.
    #[must_use]
    pub const fn new(pool: Pool, keys: RedisKeys) -> Self {
        Self { pool, keys }
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> JobResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }

    fn decode(queue_key: &str, json: &str) -> Option<TaskDescriptor> {
        match TaskDescriptor::from_json(json) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                error!(queue = %queue_key, error = %e, "Dropping undecodable task descriptor");
                None
            }
        }
    }
}

#[async_trait]
impl TaskQueue for RedisTaskQueue {
    async fn enqueue(&self, descriptor: &TaskDescriptor) -> JobResult<()> {
        let queue_key = self.keys.queue(descriptor.job_type);
        let json = descriptor.to_json()?;

        let mut conn = self.conn().await?;
        let depth: usize = conn.lpush(&queue_key, json).await?;

        debug!(job_id = %descriptor.job_id, queue = %queue_key, depth, "Enqueued task");
        Ok(())
    }

    async fn dequeue(
        &self,
        job_types: &[JobType],
        timeout: Duration,
    ) -> JobResult<Option<TaskDescriptor>> {
        let queue_keys: Vec<String> = job_types.iter().map(|t| self.keys.queue(*t)).collect();
        if queue_keys.is_empty() {
            return Ok(None);
        }
        let mut conn = self.conn().await?;

        // BRPOP treats 0 as "block forever", so a zero timeout polls instead.
        if timeout.is_zero() {
            for queue_key in &queue_keys {
                let popped: Option<String> = conn.rpop(queue_key, None).await?;
                if let Some(json) = popped {
                    return Ok(Self::decode(queue_key, &json));
                }
            }
            return Ok(None);
        }

        let popped: Option<(String, String)> =
            conn.brpop(&queue_keys, timeout.as_secs_f64()).await?;
        Ok(popped.and_then(|(queue_key, json)| Self::decode(&queue_key, &json)))
    }

    async fn depth(&self, job_type: JobType) -> JobResult<usize> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(self.keys.queue(job_type)).await?)
    }
}
