//! Per-job cancellation signal.
//!
//! Cancelling a job only marks it; workers notice at their next progress
//! checkpoint. A worker that never checks runs to the end, and the ledger
//! ignores whatever it reports afterwards.

use crate::error::JobResult;
use adpulse_core::{Interface, JobId};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;

#[async_trait]
pub trait CancellationSignal: Interface {
    /// Raises the signal for a job.
    async fn cancel(&self, job_id: &JobId) -> JobResult<()>;

    /// Returns `true` once the signal for a job has been raised.
    async fn is_cancelled(&self, job_id: &JobId) -> JobResult<bool>;
}

/// Signal set held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCancellation {
    cancelled: RwLock<HashSet<JobId>>,
}

impl InMemoryCancellation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CancellationSignal for InMemoryCancellation {
    async fn cancel(&self, job_id: &JobId) -> JobResult<()> {
        self.cancelled.write().insert(job_id.clone());
        Ok(())
    }

    async fn is_cancelled(&self, job_id: &JobId) -> JobResult<bool> {
        Ok(self.cancelled.read().contains(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_is_per_job() {
        let signal = InMemoryCancellation::new();
        signal.cancel(&JobId::from("J1")).await.unwrap();

        assert!(signal.is_cancelled(&JobId::from("J1")).await.unwrap());
        assert!(!signal.is_cancelled(&JobId::from("J2")).await.unwrap());
    }
}
