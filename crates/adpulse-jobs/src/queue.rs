//! Task queue abstraction.

use crate::descriptor::TaskDescriptor;
use crate::error::JobResult;
use adpulse_core::Interface;
use adpulse_domain::JobType;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;

/// FIFO queue of task descriptors, one lane per job type.
#[async_trait]
pub trait TaskQueue: Interface {
    /// Appends a descriptor to the lane of its job type.
    async fn enqueue(&self, descriptor: &TaskDescriptor) -> JobResult<()>;

    /// Pops the oldest descriptor from the first non-empty lane in
    /// `job_types`, waiting up to `timeout`.
    async fn dequeue(
        &self,
        job_types: &[JobType],
        timeout: Duration,
    ) -> JobResult<Option<TaskDescriptor>>;

    /// Number of descriptors waiting in one lane.
    async fn depth(&self, job_type: JobType) -> JobResult<usize>;
}

/// Queue held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    lanes: Mutex<HashMap<JobType, VecDeque<TaskDescriptor>>>,
    notify: Notify,
}

impl InMemoryTaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies the descriptors waiting in one lane, oldest first.
    #[must_use]
    pub fn pending(&self, job_type: JobType) -> Vec<TaskDescriptor> {
        self.lanes
            .lock()
            .get(&job_type)
            .map(|lane| lane.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn pop(&self, job_types: &[JobType]) -> Option<TaskDescriptor> {
        let mut lanes = self.lanes.lock();
        job_types
            .iter()
            .find_map(|job_type| lanes.get_mut(job_type).and_then(VecDeque::pop_front))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn enqueue(&self, descriptor: &TaskDescriptor) -> JobResult<()> {
        self.lanes
            .lock()
            .entry(descriptor.job_type)
            .or_default()
            .push_back(descriptor.clone());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dequeue(
        &self,
        job_types: &[JobType],
        timeout: Duration,
    ) -> JobResult<Option<TaskDescriptor>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            if let Some(descriptor) = self.pop(job_types) {
                return Ok(Some(descriptor));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.pop(job_types));
            }
        }
    }

    async fn depth(&self, job_type: JobType) -> JobResult<usize> {
        Ok(self.lanes.lock().get(&job_type).map_or(0, VecDeque::len))
    }
}
