//! Worker-side event publishing.

use crate::error::JobResult;
use adpulse_core::Interface;
use adpulse_domain::WorkerEvent;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Sends worker events to the relay.
#[async_trait]
pub trait EventPublisher: Interface {
    async fn publish(&self, event: &WorkerEvent) -> JobResult<()>;
}

/// Publisher that keeps every event in memory.
#[derive(Debug, Default)]
pub struct InMemoryEventPublisher {
    events: Mutex<Vec<WorkerEvent>>,
}

impl InMemoryEventPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Events published so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<WorkerEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventPublisher {
    async fn publish(&self, event: &WorkerEvent) -> JobResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
