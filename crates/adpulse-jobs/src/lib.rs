//! # AdPulse Jobs
//!
//! Job coordination between the API and external analysis workers:
//! - Producer that records a job, marks its entity and enqueues a descriptor
//! - Redis work lists, one per job type
//! - Progress relay from worker pub/sub into the ledger and the hub
//! - Cancellation signal observed by workers at progress checkpoints
//! - Staleness sweep for jobs whose worker went silent
//! - Worker runtime for handlers written in Rust
//!
//! # Architecture
//!
//! ```text
//!  HTTP ──► JobProducer ──► JobLedger (queued) ──► entity status (queued)
//!                │
//!                ▼ LPUSH rq:queue:{job_type}
//!        ┌───────────────┐
//!        │  Redis lists  │ ──BRPOP──► workers (Python, WorkerRuntime)
//!        └───────────────┘                 │
//!                                          ▼ PUBLISH job:{event}:{job_id}
//!                                  ┌───────────────┐
//!                                  │ Redis pub/sub │
//!                                  └───────┬───────┘
//!                                          ▼ PSUBSCRIBE job:*
//!                                   ProgressRelay
//!                                     │        │
//!                       guarded write ▼        ▼ broadcast if applied
//!                                JobLedger   FanoutHub ──► WebSocket clients
//!
//!  StaleJobSweeper ── fails idle jobs through the same guarded write
//! ```

pub mod cancellation;
pub mod descriptor;
mod entity;
pub mod error;
pub mod metrics;
pub mod producer;
pub mod publisher;
pub mod queue;
pub mod redis;
pub mod relay;
pub mod sweep;
pub mod worker;

pub use cancellation::{CancellationSignal, InMemoryCancellation};
pub use descriptor::{TaskDescriptor, TaskPayload};
pub use error::{JobError, JobResult};
pub use metrics::register_metrics;
pub use producer::{JobProducer, JobRequest};
pub use publisher::{EventPublisher, InMemoryEventPublisher};
pub use queue::{InMemoryTaskQueue, TaskQueue};
pub use crate::redis::{RedisCancellation, RedisEventPublisher, RedisKeys, RedisTaskQueue};
pub use relay::{ProgressRelay, RelayOutcome};
pub use sweep::StaleJobSweeper;
pub use worker::{ProgressReporter, TaskFailure, TaskHandler, WorkerRuntime, WorkerStats};

/// Re-export commonly used traits
pub mod prelude {
    pub use crate::cancellation::CancellationSignal;
    pub use crate::publisher::EventPublisher;
    pub use crate::queue::TaskQueue;
    pub use crate::worker::{ProgressReporter, TaskFailure, TaskHandler};
    pub use crate::{JobError, JobResult, TaskDescriptor};
}
