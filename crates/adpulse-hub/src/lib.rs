//! # AdPulse Hub
//!
//! In-process fan-out of job events to connected clients, and the
//! client-side observer that follows one job.
//!
//! ```text
//!   Progress Relay / Producer
//!           │ broadcast(&HubEvent)
//!           ▼
//!   ┌──────────────────────────────┐
//!   │          FanoutHub           │
//!   │  topic (job id) → {conn ids} │
//!   │  conn id → {sender, topics}  │
//!   └───────┬──────────┬───────────┘
//!           ▼          ▼
//!     HubConnection  HubConnection   (one per WebSocket)
//!           │
//!           ▼
//!   ProgressObserver (idle → processing → completed | failed | cancelled)
//! ```

pub mod hub;
pub mod metrics;
pub mod observer;

pub use hub::{
    Broadcaster, ConnectionHandle, FanoutHub, HubConnection, HubStats, TopicSubscriber,
};
pub use observer::{ObserverSnapshot, ObserverState, ProgressObserver};
