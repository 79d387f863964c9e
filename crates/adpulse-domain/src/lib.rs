//! # AdPulse Domain
//!
//! The job record and its state machine, the worker event envelope accepted
//! by the relay, and the events exchanged with hub clients.
//!
//! ```text
//!            progress            completed / error
//!  queued ───────────► processing ─────────────────► completed | failed
//!    │  \                  │
//!    │   └── completed / error (out-of-order delivery) ──►
//!    │                     │
//!    └──── cancel ─────────┴──────► cancelled
//! ```
//!
//! Terminal states accept no further mutation.

pub mod error;
pub mod hub_event;
pub mod job;
pub mod status;
pub mod worker_event;

pub use error::*;
pub use hub_event::*;
pub use job::*;
pub use status::*;
pub use worker_event::*;
