//! # AdPulse REST
//!
//! HTTP endpoints for creating, inspecting, and cancelling jobs, plus the
//! WebSocket endpoint clients use to follow job progress through the hub.

pub mod controllers;
pub mod extractors;
pub mod middleware;
pub mod responses;
pub mod router;
pub mod state;
pub mod ws;

pub use router::*;
pub use state::*;
