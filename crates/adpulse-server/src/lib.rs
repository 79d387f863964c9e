//! # AdPulse Server Library
//!
//! Component wiring and process lifecycle for the AdPulse server: the HTTP
//! and WebSocket API, the progress relay, and the staleness sweep run in one
//! process around a shared hub.

pub mod app;
pub mod di;
pub mod startup;
