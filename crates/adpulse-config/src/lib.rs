//! # AdPulse Config
//!
//! Layered configuration: TOML files under `config/`, then `ADPULSE__`
//! environment variables, with `.env` support for local runs.

mod app_config;
mod jobs_config;
mod loader;

pub use app_config::*;
pub use jobs_config::*;
pub use loader::*;
