//! # AdPulse Core
//!
//! Identifiers, error definitions, and tracing setup shared by every AdPulse
//! crate. Nothing here touches Redis, the database, or the network.

pub mod error;
pub mod id;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use id::*;
pub use result::*;

// Re-export shaku for the component interfaces
pub use shaku::Interface;
