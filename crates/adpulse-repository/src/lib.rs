//! # AdPulse Repository
//!
//! Persistence for the job ledger and for the status columns of analyzed
//! entities.
//!
//! ```text
//! Producer / Relay / Sweep
//!   ↓  Arc<dyn JobLedger>, Arc<dyn AssetStatusRepository>
//! PgJobLedger, PgAssetStatusRepository      InMemoryJobLedger, ...
//!   ↓  Arc<dyn DatabasePoolInterface>
//! PostgreSQL
//! ```

pub mod memory;
pub mod pool;
pub mod postgres;
pub mod traits;

pub use memory::*;
pub use pool::*;
pub use postgres::*;
pub use traits::*;
