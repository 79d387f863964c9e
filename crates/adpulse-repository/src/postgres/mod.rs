//! PostgreSQL implementations.

mod asset_status;
mod job_ledger;

pub use asset_status::PgAssetStatusRepository;
pub use job_ledger::PgJobLedger;
