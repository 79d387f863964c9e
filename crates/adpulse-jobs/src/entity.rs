//! Best-effort propagation of job status onto the analyzed entity.

use adpulse_domain::{AssetStatus, EntityRef};
use adpulse_repository::AssetStatusRepository;
use tracing::warn;

/// Writes the entity status; failures are logged and swallowed because the
/// ledger, not the entity row, is authoritative for job state.
pub(crate) async fn set_status(
    assets: &dyn AssetStatusRepository,
    reference: EntityRef,
    status: AssetStatus,
    error_message: Option<&str>,
) {
    match assets.update_status(reference, status, error_message).await {
        Ok(true) => {}
        Ok(false) => warn!(reference = %reference, status = status.as_str(), "Entity not found for status update"),
        Err(e) => warn!(reference = %reference, status = status.as_str(), error = %e, "Failed to update entity status"),
    }
}
