//! Status propagation onto `ads` and `reaction_videos`.

use crate::{AssetStatusRepository, DatabasePoolInterface};
use adpulse_core::AdpulseResult;
use adpulse_domain::{AssetStatus, EntityRef, ReferenceType};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// PostgreSQL implementation of [`AssetStatusRepository`].
#[derive(Clone)]
pub struct PgAssetStatusRepository {
    pool: Arc<dyn DatabasePoolInterface>,
}

impl PgAssetStatusRepository {
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetStatusRepository for PgAssetStatusRepository {
    async fn update_status(
        &self,
        reference: EntityRef,
        status: AssetStatus,
        error_message: Option<&str>,
    ) -> AdpulseResult<bool> {
        debug!(reference = %reference, status = %status, "Updating entity status");

        let sql = match reference.reference_type {
            ReferenceType::Ad => {
                "UPDATE ads SET status = $1, error_message = $2, updated_at = NOW() WHERE id = $3"
            }
            ReferenceType::ReactionVideo => {
                "UPDATE reaction_videos SET status = $1, error_message = $2, updated_at = NOW() WHERE id = $3"
            }
        };

        let result = sqlx::query(sql)
            .bind(status.as_str())
            .bind(error_message)
            .bind(reference.reference_id)
            .execute(self.pool.inner())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
