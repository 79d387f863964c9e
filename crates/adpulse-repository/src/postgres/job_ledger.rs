//! PostgreSQL job ledger.
//!
//! Each mutation locks the row in a CTE, applies the change only while the
//! row is `queued` or `processing`, and returns the new row together with the
//! status it had before. A missing result means the row is unknown or
//! terminal; a follow-up read tells the two apart.

use crate::{DatabasePoolInterface, IdleCutoffs, JobLedger, LedgerOutcome};
use adpulse_core::{AdpulseError, AdpulseResult, JobId};
use adpulse_domain::{Job, JobStatus, JobType, NewJob, ReferenceType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::sync::Arc;
use tracing::debug;

/// PostgreSQL implementation of [`JobLedger`].
#[derive(Clone)]
pub struct PgJobLedger {
    pool: Arc<dyn DatabasePoolInterface>,
}

impl PgJobLedger {
    /// Creates a new ledger on the given pool.
    #[must_use]
    pub fn new(pool: Arc<dyn DatabasePoolInterface>) -> Self {
        Self { pool }
    }

    async fn resolve_miss(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome> {
        Ok(match self.find(job_id).await? {
            Some(job) => LedgerOutcome::AlreadyTerminal(job),
            None => LedgerOutcome::NotFound,
        })
    }

    async fn outcome(
        &self,
        job_id: &JobId,
        row: Option<TransitionRow>,
    ) -> AdpulseResult<LedgerOutcome> {
        match row {
            Some(row) => {
                let previous = parse_column::<JobStatus>(&row.previous_status)?;
                Ok(LedgerOutcome::Applied {
                    job: Job::try_from(row.job)?,
                    previous,
                })
            }
            None => self.resolve_miss(job_id).await,
        }
    }
}

/// Database row representation of a job.
#[derive(Debug, FromRow)]
struct JobRow {
    job_id: String,
    job_type: String,
    reference_type: String,
    reference_id: i64,
    status: String,
    progress: i16,
    current_step: Option<String>,
    error_message: Option<String>,
    error_stack: Option<String>,
    worker_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct TransitionRow {
    #[sqlx(flatten)]
    job: JobRow,
    previous_status: String,
}

fn parse_column<T>(value: &str) -> AdpulseResult<T>
where
    T: std::str::FromStr<Err = adpulse_domain::DomainError>,
{
    value
        .parse()
        .map_err(|e| AdpulseError::Internal(format!("Invalid value in jobs table: {}", e)))
}

impl TryFrom<JobRow> for Job {
    type Error = AdpulseError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            job_id: JobId::from(row.job_id),
            job_type: parse_column::<JobType>(&row.job_type)?,
            reference_type: parse_column::<ReferenceType>(&row.reference_type)?,
            reference_id: row.reference_id,
            status: parse_column::<JobStatus>(&row.status)?,
            progress: row.progress,
            current_step: row.current_step,
            error_message: row.error_message,
            error_stack: row.error_stack,
            worker_id: row.worker_id,
            started_at: row.started_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl JobLedger for PgJobLedger {
    async fn insert(&self, job: NewJob) -> AdpulseResult<Job> {
        debug!(job_id = %job.job_id, job_type = %job.job_type, "Inserting job");

        let row = sqlx::query_as::<_, JobRow>(
            r#"
            INSERT INTO jobs (job_id, job_type, reference_type, reference_id, status, progress)
            VALUES ($1, $2, $3, $4, 'queued', 0)
            RETURNING job_id, job_type, reference_type, reference_id, status, progress,
                      current_step, error_message, error_stack, worker_id,
                      started_at, completed_at, created_at, updated_at
            "#,
        )
        .bind(job.job_id.as_str())
        .bind(job.job_type.as_str())
        .bind(job.reference.reference_type.as_str())
        .bind(job.reference.reference_id)
        .fetch_one(self.pool.inner())
        .await?;

        Job::try_from(row)
    }

    async fn find(&self, job_id: &JobId) -> AdpulseResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, job_type, reference_type, reference_id, status, progress,
                   current_step, error_message, error_stack, worker_id,
                   started_at, completed_at, created_at, updated_at
            FROM jobs
            WHERE job_id = $1
            "#,
        )
        .bind(job_id.as_str())
        .fetch_optional(self.pool.inner())
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn record_progress(
        &self,
        job_id: &JobId,
        progress: i16,
        step: Option<&str>,
        worker_id: Option<&str>,
    ) -> AdpulseResult<LedgerOutcome> {
        let progress = adpulse_domain::clamp_progress(i64::from(progress));

        let row = sqlx::query_as::<_, TransitionRow>(
            r#"
            WITH prev AS (
                SELECT job_id, status AS previous_status
                FROM jobs
                WHERE job_id = $1
                FOR UPDATE
            )
            UPDATE jobs AS j
            SET progress = GREATEST(j.progress, $2),
                current_step = CASE
                    WHEN $2 >= j.progress THEN COALESCE($3, j.current_step)
                    ELSE j.current_step
                END,
                worker_id = COALESCE($4, j.worker_id),
                status = 'processing',
                started_at = COALESCE(j.started_at, NOW()),
                updated_at = NOW()
            FROM prev
            WHERE j.job_id = prev.job_id
              AND j.status IN ('queued', 'processing')
            RETURNING j.job_id, j.job_type, j.reference_type, j.reference_id, j.status,
                      j.progress, j.current_step, j.error_message, j.error_stack,
                      j.worker_id, j.started_at, j.completed_at, j.created_at,
                      j.updated_at, prev.previous_status
            "#,
        )
        .bind(job_id.as_str())
        .bind(progress)
        .bind(step)
        .bind(worker_id)
        .fetch_optional(self.pool.inner())
        .await?;

        self.outcome(job_id, row).await
    }

    async fn mark_completed(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome> {
        let row = sqlx::query_as::<_, TransitionRow>(
            r#"
            WITH prev AS (
                SELECT job_id, status AS previous_status
                FROM jobs
                WHERE job_id = $1
                FOR UPDATE
            )
            UPDATE jobs AS j
            SET status = 'completed',
                progress = 100,
                completed_at = COALESCE(j.completed_at, NOW()),
                updated_at = NOW()
            FROM prev
            WHERE j.job_id = prev.job_id
              AND j.status IN ('queued', 'processing')
            RETURNING j.job_id, j.job_type, j.reference_type, j.reference_id, j.status,
                      j.progress, j.current_step, j.error_message, j.error_stack,
                      j.worker_id, j.started_at, j.completed_at, j.created_at,
                      j.updated_at, prev.previous_status
            "#,
        )
        .bind(job_id.as_str())
        .fetch_optional(self.pool.inner())
        .await?;

        self.outcome(job_id, row).await
    }

    async fn mark_failed(
        &self,
        job_id: &JobId,
        message: &str,
        stack: Option<&str>,
    ) -> AdpulseResult<LedgerOutcome> {
        let row = sqlx::query_as::<_, TransitionRow>(
            r#"
            WITH prev AS (
                SELECT job_id, status AS previous_status
                FROM jobs
                WHERE job_id = $1
                FOR UPDATE
            )
            UPDATE jobs AS j
            SET status = 'failed',
                error_message = $2,
                error_stack = $3,
                completed_at = COALESCE(j.completed_at, NOW()),
                updated_at = NOW()
            FROM prev
            WHERE j.job_id = prev.job_id
              AND j.status IN ('queued', 'processing')
            RETURNING j.job_id, j.job_type, j.reference_type, j.reference_id, j.status,
                      j.progress, j.current_step, j.error_message, j.error_stack,
                      j.worker_id, j.started_at, j.completed_at, j.created_at,
                      j.updated_at, prev.previous_status
            "#,
        )
        .bind(job_id.as_str())
        .bind(message)
        .bind(stack)
        .fetch_optional(self.pool.inner())
        .await?;

        self.outcome(job_id, row).await
    }

    async fn mark_cancelled(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome> {
        let row = sqlx::query_as::<_, TransitionRow>(
            r#"
            WITH prev AS (
                SELECT job_id, status AS previous_status
                FROM jobs
                WHERE job_id = $1
                FOR UPDATE
            )
            UPDATE jobs AS j
            SET status = 'cancelled',
                completed_at = COALESCE(j.completed_at, NOW()),
                updated_at = NOW()
            FROM prev
            WHERE j.job_id = prev.job_id
              AND j.status IN ('queued', 'processing')
            RETURNING j.job_id, j.job_type, j.reference_type, j.reference_id, j.status,
                      j.progress, j.current_step, j.error_message, j.error_stack,
                      j.worker_id, j.started_at, j.completed_at, j.created_at,
                      j.updated_at, prev.previous_status
            "#,
        )
        .bind(job_id.as_str())
        .fetch_optional(self.pool.inner())
        .await?;

        self.outcome(job_id, row).await
    }

    async fn find_stale(&self, cutoffs: IdleCutoffs, limit: i64) -> AdpulseResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT job_id, job_type, reference_type, reference_id, status, progress,
                   current_step, error_message, error_stack, worker_id,
                   started_at, completed_at, created_at, updated_at
            FROM jobs
            WHERE (status = 'queued' AND updated_at < $1)
               OR (status = 'processing' AND updated_at < $2)
            ORDER BY updated_at
            LIMIT $3
            "#,
        )
        .bind(cutoffs.queued_before)
        .bind(cutoffs.processing_before)
        .bind(limit)
        .fetch_all(self.pool.inner())
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}
