//! Repository trait definitions.

use adpulse_core::{AdpulseResult, Interface, JobId};
use adpulse_domain::{AssetStatus, EntityRef, Job, JobStatus, NewJob};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Last-activity deadlines for the staleness sweep, one per live status.
///
/// A queue backlog is expected to sit longer than a running job between
/// progress ticks, so the two are judged separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleCutoffs {
    pub queued_before: DateTime<Utc>,
    pub processing_before: DateTime<Utc>,
}

impl IdleCutoffs {
    /// The same deadline for both statuses.
    #[must_use]
    pub const fn uniform(before: DateTime<Utc>) -> Self {
        Self {
            queued_before: before,
            processing_before: before,
        }
    }

    /// Whether `job` has been idle past its status's deadline.
    #[must_use]
    pub fn is_stale(&self, job: &Job) -> bool {
        match job.status {
            JobStatus::Queued => job.updated_at < self.queued_before,
            JobStatus::Processing => job.updated_at < self.processing_before,
            _ => false,
        }
    }
}

/// Result of a guarded ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The row changed; `previous` is its status before the write.
    Applied { job: Job, previous: JobStatus },
    /// The row was already terminal and was left untouched.
    AlreadyTerminal(Job),
    /// No row with that id.
    NotFound,
}

impl LedgerOutcome {
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Returns the applied row, if any.
    #[must_use]
    pub fn applied(self) -> Option<Job> {
        match self {
            Self::Applied { job, .. } => Some(job),
            _ => None,
        }
    }
}

/// The persisted job ledger.
///
/// Every mutation is a single guarded write: rows in a terminal state are
/// never modified, whichever writer gets there first wins.
#[async_trait]
pub trait JobLedger: Interface + Send + Sync {
    /// Inserts a new `queued` row. Fails with `Conflict` on a duplicate id.
    async fn insert(&self, job: NewJob) -> AdpulseResult<Job>;

    /// Finds a job by id.
    async fn find(&self, job_id: &JobId) -> AdpulseResult<Option<Job>>;

    /// Applies a progress tick (clamped, monotonic, `queued → processing`).
    async fn record_progress(
        &self,
        job_id: &JobId,
        progress: i16,
        step: Option<&str>,
        worker_id: Option<&str>,
    ) -> AdpulseResult<LedgerOutcome>;

    /// Marks a job completed.
    async fn mark_completed(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome>;

    /// Marks a job failed.
    async fn mark_failed(
        &self,
        job_id: &JobId,
        message: &str,
        stack: Option<&str>,
    ) -> AdpulseResult<LedgerOutcome>;

    /// Marks a job cancelled.
    async fn mark_cancelled(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome>;

    /// Lists non-terminal jobs idle past their status's cutoff, oldest first.
    async fn find_stale(&self, cutoffs: IdleCutoffs, limit: i64) -> AdpulseResult<Vec<Job>>;
}

/// Status column of the analyzed entities.
#[async_trait]
pub trait AssetStatusRepository: Interface + Send + Sync {
    /// Sets the entity's status. Returns `false` when the entity does not exist.
    async fn update_status(
        &self,
        reference: EntityRef,
        status: AssetStatus,
        error_message: Option<&str>,
    ) -> AdpulseResult<bool>;
}
