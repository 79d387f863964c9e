//! In-process implementations for tests and single-node local runs.

use crate::{AssetStatusRepository, IdleCutoffs, JobLedger, LedgerOutcome};
use adpulse_core::{AdpulseError, AdpulseResult, JobId};
use adpulse_domain::{AssetStatus, EntityRef, Job, NewJob, Transition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

/// Job ledger backed by a map; the mutex gives the same single-row
/// atomicity the database provides.
#[derive(Debug, Default)]
pub struct InMemoryJobLedger {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl InMemoryJobLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    /// Overwrites the last-activity timestamp of a job.
    pub fn set_updated_at(&self, job_id: &JobId, updated_at: DateTime<Utc>) {
        if let Some(job) = self.jobs.lock().get_mut(job_id) {
            job.updated_at = updated_at;
        }
    }

    fn mutate(&self, job_id: &JobId, apply: impl FnOnce(&mut Job) -> Transition) -> LedgerOutcome {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(job_id) else {
            return LedgerOutcome::NotFound;
        };
        let previous = job.status;
        match apply(job) {
            Transition::Applied => LedgerOutcome::Applied {
                job: job.clone(),
                previous,
            },
            Transition::AlreadyTerminal => LedgerOutcome::AlreadyTerminal(job.clone()),
        }
    }
}

#[async_trait]
impl JobLedger for InMemoryJobLedger {
    async fn insert(&self, new: NewJob) -> AdpulseResult<Job> {
        let mut jobs = self.jobs.lock();
        if jobs.contains_key(&new.job_id) {
            return Err(AdpulseError::conflict(format!("job {} already exists", new.job_id)));
        }
        let job = Job::queued(new, Utc::now());
        jobs.insert(job.job_id.clone(), job.clone());
        Ok(job)
    }

    async fn find(&self, job_id: &JobId) -> AdpulseResult<Option<Job>> {
        Ok(self.jobs.lock().get(job_id).cloned())
    }

    async fn record_progress(
        &self,
        job_id: &JobId,
        progress: i16,
        step: Option<&str>,
        worker_id: Option<&str>,
    ) -> AdpulseResult<LedgerOutcome> {
        Ok(self.mutate(job_id, |job| {
            job.record_progress(progress, step, worker_id, Utc::now())
        }))
    }

    async fn mark_completed(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome> {
        Ok(self.mutate(job_id, |job| job.complete(Utc::now())))
    }

    async fn mark_failed(
        &self,
        job_id: &JobId,
        message: &str,
        stack: Option<&str>,
    ) -> AdpulseResult<LedgerOutcome> {
        Ok(self.mutate(job_id, |job| job.fail(message, stack, Utc::now())))
    }

    async fn mark_cancelled(&self, job_id: &JobId) -> AdpulseResult<LedgerOutcome> {
        Ok(self.mutate(job_id, |job| job.cancel(Utc::now())))
    }

    async fn find_stale(&self, cutoffs: IdleCutoffs, limit: i64) -> AdpulseResult<Vec<Job>> {
        let mut stale: Vec<Job> = self
            .jobs
            .lock()
            .values()
            .filter(|job| cutoffs.is_stale(job))
            .cloned()
            .collect();
        stale.sort_by_key(|job| job.updated_at);
        stale.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(stale)
    }
}

/// Entity status store backed by a map.
///
/// Unknown entities are created on first write, unlike the database tables.
#[derive(Debug, Default)]
pub struct InMemoryAssetStatusRepository {
    statuses: Mutex<HashMap<EntityRef, (AssetStatus, Option<String>)>>,
}

impl InMemoryAssetStatusRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the last status written for an entity.
    #[must_use]
    pub fn status_of(&self, reference: EntityRef) -> Option<AssetStatus> {
        self.statuses.lock().get(&reference).map(|(status, _)| *status)
    }

    /// Returns the last error message written for an entity.
    #[must_use]
    pub fn error_of(&self, reference: EntityRef) -> Option<String> {
        self.statuses
            .lock()
            .get(&reference)
            .and_then(|(_, error)| error.clone())
    }
}

#[async_trait]
impl AssetStatusRepository for InMemoryAssetStatusRepository {
    async fn update_status(
        &self,
        reference: EntityRef,
        status: AssetStatus,
        error_message: Option<&str>,
    ) -> AdpulseResult<bool> {
        self.statuses
            .lock()
            .insert(reference, (status, error_message.map(str::to_string)));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adpulse_domain::{JobStatus, JobType, ReferenceType};

    fn new_job(id: &str) -> NewJob {
        NewJob {
            job_id: JobId::from(id),
            job_type: JobType::AdAnalysis,
            reference: EntityRef::new(ReferenceType::Ad, 1),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let ledger = InMemoryJobLedger::new();
        let job = ledger.insert(new_job("J1")).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);

        let found = ledger.find(&JobId::from("J1")).await.unwrap().unwrap();
        assert_eq!(found, job);
        assert!(ledger.find(&JobId::from("missing")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let ledger = InMemoryJobLedger::new();
        ledger.insert(new_job("J1")).await.unwrap();
        let err = ledger.insert(new_job("J1")).await.unwrap_err();
        assert_eq!(err.error_code(), "CONFLICT");
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_previous_status() {
        let ledger = InMemoryJobLedger::new();
        let id = JobId::from("J1");
        ledger.insert(new_job("J1")).await.unwrap();

        let first = ledger.record_progress(&id, 10, Some("a"), None).await.unwrap();
        assert!(matches!(
            first,
            LedgerOutcome::Applied { previous: JobStatus::Queued, .. }
        ));

        let second = ledger.record_progress(&id, 20, Some("b"), None).await.unwrap();
        assert!(matches!(
            second,
            LedgerOutcome::Applied { previous: JobStatus::Processing, .. }
        ));
    }

    #[tokio::test]
    async fn test_terminal_guard() {
        let ledger = InMemoryJobLedger::new();
        let id = JobId::from("J1");
        ledger.insert(new_job("J1")).await.unwrap();

        assert!(ledger.mark_completed(&id).await.unwrap().is_applied());
        let snapshot = ledger.find(&id).await.unwrap().unwrap();

        assert_eq!(
            ledger.mark_completed(&id).await.unwrap(),
            LedgerOutcome::AlreadyTerminal(snapshot.clone())
        );
        assert!(!ledger.mark_failed(&id, "late", None).await.unwrap().is_applied());
        assert!(!ledger.mark_cancelled(&id).await.unwrap().is_applied());
        assert!(!ledger
            .record_progress(&id, 50, None, None)
            .await
            .unwrap()
            .is_applied());
        assert_eq!(ledger.find(&id).await.unwrap().unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let ledger = InMemoryJobLedger::new();
        let id = JobId::from("nope");
        assert_eq!(ledger.mark_completed(&id).await.unwrap(), LedgerOutcome::NotFound);
        assert_eq!(
            ledger.record_progress(&id, 1, None, None).await.unwrap(),
            LedgerOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn test_find_stale() {
        let ledger = InMemoryJobLedger::new();
        for id in ["old", "fresh", "done"] {
            ledger.insert(new_job(id)).await.unwrap();
        }
        let past = Utc::now() - chrono::Duration::hours(2);
        ledger.set_updated_at(&JobId::from("old"), past);
        ledger.mark_completed(&JobId::from("done")).await.unwrap();
        ledger.set_updated_at(&JobId::from("done"), past);

        let cutoff = IdleCutoffs::uniform(Utc::now() - chrono::Duration::hours(1));
        let stale = ledger.find_stale(cutoff, 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].job_id.as_str(), "old");

        assert!(ledger.find_stale(cutoff, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_stale_judges_queued_and_processing_separately() {
        let ledger = InMemoryJobLedger::new();
        for id in ["waiting", "running"] {
            ledger.insert(new_job(id)).await.unwrap();
        }
        ledger
            .record_progress(&JobId::from("running"), 10, None, None)
            .await
            .unwrap();
        let idle_since = Utc::now() - chrono::Duration::hours(2);
        ledger.set_updated_at(&JobId::from("waiting"), idle_since);
        ledger.set_updated_at(&JobId::from("running"), idle_since);

        let cutoffs = IdleCutoffs {
            queued_before: Utc::now() - chrono::Duration::hours(6),
            processing_before: Utc::now() - chrono::Duration::hours(1),
        };
        let stale = ledger.find_stale(cutoffs, 10).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].job_id.as_str(), "running");
    }

    #[tokio::test]
    async fn test_asset_status() {
        let repo = InMemoryAssetStatusRepository::new();
        let reference = EntityRef::new(ReferenceType::ReactionVideo, 9);
        assert!(repo.status_of(reference).is_none());

        repo.update_status(reference, AssetStatus::Failed, Some("decode failed"))
            .await
            .unwrap();
        assert_eq!(repo.status_of(reference), Some(AssetStatus::Failed));
        assert_eq!(repo.error_of(reference).as_deref(), Some("decode failed"));
    }
}
