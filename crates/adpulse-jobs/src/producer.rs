//! Job creation, lookup, and cancellation.

use crate::cancellation::CancellationSignal;
use crate::descriptor::{TaskDescriptor, TaskPayload};
use crate::entity;
use crate::error::{JobError, JobResult};
use crate::metrics;
use crate::queue::TaskQueue;
use adpulse_core::JobId;
use adpulse_domain::{AssetStatus, EntityRef, HubEvent, Job, JobType, NewJob};
use adpulse_hub::Broadcaster;
use adpulse_repository::{AssetStatusRepository, JobLedger, LedgerOutcome};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// A request to analyze one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_type: JobType,
    pub reference: EntityRef,
    pub payload: TaskPayload,
}

impl JobRequest {
    /// Checks the request before anything is written.
    pub fn validate(&self) -> JobResult<()> {
        self.job_type
            .check_reference(self.reference.reference_type)
            .map_err(|e| JobError::Validation(e.to_string()))?;

        if self.reference.reference_id <= 0 {
            return Err(JobError::Validation(format!(
                "reference id must be positive, got {}",
                self.reference.reference_id
            )));
        }
        if self.payload.file_path.trim().is_empty() {
            return Err(JobError::Validation("file_path must not be empty".into()));
        }
        // Ad workers branch on the media kind before they can report anything.
        if self.job_type == JobType::AdAnalysis
            && !self
                .payload
                .file_type
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
        {
            return Err(JobError::Validation("file_type is required for ad_analysis jobs".into()));
        }
        Ok(())
    }
}

/// Entry point for creating and cancelling jobs.
///
/// Returns as soon as the descriptor is queued; nothing here waits on a
/// worker.
pub struct JobProducer {
    ledger: Arc<dyn JobLedger>,
    assets: Arc<dyn AssetStatusRepository>,
    queue: Arc<dyn TaskQueue>,
    cancellation: Arc<dyn CancellationSignal>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl JobProducer {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        assets: Arc<dyn AssetStatusRepository>,
        queue: Arc<dyn TaskQueue>,
        cancellation: Arc<dyn CancellationSignal>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            ledger,
            assets,
            queue,
            cancellation,
            broadcaster,
        }
    }

    /// Records a `queued` job and places its descriptor on the queue.
    ///
    /// When the queue refuses the descriptor the ledger row stays `queued`
    /// and the caller gets [`JobError::QueueUnavailable`] naming the job id.
    /// The orphaned row is later failed by the staleness sweep unless the
    /// caller cancels it first.
    #[instrument(skip(self, request), fields(job_type = %request.job_type, reference = %request.reference))]
    pub async fn create_job(&self, request: JobRequest) -> JobResult<JobId> {
        request.validate()?;

        let job_id = JobId::new();
        let JobRequest {
            job_type,
            reference,
            payload,
        } = request;

        self.ledger
            .insert(NewJob {
                job_id: job_id.clone(),
                job_type,
                reference,
            })
            .await?;

        entity::set_status(self.assets.as_ref(), reference, AssetStatus::Queued, None).await;

        let descriptor = TaskDescriptor::new(job_id.clone(), job_type, reference, payload);
        if let Err(e) = self.queue.enqueue(&descriptor).await {
            metrics::enqueue_failed(job_type.as_str());
            error!(job_id = %job_id, error = %e, "Failed to enqueue task, job left queued");
            return Err(JobError::queue_unavailable(format!("job {job_id}: {e}")));
        }

        metrics::job_created(job_type.as_str());
        info!(job_id = %job_id, "Job created");
        Ok(job_id)
    }

    /// Reads the current ledger record.
    pub async fn get_job_status(&self, job_id: &JobId) -> JobResult<Option<Job>> {
        Ok(self.ledger.find(job_id).await?)
    }

    /// Cancels a job that has not finished yet.
    ///
    /// Returns `false` when the job is unknown or already terminal. On
    /// success the worker-facing signal is raised, the entity is marked
    /// `cancelled`, and subscribers get `job:cancelled`; failures in those
    /// follow-ups are only logged.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn cancel_job(&self, job_id: &JobId) -> JobResult<bool> {
        let job = match self.ledger.mark_cancelled(job_id).await? {
            LedgerOutcome::Applied { job, .. } => job,
            LedgerOutcome::AlreadyTerminal(job) => {
                debug!(status = %job.status, "Job already finished, nothing to cancel");
                return Ok(false);
            }
            LedgerOutcome::NotFound => {
                debug!("Unknown job, nothing to cancel");
                return Ok(false);
            }
        };

        if let Err(e) = self.cancellation.cancel(job_id).await {
            warn!(error = %e, "Failed to raise cancellation signal");
        }
        entity::set_status(self.assets.as_ref(), job.reference(), AssetStatus::Cancelled, None)
            .await;
        let delivered = self.broadcaster.broadcast(&HubEvent::cancelled(job_id.clone()));

        metrics::job_cancelled();
        info!(delivered, "Job cancelled");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::InMemoryCancellation;
    use crate::queue::InMemoryTaskQueue;
    use adpulse_domain::{JobStatus, ReferenceType};
    use adpulse_hub::FanoutHub;
    use adpulse_repository::{InMemoryAssetStatusRepository, InMemoryJobLedger};
    use async_trait::async_trait;
    use std::time::Duration;

    mockall::mock! {
        Queue {}

        #[async_trait]
        impl TaskQueue for Queue {
            async fn enqueue(&self, descriptor: &TaskDescriptor) -> JobResult<()>;
            async fn dequeue(
                &self,
                job_types: &[JobType],
                timeout: Duration,
            ) -> JobResult<Option<TaskDescriptor>>;
            async fn depth(&self, job_type: JobType) -> JobResult<usize>;
        }
    }

    struct Fixture {
        ledger: Arc<InMemoryJobLedger>,
        assets: Arc<InMemoryAssetStatusRepository>,
        queue: Arc<InMemoryTaskQueue>,
        cancellation: Arc<InMemoryCancellation>,
        hub: Arc<FanoutHub>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ledger: Arc::new(InMemoryJobLedger::new()),
                assets: Arc::new(InMemoryAssetStatusRepository::new()),
                queue: Arc::new(InMemoryTaskQueue::new()),
                cancellation: Arc::new(InMemoryCancellation::new()),
                hub: Arc::new(FanoutHub::new()),
            }
        }

        fn producer(&self) -> JobProducer {
            self.producer_with_queue(self.queue.clone())
        }

        fn producer_with_queue(&self, queue: Arc<dyn TaskQueue>) -> JobProducer {
            JobProducer::new(
                self.ledger.clone(),
                self.assets.clone(),
                queue,
                self.cancellation.clone(),
                self.hub.clone(),
            )
        }
    }

    fn ad_request(ad_id: i64) -> JobRequest {
        JobRequest {
            job_type: JobType::AdAnalysis,
            reference: EntityRef::new(ReferenceType::Ad, ad_id),
            payload: TaskPayload {
                file_path: format!("/uploads/ads/{ad_id}.png"),
                file_type: Some("image".into()),
                ad_id: None,
            },
        }
    }

    #[tokio::test]
    async fn test_create_job_queues_everything() {
        let fx = Fixture::new();
        let job_id = fx.producer().create_job(ad_request(7)).await.unwrap();

        let job = fx.ledger.find(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0);

        let reference = EntityRef::new(ReferenceType::Ad, 7);
        assert_eq!(fx.assets.status_of(reference), Some(AssetStatus::Queued));

        let pending = fx.queue.pending(JobType::AdAnalysis);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].job_id, job_id);
        assert_eq!(pending[0].ad_id, Some(7));
    }

    #[tokio::test]
    async fn test_job_ids_are_unique() {
        let fx = Fixture::new();
        let producer = fx.producer();
        let a = producer.create_job(ad_request(1)).await.unwrap();
        let b = producer.create_job(ad_request(1)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(fx.queue.pending(JobType::AdAnalysis).len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_request_writes_nothing() {
        let fx = Fixture::new();
        let producer = fx.producer();

        let mut mismatched = ad_request(1);
        mismatched.job_type = JobType::EmotionAnalysis;
        assert!(matches!(
            producer.create_job(mismatched).await,
            Err(JobError::Validation(_))
        ));

        let mut no_file = ad_request(1);
        no_file.payload.file_path = "   ".into();
        assert!(matches!(
            producer.create_job(no_file).await,
            Err(JobError::Validation(_))
        ));

        assert!(fx.ledger.is_empty());
        assert!(fx.queue.pending(JobType::AdAnalysis).is_empty());
    }

    #[tokio::test]
    async fn test_ad_job_requires_file_type() {
        let fx = Fixture::new();
        let producer = fx.producer();

        let mut missing = ad_request(5);
        missing.payload.file_type = None;
        let err = producer.create_job(missing).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(ref msg) if msg.contains("file_type")));

        let mut blank = ad_request(5);
        blank.payload.file_type = Some(" ".into());
        assert!(matches!(
            producer.create_job(blank).await,
            Err(JobError::Validation(_))
        ));

        assert!(fx.ledger.is_empty());
        assert!(fx.queue.pending(JobType::AdAnalysis).is_empty());
    }

    #[tokio::test]
    async fn test_queue_failure_leaves_queued_row() {
        let fx = Fixture::new();
        let mut queue = MockQueue::new();
        queue
            .expect_enqueue()
            .times(1)
            .returning(|_| Err(JobError::QueueUnavailable("connection refused".into())));

        let err = fx
            .producer_with_queue(Arc::new(queue))
            .create_job(ad_request(3))
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::QueueUnavailable(_)));

        assert_eq!(fx.ledger.len(), 1);
        let stale = fx
            .ledger
            .find_stale(
                adpulse_repository::IdleCutoffs::uniform(
                    chrono::Utc::now() + chrono::Duration::seconds(1),
                ),
                10,
            )
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn test_get_job_status() {
        let fx = Fixture::new();
        let producer = fx.producer();
        let job_id = producer.create_job(ad_request(2)).await.unwrap();

        let job = producer.get_job_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.job_type, JobType::AdAnalysis);
        assert!(producer
            .get_job_status(&JobId::from("missing"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_job_raises_signal_and_notifies() {
        let fx = Fixture::new();
        let producer = fx.producer();
        let job_id = producer.create_job(ad_request(5)).await.unwrap();

        let mut client = fx.hub.connect();
        fx.hub.subscribe(client.id(), &job_id);

        assert!(producer.cancel_job(&job_id).await.unwrap());

        let job = fx.ledger.find(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(fx.cancellation.is_cancelled(&job_id).await.unwrap());
        assert_eq!(
            fx.assets.status_of(EntityRef::new(ReferenceType::Ad, 5)),
            Some(AssetStatus::Cancelled)
        );
        assert!(matches!(client.try_recv(), Some(HubEvent::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_cancel_terminal_or_unknown_job_returns_false() {
        let fx = Fixture::new();
        let producer = fx.producer();
        let job_id = producer.create_job(ad_request(5)).await.unwrap();
        fx.ledger.mark_completed(&job_id).await.unwrap();

        assert!(!producer.cancel_job(&job_id).await.unwrap());
        assert!(!fx.cancellation.is_cancelled(&job_id).await.unwrap());
        assert_eq!(
            fx.ledger.find(&job_id).await.unwrap().unwrap().status,
            JobStatus::Completed
        );

        assert!(!producer.cancel_job(&JobId::from("missing")).await.unwrap());
    }
}
