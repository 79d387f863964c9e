//! Fails jobs that stopped hearing from their worker.
//!
//! A `processing` job with no ledger activity for longer than `max_idle`, or
//! a `queued` job nobody picked up within `queued_max_idle`, is marked
//! failed. The write goes through the same terminal guard as the relay, so a
//! job that finishes concurrently keeps its real outcome.

use crate::entity;
use crate::error::{JobError, JobResult};
use crate::metrics;
use adpulse_config::SweepConfig;
use adpulse_domain::{AssetStatus, HubEvent, JobStatus};
use adpulse_hub::Broadcaster;
use adpulse_repository::{AssetStatusRepository, IdleCutoffs, JobLedger, LedgerOutcome};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub struct StaleJobSweeper {
    ledger: Arc<dyn JobLedger>,
    assets: Arc<dyn AssetStatusRepository>,
    broadcaster: Arc<dyn Broadcaster>,
    interval: Duration,
    max_idle: Duration,
    queued_max_idle: Duration,
    batch_size: i64,
}

impl StaleJobSweeper {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        assets: Arc<dyn AssetStatusRepository>,
        broadcaster: Arc<dyn Broadcaster>,
        config: &SweepConfig,
    ) -> Self {
        Self {
            ledger,
            assets,
            broadcaster,
            interval: config.interval(),
            max_idle: config.max_idle(),
            queued_max_idle: config.queued_max_idle(),
            batch_size: config.batch_size,
        }
    }

    /// Runs one sweep against the current time.
    pub async fn sweep_once(&self) -> JobResult<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Fails every job idle past its status's deadline, up to one batch.
    ///
    /// Returns the number of jobs this call moved to `failed`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> JobResult<usize> {
        let cutoffs = IdleCutoffs {
            queued_before: now - to_chrono(self.queued_max_idle)?,
            processing_before: now - to_chrono(self.max_idle)?,
        };
        let stale = self.ledger.find_stale(cutoffs, self.batch_size).await?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut failed = 0;
        for job in stale {
            let message = if job.status == JobStatus::Queued {
                format!("not picked up by a worker within {}s", self.queued_max_idle.as_secs())
            } else {
                format!("no worker activity for {}s", self.max_idle.as_secs())
            };
            match self.ledger.mark_failed(&job.job_id, &message, None).await {
                Ok(LedgerOutcome::Applied { job, previous }) => {
                    entity::set_status(
                        self.assets.as_ref(),
                        job.reference(),
                        AssetStatus::Failed,
                        Some(&message),
                    )
                    .await;
                    self.broadcaster
                        .broadcast(&HubEvent::error(job.job_id.clone(), message.clone()));
                    warn!(job_id = %job.job_id, previous = %previous, "Failed idle job");
                    failed += 1;
                }
                Ok(_) => debug!(job_id = %job.job_id, "Idle job finished before the sweep"),
                Err(e) => warn!(job_id = %job.job_id, error = %e, "Failed to sweep idle job"),
            }
        }

        metrics::jobs_swept(failed);
        Ok(failed)
    }

    /// Sweeps on a fixed interval until `shutdown` fires.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            max_idle_secs = self.max_idle.as_secs(),
            queued_max_idle_secs = self.queued_max_idle.as_secs(),
            "Staleness sweep started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "Staleness sweep failed");
                    }
                }
            }
        }

        info!("Staleness sweep stopped");
    }
}

fn to_chrono(duration: Duration) -> JobResult<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| JobError::Configuration(format!("Invalid idle deadline: {}", e)))
}
