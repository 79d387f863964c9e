//! Progress relay: worker pub/sub → ledger → hub.
//!
//! Messages are handled one at a time in delivery order. Each one is
//! validated into a [`WorkerEvent`], applied to the ledger through a guarded
//! write, and forwarded to the hub only if the write changed the row. A
//! malformed message or a failed write is logged and dropped; nothing is
//! retried.

use crate::entity;
use crate::error::{JobError, JobResult};
use crate::metrics;
use crate::redis::RedisKeys;
use adpulse_core::JobId;
use adpulse_domain::{AssetStatus, EnvelopeError, HubEvent, JobStatus, WorkerEvent};
use adpulse_hub::Broadcaster;
use adpulse_repository::{AssetStatusRepository, JobLedger, LedgerOutcome};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// What happened to one incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Ledger updated and event handed to `delivered` hub connections.
    Forwarded { delivered: usize },
    /// The job was already terminal; nothing changed.
    Duplicate,
    /// No ledger row for the job.
    UnknownJob,
    /// Not a worker event (e.g. a cancellation notice).
    Ignored,
    /// Envelope validation failed.
    Malformed,
    /// The ledger write failed.
    LedgerFailed,
}

impl RelayOutcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forwarded { .. } => "forwarded",
            Self::Duplicate => "duplicate",
            Self::UnknownJob => "unknown_job",
            Self::Ignored => "ignored",
            Self::Malformed => "malformed",
            Self::LedgerFailed => "ledger_failed",
        }
    }
}

/// Consumes worker events and keeps the ledger and the hub in step.
pub struct ProgressRelay {
    ledger: Arc<dyn JobLedger>,
    assets: Arc<dyn AssetStatusRepository>,
    broadcaster: Arc<dyn Broadcaster>,
    keys: RedisKeys,
    max_reconnect_interval: Duration,
}

impl ProgressRelay {
    #[must_use]
    pub fn new(
        ledger: Arc<dyn JobLedger>,
        assets: Arc<dyn AssetStatusRepository>,
        broadcaster: Arc<dyn Broadcaster>,
        keys: RedisKeys,
    ) -> Self {
        Self {
            ledger,
            assets,
            broadcaster,
            keys,
            max_reconnect_interval: Duration::from_secs(30),
        }
    }

    /// Caps the delay between reconnect attempts.
    #[must_use]
    pub const fn with_max_reconnect_interval(mut self, interval: Duration) -> Self {
        self.max_reconnect_interval = interval;
        self
    }

    /// Handles one pub/sub message.
    pub async fn handle_message(&self, channel: &str, payload: &str) -> RelayOutcome {
        let event = match WorkerEvent::decode(self.keys.namespace(), channel, payload) {
            Ok(event) => event,
            Err(EnvelopeError::NotAWorkerEvent(kind)) => {
                debug!(channel = %channel, kind = %kind, "Ignoring non-worker message");
                return RelayOutcome::Ignored;
            }
            Err(e) => {
                metrics::relay_malformed();
                let err = JobError::MalformedEvent(e);
                warn!(channel = %channel, error = %err, "Dropping worker event");
                return RelayOutcome::Malformed;
            }
        };

        let kind = event.kind();
        let job_id = event.job_id().clone();
        let outcome = match self.apply(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(job_id = %job_id, event = %kind, error = %e, "Dropping worker event");
                RelayOutcome::LedgerFailed
            }
        };
        metrics::relay_event(kind.as_str(), outcome.as_str());
        outcome
    }

    async fn apply(&self, event: WorkerEvent) -> JobResult<RelayOutcome> {
        match event {
            WorkerEvent::Progress {
                job_id,
                progress,
                step,
                worker_id,
                ..
            } => {
                let outcome = self
                    .ledger
                    .record_progress(&job_id, progress, step.as_deref(), worker_id.as_deref())
                    .await
                    .map_err(ledger_write)?;
                let (job, previous) = match outcome {
                    LedgerOutcome::Applied { job, previous } => (job, previous),
                    other => return Ok(Self::skipped(&job_id, "progress", &other)),
                };

                if previous == JobStatus::Queued {
                    let reference = job.reference();
                    entity::set_status(self.assets.as_ref(), reference, AssetStatus::Processing, None)
                        .await;
                }
                // Stored values, so a late low tick never moves a client backwards.
                let event = HubEvent::progress(job_id, job.progress, job.current_step);
                Ok(self.forward(&event))
            }
            WorkerEvent::Completed { job_id, result, .. } => {
                let outcome = self
                    .ledger
                    .mark_completed(&job_id)
                    .await
                    .map_err(ledger_write)?;
                let job = match outcome {
                    LedgerOutcome::Applied { job, .. } => job,
                    other => return Ok(Self::skipped(&job_id, "completed", &other)),
                };

                entity::set_status(self.assets.as_ref(), job.reference(), AssetStatus::Completed, None)
                    .await;
                info!(job_id = %job_id, "Job completed");
                Ok(self.forward(&HubEvent::completed(job_id, result)))
            }
            WorkerEvent::Failed {
                job_id,
                error,
                stack,
                ..
            } => {
                let outcome = self
                    .ledger
                    .mark_failed(&job_id, &error, stack.as_deref())
                    .await
                    .map_err(ledger_write)?;
                let job = match outcome {
                    LedgerOutcome::Applied { job, .. } => job,
                    other => return Ok(Self::skipped(&job_id, "error", &other)),
                };

                entity::set_status(
                    self.assets.as_ref(),
                    job.reference(),
                    AssetStatus::Failed,
                    Some(&error),
                )
                .await;
                warn!(job_id = %job_id, error = %error, "Job failed");
                Ok(self.forward(&HubEvent::error(job_id, error)))
            }
        }
    }

    fn forward(&self, event: &HubEvent) -> RelayOutcome {
        let delivered = self.broadcaster.broadcast(event);
        debug!(job_id = %event.job_id(), event = event.name(), delivered, "Forwarded to hub");
        RelayOutcome::Forwarded { delivered }
    }

    fn skipped(job_id: &JobId, event: &str, outcome: &LedgerOutcome) -> RelayOutcome {
        match outcome {
            LedgerOutcome::AlreadyTerminal(job) => {
                debug!(job_id = %job_id, event, status = %job.status, "Duplicate event for finished job");
                RelayOutcome::Duplicate
            }
            _ => {
                warn!(job_id = %job_id, event, "Event for unknown job");
                RelayOutcome::UnknownJob
            }
        }
    }

    /// Subscribes to every channel in the namespace and handles messages
    /// until `shutdown` fires, reconnecting with exponential backoff when
    /// the subscription drops.
    pub async fn run(&self, client: redis::Client, mut shutdown: broadcast::Receiver<()>) {
        let mut backoff = self.reconnect_backoff();
        info!(pattern = %self.keys.event_pattern(), "Progress relay started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                result = self.consume(&client, &mut backoff) => match result {
                    Ok(()) => warn!("Relay subscription ended"),
                    Err(e) => warn!(error = %e, "Relay subscription failed"),
                },
            }

            let delay = backoff.next_backoff().unwrap_or(self.max_reconnect_interval);
            metrics::relay_reconnect();
            info!(delay = ?delay, "Reconnecting progress relay");

            tokio::select! {
                _ = shutdown.recv() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        info!("Progress relay stopped");
    }

    async fn consume(&self, client: &redis::Client, backoff: &mut ExponentialBackoff) -> JobResult<()> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.psubscribe(self.keys.event_pattern()).await?;
        backoff.reset();
        debug!(pattern = %self.keys.event_pattern(), "Relay subscribed");

        let mut messages = pubsub.on_message();
        while let Some(msg) = messages.next().await {
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => {
                    self.handle_message(&channel, &payload).await;
                }
                Err(e) => {
                    metrics::relay_malformed();
                    warn!(channel = %channel, error = %e, "Dropping non-text payload");
                }
            }
        }
        Ok(())
    }

    fn reconnect_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(500))
            .with_max_interval(self.max_reconnect_interval)
            .with_max_elapsed_time(None)
            .build()
    }
}

fn ledger_write(err: adpulse_core::AdpulseError) -> JobError {
    JobError::LedgerWrite(err.to_string())
}
