//! Worker runtime for Rust task handlers.
//!
//! Pops descriptors from the queues of the registered handlers and reports
//! back over the same event channels the relay consumes, so a Rust worker is
//! indistinguishable from any other worker process.

use crate::cancellation::CancellationSignal;
use crate::descriptor::TaskDescriptor;
use crate::error::{JobError, JobResult};
use crate::metrics;
use crate::publisher::EventPublisher;
use crate::queue::TaskQueue;
use adpulse_config::WorkerConfig;
use adpulse_core::JobId;
use adpulse_domain::{EntityRef, JobType, WorkerEvent};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn, Instrument};

/// Why a handler gave up on a task.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TaskFailure {
    pub message: String,
    pub stack: Option<String>,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

impl From<JobError> for TaskFailure {
    fn from(err: JobError) -> Self {
        Self::new(err.to_string())
    }
}

/// Executes tasks of one job type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Runs the task. The returned value becomes the `result` of the
    /// completion event.
    async fn handle(
        &self,
        task: &TaskDescriptor,
        reporter: &ProgressReporter,
    ) -> Result<serde_json::Value, TaskFailure>;
}

/// Handed to a running task to report progress.
///
/// Every report is also a cancellation checkpoint.
pub struct ProgressReporter {
    job_id: JobId,
    reference: Option<EntityRef>,
    worker_id: String,
    publisher: Arc<dyn EventPublisher>,
    cancellation: Arc<dyn CancellationSignal>,
}

impl ProgressReporter {
    #[must_use]
    pub fn new(
        task: &TaskDescriptor,
        worker_id: impl Into<String>,
        publisher: Arc<dyn EventPublisher>,
        cancellation: Arc<dyn CancellationSignal>,
    ) -> Self {
        Self {
            job_id: task.job_id.clone(),
            reference: task.reference(),
            worker_id: worker_id.into(),
            publisher,
            cancellation,
        }
    }

    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Publishes a progress event.
    ///
    /// Returns [`JobError::Cancelled`] without publishing once the job has
    /// been cancelled; the handler is expected to stop.
    pub async fn report(&self, progress: i16, step: Option<&str>) -> JobResult<()> {
        if self.is_cancelled().await {
            return Err(JobError::Cancelled);
        }

        self.publisher
            .publish(&WorkerEvent::Progress {
                job_id: self.job_id.clone(),
                progress,
                step: step.map(str::to_string),
                worker_id: Some(self.worker_id.clone()),
                reference: self.reference,
            })
            .await
    }

    /// Checks the cancellation signal. A signal that cannot be read counts
    /// as not cancelled.
    pub async fn is_cancelled(&self) -> bool {
        match self.cancellation.is_cancelled(&self.job_id).await {
            Ok(cancelled) => cancelled,
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Failed to read cancellation signal");
                false
            }
        }
    }
}

/// Task counters of a runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

/// Bounded-concurrency task runner.
pub struct WorkerRuntime {
    queue: Arc<dyn TaskQueue>,
    publisher: Arc<dyn EventPublisher>,
    cancellation: Arc<dyn CancellationSignal>,
    config: WorkerConfig,
    handlers: RwLock<HashMap<JobType, Arc<dyn TaskHandler>>>,
    shutdown_tx: watch::Sender<bool>,
    running: AtomicBool,
    counters: Arc<Counters>,
}

impl WorkerRuntime {
    #[must_use]
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        publisher: Arc<dyn EventPublisher>,
        cancellation: Arc<dyn CancellationSignal>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queue,
            publisher,
            cancellation,
            config,
            handlers: RwLock::new(HashMap::new()),
            shutdown_tx,
            running: AtomicBool::new(false),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Registers a handler, replacing any previous one for its job type.
    pub fn register(&self, handler: Arc<dyn TaskHandler>) {
        let job_type = handler.job_type();
        self.handlers.write().insert(job_type, handler);
        info!(job_type = %job_type, "Registered task handler");
    }

    /// Runs until [`WorkerRuntime::stop`] is called, then waits up to
    /// `shutdown_timeout` for running tasks.
    ///
    /// A stop requested before the call returns as soon as the loop starts.
    ///
    /// Handlers registered after the call starts are not picked up.
    pub async fn run(&self) -> JobResult<()> {
        let handlers = self.handlers.read().clone();
        if handlers.is_empty() {
            return Err(JobError::Configuration(
                "No task handlers registered".to_string(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Internal("Worker runtime already running".to_string()));
        }

        let mut job_types: Vec<JobType> = handlers.keys().copied().collect();
        job_types.sort_by_key(|job_type| job_type.as_str());
        let concurrency = self.config.concurrency.max(1);
        let poll_timeout = self.config.poll_timeout();

        info!(
            worker_id = %self.config.worker_id,
            concurrency,
            job_types = ?job_types,
            "Starting worker runtime"
        );

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            let permit = tokio::select! {
                biased;
                () = stop_requested(&mut shutdown_rx) => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            // Not raced against shutdown: a popped descriptor must not be lost.
            let task = match self.queue.dequeue(&job_types, poll_timeout).await {
                Ok(Some(task)) => task,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, "Failed to dequeue task");
                    drop(permit);
                    tokio::select! {
                        () = stop_requested(&mut shutdown_rx) => break,
                        () = tokio::time::sleep(Duration::from_secs(1)) => continue,
                    }
                }
            };

            let Some(handler) = handlers.get(&task.job_type).cloned() else {
                continue;
            };
            let execution = Execution {
                worker_id: self.config.worker_id.clone(),
                job_timeout: self.config.job_timeout(),
                publisher: self.publisher.clone(),
                cancellation: self.cancellation.clone(),
                counters: self.counters.clone(),
            };
            let span = tracing::info_span!(
                "worker",
                job_id = %task.job_id,
                job_type = task.job_type.as_str()
            );

            tokio::spawn(
                async move {
                    execution.run(handler, task).await;
                    drop(permit);
                }
                .instrument(span),
            );
        }

        info!(worker_id = %self.config.worker_id, "Waiting for running tasks...");
        let all = u32::try_from(concurrency).unwrap_or(u32::MAX);
        if timeout(self.config.shutdown_timeout(), semaphore.acquire_many(all))
            .await
            .is_err()
        {
            warn!(
                worker_id = %self.config.worker_id,
                "Shutdown timeout elapsed with tasks still running"
            );
        }

        // Consumed, so the runtime can be started again.
        self.shutdown_tx.send_replace(false);
        self.running.store(false, Ordering::SeqCst);
        let stats = self.stats();
        info!(
            worker_id = %self.config.worker_id,
            completed = stats.completed,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "Worker runtime stopped"
        );
        Ok(())
    }

    /// Requests shutdown. The request holds until a run observes it.
    pub fn stop(&self) {
        info!(worker_id = %self.config.worker_id, "Stopping worker runtime...");
        self.shutdown_tx.send_replace(true);
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            cancelled: self.counters.cancelled.load(Ordering::Relaxed),
        }
    }
}

async fn stop_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    if shutdown_rx.wait_for(|stopped| *stopped).await.is_err() {
        debug!("Shutdown sender dropped");
    }
}

/// Everything a spawned task needs, detached from the runtime borrow.
struct Execution {
    worker_id: String,
    job_timeout: Duration,
    publisher: Arc<dyn EventPublisher>,
    cancellation: Arc<dyn CancellationSignal>,
    counters: Arc<Counters>,
}

impl Execution {
    async fn run(self, handler: Arc<dyn TaskHandler>, task: TaskDescriptor) {
        let started = Instant::now();
        let reporter = ProgressReporter::new(
            &task,
            self.worker_id.clone(),
            self.publisher.clone(),
            self.cancellation.clone(),
        );
        debug!(worker_id = %self.worker_id, "Processing task");

        let outcome = timeout(self.job_timeout, handler.handle(&task, &reporter)).await;
        let job_id = task.job_id.clone();
        let reference = task.reference();

        let (event, label) = if reporter.is_cancelled().await {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            info!("Task stopped after cancellation");
            (None, "cancelled")
        } else {
            match outcome {
                Ok(Ok(result)) => {
                    self.counters.completed.fetch_add(1, Ordering::Relaxed);
                    debug!("Task completed");
                    (
                        Some(WorkerEvent::Completed {
                            job_id,
                            result,
                            reference,
                        }),
                        "completed",
                    )
                }
                Ok(Err(failure)) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %failure, "Task failed");
                    (
                        Some(WorkerEvent::Failed {
                            job_id,
                            error: failure.message,
                            stack: failure.stack,
                            reference,
                        }),
                        "failed",
                    )
                }
                Err(_) => {
                    self.counters.failed.fetch_add(1, Ordering::Relaxed);
                    let secs = self.job_timeout.as_secs();
                    warn!(timeout_secs = secs, "Task timed out");
                    (
                        Some(WorkerEvent::Failed {
                            job_id,
                            error: JobError::Timeout(secs).to_string(),
                            stack: None,
                            reference,
                        }),
                        "timeout",
                    )
                }
            }
        };

        if let Some(event) = event {
            if let Err(e) = self.publisher.publish(&event).await {
                error!(error = %e, event = event.kind().as_str(), "Failed to publish task outcome");
            }
        }
        metrics::worker_task(task.job_type.as_str(), label, started.elapsed());
    }
}
