//! Job coordination and worker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the queue, event channel, relay and sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Prefix of the Redis work lists (`{prefix}:{queue}`).
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    /// Namespace of the worker event channels (`{namespace}:{event}:{job_id}`).
    #[serde(default = "default_channel_namespace")]
    pub channel_namespace: String,

    /// Lifetime of a cancellation flag in seconds.
    #[serde(default = "default_cancel_ttl")]
    pub cancel_ttl_secs: u64,

    /// Progress relay configuration.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Staleness sweep configuration.
    #[serde(default)]
    pub sweep: SweepConfig,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_prefix: default_queue_prefix(),
            channel_namespace: default_channel_namespace(),
            cancel_ttl_secs: default_cancel_ttl(),
            relay: RelayConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}

impl JobsConfig {
    /// Returns the cancellation flag lifetime.
    #[must_use]
    pub const fn cancel_ttl(&self) -> Duration {
        Duration::from_secs(self.cancel_ttl_secs)
    }
}

fn default_queue_prefix() -> String {
    "rq:queue".to_string()
}

fn default_channel_namespace() -> String {
    "job".to_string()
}

fn default_cancel_ttl() -> u64 {
    86400
}

/// Progress relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Run the relay inside the server process.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound of the reconnect backoff in seconds.
    #[serde(default = "default_max_reconnect_interval")]
    pub max_reconnect_interval_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_reconnect_interval_secs: default_max_reconnect_interval(),
        }
    }
}

impl RelayConfig {
    /// Returns the reconnect backoff cap.
    #[must_use]
    pub const fn max_reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.max_reconnect_interval_secs)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_reconnect_interval() -> u64 {
    30
}

/// Staleness sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Run the sweep inside the server process.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_secs: u64,

    /// A `processing` job with no activity for longer than this is failed.
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,

    /// A `queued` job no worker picked up within this is failed. Longer than
    /// `max_idle_secs` so a queue backlog is not mistaken for a dead worker.
    #[serde(default = "default_queued_max_idle")]
    pub queued_max_idle_secs: u64,

    /// Maximum number of jobs failed per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_sweep_interval(),
            max_idle_secs: default_max_idle(),
            queued_max_idle_secs: default_queued_max_idle(),
            batch_size: default_batch_size(),
        }
    }
}

impl SweepConfig {
    /// Returns the sweep interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Returns the idle deadline for running jobs.
    #[must_use]
    pub const fn max_idle(&self) -> Duration {
        Duration::from_secs(self.max_idle_secs)
    }

    /// Returns the idle deadline for jobs still waiting in the queue.
    #[must_use]
    pub const fn queued_max_idle(&self) -> Duration {
        Duration::from_secs(self.queued_max_idle_secs)
    }
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_max_idle() -> u64 {
    1800 // 30 minutes
}

fn default_queued_max_idle() -> u64 {
    21600 // 6 hours
}

fn default_batch_size() -> i64 {
    100
}

/// Worker runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker identifier reported with progress events.
    #[serde(default = "default_worker_id")]
    pub worker_id: String,

    /// Maximum concurrently executing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Task execution timeout in seconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_secs: u64,

    /// Blocking dequeue timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: default_worker_id(),
            concurrency: default_concurrency(),
            job_timeout_secs: default_job_timeout(),
            poll_timeout_secs: default_poll_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl WorkerConfig {
    /// Returns the task execution timeout.
    #[must_use]
    pub const fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }

    /// Returns the blocking dequeue timeout.
    #[must_use]
    pub const fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Returns the shutdown timeout.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_worker_id() -> String {
    format!("worker-{}", std::process::id())
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(2)
        .min(8)
}

fn default_job_timeout() -> u64 {
    3600 // video analysis can take a while
}

fn default_poll_timeout() -> u64 {
    5
}

fn default_shutdown_timeout() -> u64 {
    30
}
