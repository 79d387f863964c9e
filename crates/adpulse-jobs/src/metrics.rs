//! Prometheus metrics for job coordination.
//!
//! Names and descriptions live here; the server installs the exporter.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the job system.
pub mod names {
    /// Total jobs created by the producer.
    pub const JOBS_CREATED_TOTAL: &str = "adpulse_jobs_created_total";
    /// Total descriptors the queue refused.
    pub const JOBS_ENQUEUE_FAILED_TOTAL: &str = "adpulse_jobs_enqueue_failed_total";
    /// Total jobs cancelled through the producer.
    pub const JOBS_CANCELLED_TOTAL: &str = "adpulse_jobs_cancelled_total";
    /// Total jobs failed by the staleness sweep.
    pub const JOBS_SWEPT_TOTAL: &str = "adpulse_jobs_swept_total";

    /// Worker events handled by the relay, by event and outcome.
    pub const RELAY_EVENTS_TOTAL: &str = "adpulse_relay_events_total";
    /// Worker events rejected by envelope validation.
    pub const RELAY_MALFORMED_TOTAL: &str = "adpulse_relay_malformed_total";
    /// Relay reconnects after a lost subscription.
    pub const RELAY_RECONNECTS_TOTAL: &str = "adpulse_relay_reconnects_total";

    /// Tasks finished by the worker runtime, by job type and outcome.
    pub const WORKER_TASKS_TOTAL: &str = "adpulse_worker_tasks_total";
    /// Task execution duration in seconds.
    pub const WORKER_TASK_DURATION_SECONDS: &str = "adpulse_worker_task_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_CREATED_TOTAL, "Total number of jobs created");
    describe_counter!(
        names::JOBS_ENQUEUE_FAILED_TOTAL,
        "Total number of task descriptors the queue refused"
    );
    describe_counter!(
        names::JOBS_CANCELLED_TOTAL,
        "Total number of jobs cancelled by request"
    );
    describe_counter!(
        names::JOBS_SWEPT_TOTAL,
        "Total number of idle jobs failed by the staleness sweep"
    );
    describe_counter!(
        names::RELAY_EVENTS_TOTAL,
        "Total number of worker events handled by the relay"
    );
    describe_counter!(
        names::RELAY_MALFORMED_TOTAL,
        "Total number of worker events rejected as malformed"
    );
    describe_counter!(
        names::RELAY_RECONNECTS_TOTAL,
        "Total number of relay pub/sub reconnects"
    );
    describe_counter!(
        names::WORKER_TASKS_TOTAL,
        "Total number of tasks finished by the worker runtime"
    );
    describe_histogram!(
        names::WORKER_TASK_DURATION_SECONDS,
        "Task execution duration in seconds"
    );

    adpulse_hub::metrics::register_metrics();
}

pub(crate) fn job_created(job_type: &'static str) {
    counter!(names::JOBS_CREATED_TOTAL, "job_type" => job_type).increment(1);
}

pub(crate) fn enqueue_failed(job_type: &'static str) {
    counter!(names::JOBS_ENQUEUE_FAILED_TOTAL, "job_type" => job_type).increment(1);
}

pub(crate) fn job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

pub(crate) fn jobs_swept(count: usize) {
    counter!(names::JOBS_SWEPT_TOTAL).increment(count as u64);
}

pub(crate) fn relay_event(event: &'static str, outcome: &'static str) {
    counter!(names::RELAY_EVENTS_TOTAL, "event" => event, "outcome" => outcome).increment(1);
}

pub(crate) fn relay_malformed() {
    counter!(names::RELAY_MALFORMED_TOTAL).increment(1);
}

pub(crate) fn relay_reconnect() {
    counter!(names::RELAY_RECONNECTS_TOTAL).increment(1);
}

pub(crate) fn worker_task(job_type: &'static str, outcome: &'static str, duration: Duration) {
    counter!(names::WORKER_TASKS_TOTAL, "job_type" => job_type, "outcome" => outcome).increment(1);
    histogram!(names::WORKER_TASK_DURATION_SECONDS, "job_type" => job_type)
        .record(duration.as_secs_f64());
}
