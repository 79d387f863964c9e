//! Messages exchanged between the hub and its clients.

use adpulse_core::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event pushed to every connection subscribed to a job.
///
/// Serialized as `{"type": "job:progress", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum HubEvent {
    #[serde(rename = "job:progress")]
    Progress(ProgressPayload),
    #[serde(rename = "job:completed")]
    Completed(CompletedPayload),
    #[serde(rename = "job:error")]
    Error(ErrorPayload),
    #[serde(rename = "job:cancelled")]
    Cancelled(CancelledPayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub job_id: JobId,
    pub progress: i16,
    pub step: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPayload {
    pub job_id: JobId,
    pub result: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub job_id: JobId,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledPayload {
    pub job_id: JobId,
    pub timestamp: DateTime<Utc>,
}

impl HubEvent {
    #[must_use]
    pub fn progress(job_id: JobId, progress: i16, step: Option<String>) -> Self {
        Self::Progress(ProgressPayload {
            job_id,
            progress,
            step,
            timestamp: Utc::now(),
        })
    }

    #[must_use]
    pub fn completed(job_id: JobId, result: serde_json::Value) -> Self {
        Self::Completed(CompletedPayload {
            job_id,
            result,
            timestamp: Utc::now(),
        })
    }

    #[must_use]
    pub fn error(job_id: JobId, error: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            job_id,
            error: error.into(),
            timestamp: Utc::now(),
        })
    }

    #[must_use]
    pub fn cancelled(job_id: JobId) -> Self {
        Self::Cancelled(CancelledPayload {
            job_id,
            timestamp: Utc::now(),
        })
    }

    /// Returns the topic this event is broadcast on.
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        match self {
            Self::Progress(p) => &p.job_id,
            Self::Completed(p) => &p.job_id,
            Self::Error(p) => &p.job_id,
            Self::Cancelled(p) => &p.job_id,
        }
    }

    /// Returns the wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "job:progress",
            Self::Completed(_) => "job:completed",
            Self::Error(_) => "job:error",
            Self::Cancelled(_) => "job:cancelled",
        }
    }

    /// Returns `true` for events that end a job's stream.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress(_))
    }
}

/// Control message sent by a client over its hub connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "subscribe:job", rename_all = "camelCase")]
    Subscribe { job_id: JobId },
    #[serde(rename = "unsubscribe:job", rename_all = "camelCase")]
    Unsubscribe { job_id: JobId },
}
