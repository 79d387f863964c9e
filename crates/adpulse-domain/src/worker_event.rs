//! Events published by workers on the `{namespace}:{event}:{job_id}` channels.
//!
//! Everything arriving from a worker is untrusted. [`WorkerEvent::decode`]
//! either produces one of the three well-formed variants or rejects the
//! message; no partial interpretation happens past this boundary.

use crate::{clamp_progress, EntityRef, ReferenceType};
use adpulse_core::JobId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Kind of channel a message arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Progress,
    Completed,
    Error,
    /// Cancellation signals share the namespace but are not worker events.
    Cancel,
}

impl ChannelKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancel => "cancel",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "progress" => Some(Self::Progress),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            "cancel" => Some(Self::Cancel),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed channel name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventChannel {
    pub kind: ChannelKind,
    pub job_id: JobId,
}

impl EventChannel {
    /// Parses `{namespace}:{kind}:{job_id}`.
    pub fn parse(namespace: &str, channel: &str) -> Result<Self, EnvelopeError> {
        let invalid = || EnvelopeError::InvalidChannel(channel.to_string());

        let mut parts = channel.splitn(3, ':');
        let (Some(ns), Some(kind), Some(job_id)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if ns != namespace || job_id.trim().is_empty() {
            return Err(invalid());
        }

        let kind =
            ChannelKind::parse(kind).ok_or_else(|| EnvelopeError::UnknownEventType(kind.to_string()))?;

        Ok(Self {
            kind,
            job_id: JobId::from(job_id),
        })
    }

    /// Formats the channel name for a job.
    #[must_use]
    pub fn format(namespace: &str, kind: ChannelKind, job_id: &JobId) -> String {
        format!("{}:{}:{}", namespace, kind, job_id)
    }
}

/// Why an incoming message was rejected.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("channel {0} does not carry worker events")]
    NotAWorkerEvent(ChannelKind),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error("{event} event field `{field}` must be an integer")]
    NotAnInteger {
        event: ChannelKind,
        field: &'static str,
    },

    #[error("{event} event is missing required field `{field}`")]
    MissingField {
        event: ChannelKind,
        field: &'static str,
    },

    #[error("payload {field} `{payload}` disagrees with channel `{channel}`")]
    Mismatch {
        field: &'static str,
        channel: String,
        payload: String,
    },
}

/// Loose shape of a worker payload, before validation.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    event_type: Option<String>,
    #[serde(default)]
    job_id: Option<String>,
    #[serde(default)]
    progress: Option<serde_json::Number>,
    #[serde(default)]
    step: Option<String>,
    #[serde(default, rename = "workerId", alias = "worker_id")]
    worker_id: Option<String>,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    stack: Option<String>,
    #[serde(default, rename = "referenceType")]
    reference_type: Option<ReferenceType>,
    #[serde(default, rename = "referenceId")]
    reference_id: Option<i64>,
}

/// A validated worker event.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Progress {
        job_id: JobId,
        progress: i16,
        step: Option<String>,
        worker_id: Option<String>,
        reference: Option<EntityRef>,
    },
    Completed {
        job_id: JobId,
        result: serde_json::Value,
        reference: Option<EntityRef>,
    },
    Failed {
        job_id: JobId,
        error: String,
        stack: Option<String>,
        reference: Option<EntityRef>,
    },
}

impl WorkerEvent {
    /// Validates a message received on `channel`.
    pub fn decode(namespace: &str, channel: &str, payload: &str) -> Result<Self, EnvelopeError> {
        let channel = EventChannel::parse(namespace, channel)?;
        if channel.kind == ChannelKind::Cancel {
            return Err(EnvelopeError::NotAWorkerEvent(channel.kind));
        }

        let value: serde_json::Value = serde_json::from_str(payload)?;
        if !value.is_object() {
            return Err(EnvelopeError::NotAnObject);
        }
        let raw: RawEnvelope = serde_json::from_value(value)?;

        if let Some(event_type) = raw.event_type.as_deref() {
            if event_type != channel.kind.as_str() {
                return Err(EnvelopeError::Mismatch {
                    field: "event_type",
                    channel: channel.kind.to_string(),
                    payload: event_type.to_string(),
                });
            }
        }
        if let Some(job_id) = raw.job_id.as_deref() {
            if job_id != channel.job_id.as_str() {
                return Err(EnvelopeError::Mismatch {
                    field: "job_id",
                    channel: channel.job_id.to_string(),
                    payload: job_id.to_string(),
                });
            }
        }

        let reference = match (raw.reference_type, raw.reference_id) {
            (Some(reference_type), Some(reference_id)) => {
                Some(EntityRef::new(reference_type, reference_id))
            }
            _ => None,
        };
        let job_id = channel.job_id;

        match channel.kind {
            ChannelKind::Progress => {
                let number = raw.progress.ok_or(EnvelopeError::MissingField {
                    event: ChannelKind::Progress,
                    field: "progress",
                })?;
                let progress = integer_progress(&number).ok_or(EnvelopeError::NotAnInteger {
                    event: ChannelKind::Progress,
                    field: "progress",
                })?;
                Ok(Self::Progress {
                    job_id,
                    progress: clamp_progress(progress),
                    step: raw.step,
                    worker_id: raw.worker_id.map(truncate_worker_id),
                    reference,
                })
            }
            ChannelKind::Completed => Ok(Self::Completed {
                job_id,
                result: raw
                    .result
                    .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new())),
                reference,
            }),
            ChannelKind::Error => {
                let error = raw.error.ok_or(EnvelopeError::MissingField {
                    event: ChannelKind::Error,
                    field: "error",
                })?;
                Ok(Self::Failed {
                    job_id,
                    error,
                    stack: raw.stack,
                    reference,
                })
            }
            ChannelKind::Cancel => Err(EnvelopeError::NotAWorkerEvent(ChannelKind::Cancel)),
        }
    }

    /// Returns the job the event belongs to.
    #[must_use]
    pub const fn job_id(&self) -> &JobId {
        match self {
            Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. } => job_id,
        }
    }

    /// Returns the channel kind the event travels on.
    #[must_use]
    pub const fn kind(&self) -> ChannelKind {
        match self {
            Self::Progress { .. } => ChannelKind::Progress,
            Self::Completed { .. } => ChannelKind::Completed,
            Self::Failed { .. } => ChannelKind::Error,
        }
    }

    /// Serializes the event into the wire payload workers publish.
    #[must_use]
    pub fn to_payload(&self) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "event_type": self.kind().as_str(),
            "job_id": self.job_id().as_str(),
        });
        let reference = match self {
            Self::Progress {
                progress,
                step,
                worker_id,
                reference,
                ..
            } => {
                payload["progress"] = serde_json::json!(progress);
                payload["step"] = serde_json::json!(step);
                if let Some(worker_id) = worker_id {
                    payload["workerId"] = serde_json::json!(worker_id);
                }
                reference
            }
            Self::Completed { result, reference, .. } => {
                payload["result"] = result.clone();
                reference
            }
            Self::Failed {
                error,
                stack,
                reference,
                ..
            } => {
                payload["error"] = serde_json::json!(error);
                payload["stack"] = serde_json::json!(stack);
                reference
            }
        };
        if let Some(reference) = reference {
            payload["referenceType"] = serde_json::json!(reference.reference_type);
            payload["referenceId"] = serde_json::json!(reference.reference_id);
        }
        payload
    }
}

/// Longest worker id the ledger stores, in characters.
pub const MAX_WORKER_ID_LEN: usize = 128;

/// Integers only; values past `i64::MAX` saturate and are clamped later.
fn integer_progress(number: &serde_json::Number) -> Option<i64> {
    number
        .as_i64()
        .or_else(|| number.as_u64().map(|_| i64::MAX))
}

fn truncate_worker_id(worker_id: String) -> String {
    match worker_id.char_indices().nth(MAX_WORKER_ID_LEN) {
        Some((end, _)) => {
            let mut worker_id = worker_id;
            worker_id.truncate(end);
            worker_id
        }
        None => worker_id,
    }
}
