//! The job record.

use crate::{DomainError, JobStatus};
use adpulse_core::JobId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of analysis a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Object and scene analysis of an uploaded ad.
    AdAnalysis,
    /// Facial emotion analysis of a viewer's reaction video.
    EmotionAnalysis,
}

impl JobType {
    /// Returns the persisted representation, also used as the queue name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AdAnalysis => "ad_analysis",
            Self::EmotionAnalysis => "emotion_analysis",
        }
    }

    /// Returns the entity type this job analyzes.
    #[must_use]
    pub const fn reference_type(self) -> ReferenceType {
        match self {
            Self::AdAnalysis => ReferenceType::Ad,
            Self::EmotionAnalysis => ReferenceType::ReactionVideo,
        }
    }

    /// Rejects a reference the job type cannot analyze.
    pub fn check_reference(self, reference_type: ReferenceType) -> Result<(), DomainError> {
        let expected = self.reference_type();
        if expected == reference_type {
            Ok(())
        } else {
            Err(DomainError::ReferenceMismatch {
                job_type: self.as_str(),
                expected: expected.as_str(),
                actual: reference_type.as_str(),
            })
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ad_analysis" => Ok(Self::AdAnalysis),
            "emotion_analysis" => Ok(Self::EmotionAnalysis),
            other => Err(DomainError::unknown("job type", other)),
        }
    }
}

/// Type of the entity a job is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Ad,
    ReactionVideo,
}

impl ReferenceType {
    /// Returns the persisted representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ad => "ad",
            Self::ReactionVideo => "reaction_video",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ad" => Ok(Self::Ad),
            "reaction_video" => Ok(Self::ReactionVideo),
            other => Err(DomainError::unknown("reference type", other)),
        }
    }
}

/// Polymorphic link from a job to the entity under analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub reference_type: ReferenceType,
    pub reference_id: i64,
}

impl EntityRef {
    #[must_use]
    pub const fn new(reference_type: ReferenceType, reference_id: i64) -> Self {
        Self {
            reference_type,
            reference_id,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.reference_type, self.reference_id)
    }
}

/// Fields of a job at creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub job_id: JobId,
    pub job_type: JobType,
    pub reference: EntityRef,
}

/// Clamps a reported progress value into `0..=100`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn clamp_progress(value: i64) -> i16 {
    value.clamp(0, 100) as i16
}

/// Result of applying a mutation to a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The record changed.
    Applied,
    /// The record was terminal and stayed untouched.
    AlreadyTerminal,
}

/// A job as stored in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: JobId,
    pub job_type: JobType,
    pub reference_type: ReferenceType,
    pub reference_id: i64,
    pub status: JobStatus,
    pub progress: i16,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub error_stack: Option<String>,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Builds the initial `queued` record.
    #[must_use]
    pub fn queued(new: NewJob, now: DateTime<Utc>) -> Self {
        Self {
            job_id: new.job_id,
            job_type: new.job_type,
            reference_type: new.reference.reference_type,
            reference_id: new.reference.reference_id,
            status: JobStatus::Queued,
            progress: 0,
            current_step: None,
            error_message: None,
            error_stack: None,
            worker_id: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the referenced entity.
    #[must_use]
    pub const fn reference(&self) -> EntityRef {
        EntityRef::new(self.reference_type, self.reference_id)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Applies a progress tick.
    ///
    /// Stored progress never decreases; a tick behind the stored value keeps
    /// the stored step as well.
    pub fn record_progress(
        &mut self,
        progress: i16,
        step: Option<&str>,
        worker_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.is_terminal() {
            return Transition::AlreadyTerminal;
        }

        let progress = clamp_progress(i64::from(progress));
        if progress >= self.progress {
            self.progress = progress;
            if let Some(step) = step {
                self.current_step = Some(step.to_string());
            }
        }
        if let Some(worker_id) = worker_id {
            self.worker_id = Some(worker_id.to_string());
        }
        self.status = JobStatus::Processing;
        self.started_at.get_or_insert(now);
        self.updated_at = now;
        Transition::Applied
    }

    /// Marks the job completed.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Transition {
        self.finish(JobStatus::Completed, now, |job| job.progress = 100)
    }

    /// Marks the job failed with the worker's error.
    pub fn fail(&mut self, message: &str, stack: Option<&str>, now: DateTime<Utc>) -> Transition {
        self.finish(JobStatus::Failed, now, |job| {
            job.error_message = Some(message.to_string());
            job.error_stack = stack.map(str::to_string);
        })
    }

    /// Marks the job cancelled.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Transition {
        self.finish(JobStatus::Cancelled, now, |_| {})
    }

    fn finish(
        &mut self,
        status: JobStatus,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut Self),
    ) -> Transition {
        if !self.status.can_transition_to(status) {
            return Transition::AlreadyTerminal;
        }
        apply(self);
        self.status = status;
        self.completed_at.get_or_insert(now);
        self.updated_at = now;
        Transition::Applied
    }
}
