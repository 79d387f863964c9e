//! The message placed on a task queue.

use crate::error::JobResult;
use adpulse_core::JobId;
use adpulse_domain::{EntityRef, JobType, ReferenceType};
use serde::{Deserialize, Serialize};

/// Input a worker needs besides the job identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    /// Parent ad of a reaction video.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<i64>,
}

/// Queue message read by workers.
///
/// Wire shape: `{job_id, type, ad_id?, reaction_id?, file_path, file_type?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub job_type: JobType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_id: Option<i64>,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl TaskDescriptor {
    /// Builds the descriptor for a job on `reference`.
    #[must_use]
    pub fn new(job_id: JobId, job_type: JobType, reference: EntityRef, payload: TaskPayload) -> Self {
        let (ad_id, reaction_id) = match reference.reference_type {
            ReferenceType::Ad => (Some(reference.reference_id), None),
            ReferenceType::ReactionVideo => (payload.ad_id, Some(reference.reference_id)),
        };
        Self {
            job_id,
            job_type,
            ad_id,
            reaction_id,
            file_path: payload.file_path,
            file_type: payload.file_type,
        }
    }

    /// Entity the task analyzes, derived from the job type.
    #[must_use]
    pub fn reference(&self) -> Option<EntityRef> {
        match self.job_type {
            JobType::AdAnalysis => self.ad_id.map(|id| EntityRef::new(ReferenceType::Ad, id)),
            JobType::EmotionAnalysis => self
                .reaction_id
                .map(|id| EntityRef::new(ReferenceType::ReactionVideo, id)),
        }
    }

    pub fn to_json(&self) -> JobResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> JobResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ad_descriptor_wire_shape() {
        let descriptor = TaskDescriptor::new(
            JobId::from("J1"),
            JobType::AdAnalysis,
            EntityRef::new(ReferenceType::Ad, 7),
            TaskPayload {
                file_path: "/uploads/ads/7.mp4".into(),
                file_type: Some("video".into()),
                ad_id: None,
            },
        );

        let value: serde_json::Value = serde_json::from_str(&descriptor.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "job_id": "J1",
                "type": "ad_analysis",
                "ad_id": 7,
                "file_path": "/uploads/ads/7.mp4",
                "file_type": "video"
            })
        );
    }

    #[test]
    fn test_emotion_descriptor_keeps_parent_ad() {
        let descriptor = TaskDescriptor::new(
            JobId::from("J2"),
            JobType::EmotionAnalysis,
            EntityRef::new(ReferenceType::ReactionVideo, 3),
            TaskPayload {
                file_path: "/uploads/reactions/3.webm".into(),
                file_type: None,
                ad_id: Some(7),
            },
        );
        assert_eq!(descriptor.ad_id, Some(7));
        assert_eq!(descriptor.reaction_id, Some(3));
        assert_eq!(
            descriptor.reference(),
            Some(EntityRef::new(ReferenceType::ReactionVideo, 3))
        );
        assert!(!descriptor.to_json().unwrap().contains("file_type"));
    }

    #[test]
    fn test_from_python_shaped_json() {
        let descriptor = TaskDescriptor::from_json(
            r#"{"job_id":"J3","type":"emotion_analysis","reaction_id":4,"file_path":"/x.webm"}"#,
        )
        .unwrap();
        assert_eq!(descriptor.job_type, JobType::EmotionAnalysis);
        assert!(descriptor.ad_id.is_none());
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(TaskDescriptor::from_json(r#"{"job_id":"J","type":"ocr","file_path":"/x"}"#).is_err());
    }
}
