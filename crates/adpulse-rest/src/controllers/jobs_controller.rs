//! Job creation, status, and cancellation endpoints.

use crate::{
    extractors::ValidatedJson,
    responses::{accepted, ok, ApiResponse, ApiResult, AppError},
    state::AppState,
};
use adpulse_core::{AdpulseError, JobId};
use adpulse_domain::{EntityRef, Job, JobStatus, JobType, ReferenceType};
use adpulse_jobs::{JobRequest, TaskPayload};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use validator::Validate;

/// Creates the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_job))
        .route("/:job_id", get(get_job))
        .route("/:job_id/cancel", post(cancel_job))
}

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub job_type: JobType,
    pub reference_type: ReferenceType,
    #[validate(range(min = 1, message = "must be positive"))]
    pub reference_id: i64,
    #[validate(length(min = 1, max = 1024, message = "must be 1-1024 characters"))]
    pub file_path: String,
    #[validate(length(max = 32))]
    pub file_type: Option<String>,
    /// Parent ad of a reaction video.
    pub ad_id: Option<i64>,
}

impl From<CreateJobRequest> for JobRequest {
    fn from(request: CreateJobRequest) -> Self {
        Self {
            job_type: request.job_type,
            reference: EntityRef::new(request.reference_type, request.reference_id),
            payload: TaskPayload {
                file_path: request.file_path,
                file_type: request.file_type,
                ad_id: request.ad_id,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
}

/// Job record as seen by API clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: JobId,
    pub job_type: JobType,
    pub reference_type: ReferenceType,
    pub reference_id: i64,
    pub status: JobStatus,
    pub progress: i16,
    pub current_step: Option<String>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.job_id,
            job_type: job.job_type,
            reference_type: job.reference_type,
            reference_id: job.reference_id,
            status: job.status,
            progress: job.progress,
            current_step: job.current_step,
            error_message: job.error_message,
            worker_id: job.worker_id,
            started_at: job.started_at,
            completed_at: job.completed_at,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CancelJobResponse {
    pub cancelled: bool,
}

/// Records and enqueues a job; answers before any worker picks it up.
async fn create_job(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<CreateJobRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreateJobResponse>>), AppError> {
    debug!(job_type = %request.job_type, reference_id = request.reference_id, "Create job request");

    let job_id = state.producer.create_job(request.into()).await?;
    Ok(accepted(CreateJobResponse { job_id }))
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<JobResponse> {
    let job_id = JobId::from(job_id);
    let job = state
        .producer
        .get_job_status(&job_id)
        .await?
        .ok_or_else(|| AdpulseError::not_found("job", &job_id))?;
    ok(job.into())
}

/// `cancelled` is `false` when the job was unknown or already finished.
async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<CancelJobResponse> {
    let cancelled = state.producer.cancel_job(&JobId::from(job_id)).await?;
    ok(CancelJobResponse { cancelled })
}
