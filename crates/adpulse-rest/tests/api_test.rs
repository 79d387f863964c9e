//! Router tests against in-memory ledger, queue, and hub.

use adpulse_config::{ObservabilityConfig, ServerConfig};
use adpulse_core::JobId;
use adpulse_domain::{HubEvent, JobType};
use adpulse_hub::FanoutHub;
use adpulse_jobs::{
    InMemoryCancellation, InMemoryTaskQueue, JobError, JobProducer, JobResult, TaskDescriptor,
    TaskQueue,
};
use adpulse_repository::{InMemoryAssetStatusRepository, InMemoryJobLedger};
use adpulse_rest::{create_router, AppState};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    queue: Arc<InMemoryTaskQueue>,
    hub: Arc<FanoutHub>,
}

fn app_with_queue(queue: Arc<dyn TaskQueue>) -> (Router, Arc<FanoutHub>) {
    let hub = Arc::new(FanoutHub::new());
    let producer = Arc::new(JobProducer::new(
        Arc::new(InMemoryJobLedger::new()),
        Arc::new(InMemoryAssetStatusRepository::new()),
        queue,
        Arc::new(InMemoryCancellation::new()),
        hub.clone(),
    ));
    let state = AppState::new(producer, hub.clone());
    let router = create_router(
        state,
        &ServerConfig::default(),
        &ObservabilityConfig::default(),
    );
    (router, hub)
}

fn app() -> TestApp {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let (router, hub) = app_with_queue(queue.clone());
    TestApp { router, queue, hub }
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

fn ad_job_body() -> Value {
    json!({
        "jobType": "ad_analysis",
        "referenceType": "ad",
        "referenceId": 7,
        "filePath": "/data/ads/7.mp4",
        "fileType": "video/mp4"
    })
}

#[tokio::test]
async fn test_create_then_get_job() {
    let app = app();

    let (status, body) = send(&app.router, "POST", "/api/v1/jobs", Some(ad_job_body())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    let job_id = body["data"]["jobId"].as_str().unwrap().to_string();

    let pending = app.queue.pending(JobType::AdAnalysis);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].job_id.as_str(), job_id);
    assert_eq!(pending[0].ad_id, Some(7));

    let (status, body) = send(&app.router, "GET", &format!("/api/v1/jobs/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "queued");
    assert_eq!(body["data"]["progress"], 0);
    assert_eq!(body["data"]["referenceId"], 7);
}

#[tokio::test]
async fn test_create_job_validation() {
    let app = app();

    let mut body = ad_job_body();
    body["referenceId"] = json!(0);
    let (status, response) = send(&app.router, "POST", "/api/v1/jobs", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["success"], false);
    assert_eq!(response["error"]["code"], "VALIDATION_ERROR");

    // Job type and reference type disagree.
    let mut body = ad_job_body();
    body["referenceType"] = json!("reaction_video");
    let (status, response) = send(&app.router, "POST", "/api/v1/jobs", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], "VALIDATION_ERROR");

    let mut body = ad_job_body();
    body["jobType"] = json!("thumbnail");
    let (status, response) = send(&app.router, "POST", "/api/v1/jobs", Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["error"]["code"], "INVALID_JSON");

    assert!(app.queue.pending(JobType::AdAnalysis).is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_404() {
    let app = app();
    let (status, body) = send(&app.router, "GET", "/api/v1/jobs/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_cancel_job_once() {
    let app = app();
    let (_, body) = send(&app.router, "POST", "/api/v1/jobs", Some(ad_job_body())).await;
    let job_id = body["data"]["jobId"].as_str().unwrap().to_string();

    let mut client = app.hub.connect();
    app.hub.subscribe(client.id(), &JobId::from(job_id.as_str()));

    let uri = format!("/api/v1/jobs/{job_id}/cancel");
    let (status, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cancelled"], true);
    assert!(matches!(client.try_recv(), Some(HubEvent::Cancelled(_))));

    let (_, body) = send(&app.router, "POST", &uri, None).await;
    assert_eq!(body["data"]["cancelled"], false);

    let (_, body) = send(&app.router, "GET", &format!("/api/v1/jobs/{job_id}"), None).await;
    assert_eq!(body["data"]["status"], "cancelled");
}

/// Queue that refuses every descriptor.
struct DownQueue;

#[async_trait]
impl TaskQueue for DownQueue {
    async fn enqueue(&self, _descriptor: &TaskDescriptor) -> JobResult<()> {
        Err(JobError::QueueUnavailable("connection refused".into()))
    }

    async fn dequeue(
        &self,
        _job_types: &[JobType],
        _timeout: Duration,
    ) -> JobResult<Option<TaskDescriptor>> {
        Ok(None)
    }

    async fn depth(&self, _job_type: JobType) -> JobResult<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_queue_unavailable_is_503() {
    let (router, _hub) = app_with_queue(Arc::new(DownQueue));
    let (status, body) = send(&router, "POST", "/api/v1/jobs", Some(ad_job_body())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "QUEUE_UNAVAILABLE");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = app();

    let (status, body) = send(&app.router, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["hub"]["connections"], 0);

    let (status, body) = send(&app.router, "GET", "/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let (status, _) = send(&app.router, "GET", "/live", None).await;
    assert_eq!(status, StatusCode::OK);

    // No recorder installed.
    let (status, _) = send(&app.router, "GET", "/metrics", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
