//! Request logging middleware.

use axum::{body::Body, extract::MatchedPath, http::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::info;

/// Total HTTP requests, by method, route, and status.
pub const HTTP_REQUESTS_TOTAL: &str = "adpulse_http_requests_total";
/// HTTP request duration in seconds, by method and route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "adpulse_http_request_duration_seconds";

/// Logs every request and records its count and latency.
///
/// Metrics are labelled with the matched route template, not the raw path,
/// so job ids do not explode label cardinality.
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |path| path.as_str().to_string());
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    counter!(
        HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route
    )
    .record(duration.as_secs_f64());

    info!(
        target: "http",
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "HTTP request completed"
    );

    response
}
