//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! Handlers record business counters (`orders_total`, `tickets_sold_total`,
//! `logins_total`) directly through the `metrics` macros; this module
//! installs the recorder, times every request and refreshes gauges on scrape.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const ORDERS_TOTAL: &str = "orders_total";
pub const TICKETS_SOLD_TOTAL: &str = "tickets_sold_total";
pub const LOGINS_TOTAL: &str = "logins_total";
pub const EVENTS_PUBLISHED: &str = "events_published";

/// Install the global Prometheus recorder.
///
/// Fails if a recorder is already installed, so call it once at startup.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(ORDERS_TOTAL, "Order state changes by resulting status");
    describe_counter!(TICKETS_SOLD_TOTAL, "Tickets issued by purchases");
    describe_counter!(LOGINS_TOTAL, "Login attempts by outcome");
    describe_gauge!(EVENTS_PUBLISHED, "Published events that have not ended");

    Ok(handle)
}

/// GET /metrics - Prometheus text exposition, unauthenticated
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> Response {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "Metrics not initialized").into_response(),
    }
}

async fn update_gauge_metrics(state: &AppState) {
    match sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM events WHERE status = 'published' AND end_at >= ?",
    )
    .bind(crate::db::now())
    .fetch_one(&state.db)
    .await
    {
        Ok(count) => gauge!(EVENTS_PUBLISHED).set(count as f64),
        Err(e) => tracing::warn!(error = %e, "Failed to count published events"),
    }
}

/// Records `http_requests_total` and `http_request_duration_seconds`,
/// labelled by the matched route template rather than the raw path.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status)
        .increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}
