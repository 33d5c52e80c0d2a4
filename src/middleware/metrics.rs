// ============================================================================
// Prometheus Metrics Middleware
// ============================================================================
//
// ## Metrics Collected:
//
// 1. **HTTP Requests**
//    - Histogram: shopinvader_http_request_duration_seconds
//    - Counter: shopinvader_http_requests_total
//    - Labels: method, path, status
//
// 2. **ERP Calls**
//    - Histogram: shopinvader_erp_call_duration_seconds
//    - Counter: shopinvader_erp_calls_total
//    - Labels: outcome (success, application, maintenance, transport, ...)
//
// 3. **ERP Maintenance**
//    - Counter: shopinvader_erp_maintenance_total
//    - Labels: operation (signup, sign_in, reset_password, proxy)
//
// 4. **Signups**
//    - Counter: shopinvader_signup_outcomes_total
//    - Labels: outcome (skipped, committed, rolled_back_maintenance, rolled_back_application)
//
// ## Endpoints:
//
// - GET /metrics - Prometheus scrape endpoint
//
// ============================================================================

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use std::time::{Duration, Instant};

/// Path segments kept before the rest of a storefront URL is collapsed
const MAX_PATH_SEGMENTS: usize = 2;

// ============================================================================
// PROMETHEUS METRICS REGISTRY
// ============================================================================

lazy_static! {
    pub static ref HTTP_REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "shopinvader_http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    )
    .expect("http duration histogram registers once");

    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "shopinvader_http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .expect("http request counter registers once");

    pub static ref ERP_CALL_DURATION: HistogramVec = register_histogram_vec!(
        "shopinvader_erp_call_duration_seconds",
        "ERP call latency in seconds",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("erp duration histogram registers once");

    pub static ref ERP_CALLS_TOTAL: CounterVec = register_counter_vec!(
        "shopinvader_erp_calls_total",
        "Total number of ERP calls by outcome",
        &["outcome"]
    )
    .expect("erp call counter registers once");

    pub static ref ERP_MAINTENANCE_TOTAL: CounterVec = register_counter_vec!(
        "shopinvader_erp_maintenance_total",
        "ERP maintenance conditions hit, by storefront operation",
        &["operation"]
    )
    .expect("erp maintenance counter registers once");

    pub static ref SIGNUP_OUTCOMES_TOTAL: CounterVec = register_counter_vec!(
        "shopinvader_signup_outcomes_total",
        "Customer signups by ERP registration outcome",
        &["outcome"]
    )
    .expect("signup outcome counter registers once");
}

/// Keep label cardinality bounded: ids become `:id` and anything past the
/// first segments (product url keys, proxied ERP paths) becomes `*`.
///
/// Example: /invader/cart/123 -> /invader/cart/*
fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();

    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if normalized.len() == MAX_PATH_SEGMENTS {
            normalized.push("*");
            break;
        }

        if (segment.len() == 36 && segment.contains('-')) || segment.parse::<i64>().is_ok() {
            normalized.push(":id");
        } else {
            normalized.push(segment);
        }
    }

    format!("/{}", normalized.join("/"))
}

// ============================================================================
// METRICS MIDDLEWARE
// ============================================================================

pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();
    let status_str = status.as_u16().to_string();

    HTTP_REQUEST_DURATION
        .with_label_values(&[method.as_str(), &path, &status_str])
        .observe(duration.as_secs_f64());

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), &path, &status_str])
        .inc();

    tracing::debug!(
        target: "metrics",
        method = %method,
        path = %path,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "HTTP request completed"
    );

    response
}

// ============================================================================
// METRICS ENDPOINT HANDLER
// ============================================================================

pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

// ============================================================================
// HELPER FUNCTIONS FOR APPLICATION USE
// ============================================================================

/// Record one ERP round trip
///
/// # Example
/// ```
/// use std::time::Duration;
/// use shop_invader::middleware::metrics::record_erp_call;
/// record_erp_call("success", Duration::from_millis(12));
/// ```
pub fn record_erp_call(outcome: &str, duration: Duration) {
    ERP_CALLS_TOTAL.with_label_values(&[outcome]).inc();
    ERP_CALL_DURATION
        .with_label_values(&[outcome])
        .observe(duration.as_secs_f64());
}

pub fn record_erp_maintenance(operation: &str) {
    ERP_MAINTENANCE_TOTAL.with_label_values(&[operation]).inc();
    tracing::warn!(target: "erp", operation = %operation, "ERP in maintenance");
}

pub fn record_signup_outcome(outcome: &str) {
    SIGNUP_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

// ============================================================================
// TESTS
// ============================================================================
