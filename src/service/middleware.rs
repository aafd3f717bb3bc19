//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Exposed
//!
//! - `request` - Request count and latency by path, method, status
//! - `comparison` - Documents, segments and latency per comparison
//! - `segmentation` - Lists and segments per segmentation request

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Emits one `request_metric` event per request on the metrics target.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "mention_compare::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Collapses UUIDs and numeric path segments into `:id`.
fn normalize_path(path: &str) -> String {
    static PATTERN: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        regex_lite::Regex::new(
            r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}|/[0-9]+(/|$)",
        )
        .ok()
    });

    match pattern {
        Some(re) => re
            .replace_all(path, |caps: &regex_lite::Captures<'_>| match caps.get(1) {
                Some(tail) => format!("/:id{}", tail.as_str()),
                None => ":id".to_string(),
            })
            .to_string(),
        None => path.to_string(),
    }
}

/// Record comparison metrics.
pub fn record_comparison_metrics(documents: usize, segments: usize, latency_ms: u64) {
    info!(
        target: "mention_compare::metrics",
        metric_type = "comparison",
        documents = documents,
        segments = segments,
        latency_ms = latency_ms,
        "comparison_metric"
    );
}

/// Record segmentation metrics.
pub fn record_segmentation_metrics(lists: usize, segments: usize, latency_ms: u64) {
    info!(
        target: "mention_compare::metrics",
        metric_type = "segmentation",
        lists = lists,
        segments = segments,
        latency_ms = latency_ms,
        "segmentation_metric"
    );
}
