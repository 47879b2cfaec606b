//! Lightweight metrics helpers for Strato.
//!
//! Wraps the `metrics` crate macros with gateway-specific names. No exporter
//! is embedded; the application can initialize any compatible recorder
//! externally and these calls become visible through it.
//!
//! Provided metrics (labels vary by family):
//! * `strato_requests_total` (counter, label: status)
//! * `strato_request_duration_seconds` (histogram)
//! * `strato_dispatch_attempts_total` (counter, labels: route, outcome)
//! * `strato_admission_rejections_total` (counter, label: identity)
//! * `strato_filter_failures_total` (counter, label: filter)
use std::time::Duration;

use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::Lazy;

pub const STRATO_REQUESTS_TOTAL: &str = "strato_requests_total";
pub const STRATO_REQUEST_DURATION_SECONDS: &str = "strato_request_duration_seconds";
pub const STRATO_DISPATCH_ATTEMPTS_TOTAL: &str = "strato_dispatch_attempts_total";
pub const STRATO_ADMISSION_REJECTIONS_TOTAL: &str = "strato_admission_rejections_total";
pub const STRATO_FILTER_FAILURES_TOTAL: &str = "strato_filter_failures_total";

static DESCRIBED: Lazy<()> = Lazy::new(|| {
    describe_counter!(
        STRATO_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests completed by the filter pipeline."
    );
    describe_histogram!(
        STRATO_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "End-to-end latency of requests through the filter pipeline."
    );
    describe_counter!(
        STRATO_DISPATCH_ATTEMPTS_TOTAL,
        Unit::Count,
        "Individual origin dispatch attempts by route and outcome."
    );
    describe_counter!(
        STRATO_ADMISSION_REJECTIONS_TOTAL,
        Unit::Count,
        "Requests rejected by admission control before the pipeline ran."
    );
    describe_counter!(
        STRATO_FILTER_FAILURES_TOTAL,
        Unit::Count,
        "Filter executions that returned a failure."
    );
});

/// Register metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&DESCRIBED);
    tracing::info!("metrics descriptions registered");
}

/// Record one completed pipeline run.
pub fn record_pipeline(status: u16, elapsed: Duration) {
    counter!(STRATO_REQUESTS_TOTAL, "status" => status.to_string()).increment(1);
    histogram!(STRATO_REQUEST_DURATION_SECONDS).record(elapsed.as_secs_f64());
}

/// Record one origin dispatch attempt. `outcome` is "OK", "CANCELLED", or an
/// error class string.
pub fn record_dispatch_attempt(route: &str, outcome: &str) {
    counter!(
        STRATO_DISPATCH_ATTEMPTS_TOTAL,
        "route" => route.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an admission-control rejection for a client identity.
pub fn record_admission_rejection(identity: &str) {
    counter!(STRATO_ADMISSION_REJECTIONS_TOTAL, "identity" => identity.to_string()).increment(1);
}

/// Record a filter failure by filter id.
pub fn record_filter_failure(filter: &str) {
    counter!(STRATO_FILTER_FAILURES_TOTAL, "filter" => filter.to_string()).increment(1);
}
