//! YouTube client metrics.
//!
//! Provides standardized metrics for monitoring remote operations:
//! - Request counters by operation and status
//! - Upload outcome counters and acknowledged bytes
//! - Retry counters

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Total YouTube requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "youtube_requests_total";

    /// Total retry attempts by operation.
    pub const RETRIES_TOTAL: &str = "youtube_retries_total";

    /// Uploads by terminal outcome.
    pub const UPLOADS_TOTAL: &str = "youtube_uploads_total";

    /// Bytes acknowledged by the upload endpoint.
    pub const UPLOAD_BYTES: &str = "youtube_upload_bytes_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "youtube_latency_seconds";
}

/// Record metrics for a completed request.
pub fn record_request(operation: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record the terminal outcome of an upload.
pub fn record_upload(outcome: &'static str) {
    counter!(names::UPLOADS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record newly acknowledged bytes.
pub fn record_upload_bytes(bytes: u64) {
    counter!(names::UPLOAD_BYTES).increment(bytes);
}
