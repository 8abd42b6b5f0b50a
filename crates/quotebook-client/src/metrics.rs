//! Metric emission for client operations
//!
//! Emits through the `metrics` facade; the host application installs
//! whatever recorder it wants (Prometheus, statsd, none). With no recorder
//! installed every call is a no-op.
//!
//! - `api_client_requests_total` (counter): labels `status`, `method`;
//!   requests that end in session loss count under `status="expired"`
//! - `api_client_request_duration_seconds` (histogram): label `status`
//! - `api_client_token_refresh_total` (counter): label `outcome`
//! - `api_client_transport_errors_total` (counter): label `error_type`

/// Record a settled request with its final status code and HTTP method.
pub(crate) fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("api_client_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("api_client_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record a request that ended in session loss instead of a response the
/// caller could use. These carry `status="expired"` so the request totals
/// still add up.
pub(crate) fn record_session_expired(method: &str, duration_secs: f64) {
    let status_str = String::from("expired");
    metrics::counter!("api_client_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("api_client_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// Record a finished refresh cycle: `success`, `failure`, or `skipped`.
pub(crate) fn record_refresh(outcome: &str) {
    metrics::counter!("api_client_token_refresh_total", "outcome" => outcome.to_string())
        .increment(1);
}

/// Record a request that never produced a response.
pub(crate) fn record_transport_error(error_type: &str) {
    metrics::counter!("api_client_transport_errors_total", "error_type" => error_type.to_string())
        .increment(1);
}
