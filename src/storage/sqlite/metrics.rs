//! Store operation metrics.

use std::time::Instant;

/// Records `store_operations_total` and `store_operation_duration_ms`.
///
/// `status` is `"success"` or `"error"`.
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "store_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "store_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Returns the status label for a result.
pub const fn status_label<T, E>(result: &std::result::Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}
