//! Metric recording helpers.
//!
//! The library only emits through the `metrics` facade. Installing a recorder
//! is left to the host process.

use std::time::Instant;

/// Records count and latency for one storage operation.
///
/// Emits `storage_operations_total` and `storage_operation_duration_ms`, both
/// labelled by backend, operation and status.
pub fn record_operation_metrics(
    backend: &'static str,
    operation: &'static str,
    start: Instant,
    status: &'static str,
) {
    metrics::counter!(
        "storage_operations_total",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "storage_operation_duration_ms",
        "backend" => backend,
        "operation" => operation,
        "status" => status
    )
    .record(start.elapsed().as_secs_f64() * 1000.0);
}

/// Counts dialect translations by outcome (`statement`, `no_op`).
pub fn record_translation(outcome: &'static str) {
    metrics::counter!("sql_translations_total", "outcome" => outcome).increment(1);
}

/// Counts autosave cycles by status.
pub fn record_autosave(status: &'static str) {
    metrics::counter!("autosave_total", "status" => status).increment(1);
}

/// Maps a result to the status label used by the helpers above.
pub const fn status_of<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() { "success" } else { "error" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_recording_without_recorder_is_harmless() {
        let start = Instant::now();
        std::thread::sleep(Duration::from_millis(1));
        record_operation_metrics("sqlite", "get", start, "success");
        record_translation("no_op");
        record_autosave("error");
    }

    #[test]
    fn test_status_of() {
        assert_eq!(status_of::<(), ()>(&Ok(())), "success");
        assert_eq!(status_of::<(), ()>(&Err(())), "error");
    }
}
