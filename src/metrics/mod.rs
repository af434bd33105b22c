//! Metrics module
//!
//! Provides Prometheus metrics for uploads, downloads and mirror reads.

pub mod server;

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec,
};

lazy_static! {
    pub static ref TRANSFERS_TOTAL: CounterVec = register_counter_vec!(
        "fileferry_transfers_total",
        "Total number of transfers",
        &["operation", "status"]
    ).unwrap();

    pub static ref TRANSFER_BYTES_TOTAL: CounterVec = register_counter_vec!(
        "fileferry_transfer_bytes_total",
        "Total bytes transferred",
        &["operation"]
    ).unwrap();

    pub static ref TRANSFER_DURATION: HistogramVec = register_histogram_vec!(
        "fileferry_transfer_duration_seconds",
        "Transfer duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "fileferry_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a completed transfer
///
/// For downloads `duration_secs` covers resolution and open, not streaming.
pub fn record_transfer_success(operation: &str, bytes: u64, duration_secs: f64) {
    TRANSFERS_TOTAL.with_label_values(&[operation, "success"]).inc();
    TRANSFER_BYTES_TOTAL
        .with_label_values(&[operation])
        .inc_by(bytes as f64);
    TRANSFER_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Record a failed transfer and its error kind
pub fn record_transfer_failure(operation: &str, error_type: &str) {
    TRANSFERS_TOTAL.with_label_values(&[operation, "failure"]).inc();
    record_error(error_type);
}

/// Record an error
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_transfer_success() {
        let before = TRANSFERS_TOTAL
            .with_label_values(&["test_op", "success"])
            .get();
        record_transfer_success("test_op", 1024, 0.01);
        let after = TRANSFERS_TOTAL
            .with_label_values(&["test_op", "success"])
            .get();
        assert!(after >= before + 1.0);
    }

    #[test]
    fn test_record_transfer_failure() {
        let before = ERRORS_TOTAL.with_label_values(&["test_error"]).get();
        record_transfer_failure("test_op", "test_error");
        let after = ERRORS_TOTAL.with_label_values(&["test_error"]).get();
        assert!(after >= before + 1.0);
    }
}
