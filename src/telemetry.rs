//! Telemetry sinks.

use crate::service::Telemetry;

/// Sink that emits structured tracing events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn test_set_run(&self, success: usize, failure: usize, test_set_id: &str, run_status: &str) {
        tracing::info!(
            event = "telemetry.test_set_run",
            success,
            failure,
            test_set = %test_set_id,
            status = %run_status,
            "test set completed"
        );
    }

    fn test_run(&self, success: usize, failure: usize, test_sets: usize, run_status: &str) {
        tracing::info!(
            event = "telemetry.test_run",
            success,
            failure,
            test_sets,
            status = %run_status,
            "test run completed"
        );
    }

    fn mock_test_run(&self, utilized_mocks: usize) {
        tracing::info!(
            event = "telemetry.mock_test_run",
            utilized_mocks,
            "mock utilization"
        );
    }
}

/// Sink that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn test_set_run(&self, _: usize, _: usize, _: &str, _: &str) {}
    fn test_run(&self, _: usize, _: usize, _: usize, _: &str) {}
    fn mock_test_run(&self, _: usize) {}
}
