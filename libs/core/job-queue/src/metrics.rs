//! Prometheus metrics for the job queue

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use std::time::Duration;
use tracing::info;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder. Subsequent calls return the same handle.
pub fn init_metrics() -> Result<&'static PrometheusHandle, BuildError> {
    PROMETHEUS_HANDLE.get_or_try_init(|| {
        let handle = PrometheusBuilder::new().install_recorder()?;
        info!("Prometheus metrics initialized");
        Ok(handle)
    })
}

pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

/// Render metrics in Prometheus text format (empty before `init_metrics`)
pub fn render_metrics() -> String {
    prometheus_handle().map(|h| h.render()).unwrap_or_default()
}

pub fn job_enqueued(kind: &str) {
    counter!("job_queue_jobs_enqueued_total", "kind" => kind.to_string()).increment(1);
}

pub fn job_claimed(kind: &str) {
    counter!("job_queue_jobs_claimed_total", "kind" => kind.to_string()).increment(1);
}

/// Record how an attempt ended: `succeeded`, `retried`, `failed` or `abandoned`
pub fn job_finished(kind: &str, outcome: &'static str, duration: Duration) {
    counter!(
        "job_queue_jobs_processed_total",
        "kind" => kind.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!("job_queue_job_duration_seconds", "kind" => kind.to_string())
        .record(duration.as_secs_f64());
}

pub fn handler_error(kind: &str, category: &'static str) {
    counter!(
        "job_queue_handler_errors_total",
        "kind" => kind.to_string(),
        "category" => category
    )
    .increment(1);
}

pub fn jobs_recovered(count: usize) {
    counter!("job_queue_jobs_recovered_total").increment(count as u64);
}

pub fn storage_error(operation: &'static str) {
    counter!("job_queue_storage_errors_total", "operation" => operation).increment(1);
}

pub fn relay_failure(channel: &str) {
    counter!("job_queue_relay_failures_total", "channel" => channel.to_string()).increment(1);
}

pub fn in_flight(count: usize) {
    gauge!("job_queue_jobs_in_flight").set(count as f64);
}
