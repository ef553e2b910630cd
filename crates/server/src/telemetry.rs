//! Prometheus wiring: the exporter handle and the pipeline stage recorder.

use docvault::PipelineMetrics;
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// Only one recorder can exist per process; a second install returns an error, which is
/// logged and turned into `None` so the server keeps serving without `/metrics` text.
pub fn install_prometheus() -> Option<PrometheusHandle> {
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(err) => {
            tracing::warn!(error = %err, "prometheus recorder not installed");
            None
        }
    }
}

/// Records pipeline stage latencies through the `metrics` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct StageRecorder;

impl PipelineMetrics for StageRecorder {
    fn record_embedding(&self, latency: Duration, texts: usize, ok: bool) {
        histogram!("docvault_embedding_seconds").record(latency.as_secs_f64());
        counter!("docvault_embedded_texts_total").increment(texts as u64);
        if !ok {
            counter!("docvault_embedding_failures_total").increment(1);
        }
    }

    fn record_storage(&self, latency: Duration, operation: &'static str, ok: bool) {
        histogram!("docvault_store_seconds", "operation" => operation)
            .record(latency.as_secs_f64());
        if !ok {
            counter!("docvault_store_failures_total", "operation" => operation).increment(1);
        }
    }
}

/// Count one finished HTTP request.
pub fn record_request(method: &str, status: u16, latency: Duration) {
    counter!(
        "docvault_http_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("docvault_http_request_seconds", "method" => method.to_string())
        .record(latency.as_secs_f64());
}
