// src/metrics.rs
use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up in the exposition).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "backlog_records_total",
            "Records that reached a terminal state, by outcome."
        );
        describe_counter!(
            "backlog_profile_failures_total",
            "Failed profile summarizations, by failure category."
        );
        describe_counter!(
            "backlog_quota_pauses_total",
            "Backoff pauses taken after a quota signal."
        );
        describe_counter!(
            "backlog_delegate_calls_total",
            "Calls made to the remote backlog procedure."
        );
        describe_counter!("provider_requests_total", "Requests to the bill provider.");
        describe_histogram!("provider_request_ms", "Bill provider latency in milliseconds.");
        describe_histogram!("backlog_record_ms", "Wall time per record in milliseconds.");
        describe_gauge!("backlog_worklist_size", "Records selected for the current run.");
        describe_gauge!("backlog_last_run_ts", "Unix ts when a backlog run last ended.");
    });
}

/// Prometheus recorder for the process. Install once, before the run.
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    pub fn install() -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("installing prometheus recorder")?;
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Current exposition text.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
