use std::sync::OnceLock;

use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::core::config::Settings;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    if !settings.telemetry().prometheus_enabled {
        return Ok(());
    }
    if PROM_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROM_HANDLE.set(handle);
    describe();
    Ok(())
}

fn describe() {
    describe_counter!("correction_triggers_total", "Correction trigger calls by outcome");
    describe_counter!(
        "correction_jobs_published_total",
        "Correction jobs handed to the queue transport by outcome"
    );
    describe_counter!("grading_jobs_total", "Delivered correction jobs by outcome");
    describe_counter!(
        "grading_provider_errors_total",
        "Grading provider calls that ended in a degraded outcome"
    );
    describe_counter!("closed_corrections_total", "Closed-question exam corrections");
    describe_histogram!(
        "grading_duration_seconds",
        Unit::Seconds,
        "Time spent in the grading backend per job"
    );
    describe_counter!("http_requests_total", "HTTP responses by status");
    describe_histogram!(
        "http_request_duration_seconds",
        Unit::Seconds,
        "HTTP request latency by status"
    );
}

pub(crate) fn render() -> Option<String> {
    PROM_HANDLE.get().map(|handle| handle.render())
}
