//! Prometheus metrics for the coffer server.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! Metrics carry no resource IDs or token material, but they do expose
//! aggregate download volume; restrict the endpoint at the network level.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use coffer_archive::ArchiveReport;
use prometheus::core::Collector;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};
use std::time::Duration;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Token metrics
pub static TOKENS_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coffer_download_tokens_issued_total",
        "Total number of download tokens issued",
    )
    .expect("metric creation failed")
});

pub static TOKEN_REDEMPTIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "coffer_download_token_redemptions_total",
            "Download token redemption attempts by outcome",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static TOKENS_PURGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coffer_download_tokens_purged_total",
        "Total number of expired download tokens deleted by the sweeper",
    )
    .expect("metric creation failed")
});

// Archive metrics
pub static ARCHIVES_STARTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coffer_archives_started_total",
        "Total number of archive streams started",
    )
    .expect("metric creation failed")
});

pub static ARCHIVES_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coffer_archives_completed_total",
        "Total number of archive streams written to the end",
    )
    .expect("metric creation failed")
});

pub static ARCHIVES_ABORTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coffer_archives_aborted_total",
        "Total number of archive streams aborted by a sink failure (usually a client disconnect)",
    )
    .expect("metric creation failed")
});

pub static ARCHIVE_ENTRIES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "coffer_archive_entries_total",
            "Archive entries by outcome (written, skipped, truncated)",
        ),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static ARCHIVE_BYTES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "coffer_archive_bytes_total",
        "Total archive bytes produced by completed streams",
    )
    .expect("metric creation failed")
});

pub static ARCHIVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "coffer_archive_duration_seconds",
            "Time taken to stream one archive",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn Collector>> = vec![
            Box::new(TOKENS_ISSUED.clone()),
            Box::new(TOKEN_REDEMPTIONS.clone()),
            Box::new(TOKENS_PURGED.clone()),
            Box::new(ARCHIVES_STARTED.clone()),
            Box::new(ARCHIVES_COMPLETED.clone()),
            Box::new(ARCHIVES_ABORTED.clone()),
            Box::new(ARCHIVE_ENTRIES.clone()),
            Box::new(ARCHIVE_BYTES.clone()),
            Box::new(ARCHIVE_DURATION.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// Record the outcome of a finished archive stream.
pub fn record_archive(report: &ArchiveReport, elapsed: Duration) {
    ARCHIVES_COMPLETED.inc();
    ARCHIVE_BYTES.inc_by(report.bytes);
    ARCHIVE_DURATION.observe(elapsed.as_secs_f64());
    ARCHIVE_ENTRIES
        .with_label_values(&["written"])
        .inc_by(report.written.len() as u64);
    ARCHIVE_ENTRIES
        .with_label_values(&["skipped"])
        .inc_by(report.skipped.len() as u64);
    ARCHIVE_ENTRIES
        .with_label_values(&["truncated"])
        .inc_by(report.truncated.len() as u64);
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration_is_idempotent() {
        register_metrics();
        register_metrics();
        TOKENS_ISSUED.inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("coffer_download_tokens_issued_total"));
    }
}
