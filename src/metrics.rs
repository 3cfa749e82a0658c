//! Metrics for the fetch engine.
//!
//! Uses the `metrics` crate facade; the Prometheus exporter is enabled by
//! the `metrics-exporter` feature. All metrics follow the pattern
//! `tierfetch_{name}_{unit}`.

use std::time::Instant;

/// Fetch engine metrics.
pub struct FetchMetrics;

impl FetchMetrics {
    /// Cache lookups attempted, counted as the requested message count.
    pub fn add_cache_access(topic: &str, group: &str, count: u64) {
        metrics::counter!(
            "tierfetch_cache_access_total",
            "topic" => topic.to_string(),
            "group" => group.to_string()
        )
        .increment(count);
    }

    /// Cache lookups satisfied.
    pub fn add_cache_hit(topic: &str, group: &str, count: u64) {
        metrics::counter!(
            "tierfetch_cache_hit_total",
            "topic" => topic.to_string(),
            "group" => group.to_string()
        )
        .increment(count);
    }

    /// Messages fetched from the backend.
    pub fn add_backend_messages(topic: &str, count: u64) {
        metrics::counter!(
            "tierfetch_backend_messages_total",
            "topic" => topic.to_string()
        )
        .increment(count);
    }

    /// Prefetch batches issued.
    pub fn increment_prefetch_batches(topic: &str) {
        metrics::counter!(
            "tierfetch_prefetch_batches_total",
            "topic" => topic.to_string()
        )
        .increment(1);
    }

    /// Current cache weight in bytes.
    pub fn set_cache_weight(bytes: u64) {
        metrics::gauge!("tierfetch_cache_weight_bytes").set(bytes as f64);
    }

    /// Current cache entry count.
    pub fn set_cache_entries(count: u64) {
        metrics::gauge!("tierfetch_cache_entries").set(count as f64);
    }

    /// Cache evictions observed.
    pub fn set_cache_evictions(count: u64) {
        metrics::gauge!("tierfetch_cache_evictions").set(count as f64);
    }

    /// Backend fetch latency.
    pub fn record_fetch_latency_us(us: u64) {
        metrics::histogram!("tierfetch_fetch_latency_seconds").record(us as f64 / 1_000_000.0);
    }

    /// Time spent suspended on an in-flight request.
    pub fn record_inflight_wait_us(us: u64) {
        metrics::histogram!("tierfetch_inflight_wait_seconds").record(us as f64 / 1_000_000.0);
    }
}

/// Initialize the Prometheus metrics exporter serving `/metrics` on `addr`.
#[cfg(feature = "metrics-exporter")]
pub fn init_metrics(
    addr: std::net::SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("prometheus metrics server listening on http://{}/metrics", addr);
    Ok(())
}

/// Timer for measuring operation durations
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
