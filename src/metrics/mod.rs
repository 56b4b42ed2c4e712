/*!
 * # Metrics Module
 *
 * In-process metrics for the forecasting service.
 *
 * ## Features
 *
 * - Forecast request outcomes (served, rejected, failed)
 * - Inference latency and requested horizons
 * - Loaded model gauge
 *
 * ## Metrics Formats
 *
 * Metrics are exposed in the following formats:
 * - Prometheus text format at `/metrics`
 * - JSON format at `/metrics/json`
 */

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Failed to export metrics: {0}")]
    ExportError(String),
}

impl IntoResponse for MetricsError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "metrics export failed");
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Float gauge stored as raw bits
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    bits: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// Upper bounds for latency histograms, in seconds
pub const LATENCY_BUCKETS: [f64; 10] = [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
/// Upper bounds for horizon histograms, in days
pub const HORIZON_BUCKETS: [f64; 6] = [1.0, 7.0, 14.0, 30.0, 60.0, 90.0];

#[derive(Debug, Clone)]
pub struct Histogram {
    bounds: Arc<Vec<f64>>,
    buckets: Arc<Vec<AtomicU64>>,
    sum_bits: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new(bounds: &[f64]) -> Self {
        Self {
            bounds: Arc::new(bounds.to_vec()),
            buckets: Arc::new(bounds.iter().map(|_| AtomicU64::new(0)).collect()),
            sum_bits: Arc::new(AtomicU64::new(0f64.to_bits())),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn observe(&self, value: f64) {
        for (bound, bucket) in self.bounds.iter().zip(self.buckets.iter()) {
            if value <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
        let _ = self
            .sum_bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> f64 {
        f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
    }

    /// Cumulative `(upper_bound, count)` pairs
    pub fn buckets(&self) -> Vec<(f64, u64)> {
        self.bounds
            .iter()
            .zip(self.buckets.iter())
            .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: DashMap<String, Counter>,
    gauges: DashMap<String, Gauge>,
    histograms: DashMap<String, Histogram>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_counter(&self, name: &str) -> Counter {
        self.counters
            .entry(name.to_string())
            .or_insert_with(Counter::new)
            .clone()
    }

    pub fn get_or_create_gauge(&self, name: &str) -> Gauge {
        self.gauges
            .entry(name.to_string())
            .or_insert_with(Gauge::new)
            .clone()
    }

    pub fn get_or_create_histogram(&self, name: &str, bounds: &[f64]) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(|| Histogram::new(bounds))
            .clone()
    }

    fn sorted<T: Clone>(map: &DashMap<String, T>) -> Vec<(String, T)> {
        let mut entries: Vec<(String, T)> = map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Prometheus text exposition, metrics sorted by name
    pub fn export_metrics(&self) -> Result<String, MetricsError> {
        let mut output = String::new();
        let export = |e: std::fmt::Error| MetricsError::ExportError(e.to_string());

        for (name, counter) in Self::sorted(&self.counters) {
            writeln!(output, "# TYPE {} counter", name).map_err(export)?;
            writeln!(output, "{} {}", name, counter.get()).map_err(export)?;
        }

        for (name, gauge) in Self::sorted(&self.gauges) {
            writeln!(output, "# TYPE {} gauge", name).map_err(export)?;
            writeln!(output, "{} {}", name, gauge.get()).map_err(export)?;
        }

        for (name, histogram) in Self::sorted(&self.histograms) {
            writeln!(output, "# TYPE {} histogram", name).map_err(export)?;
            for (bound, count) in histogram.buckets() {
                writeln!(output, "{}_bucket{{le=\"{}\"}} {}", name, bound, count).map_err(export)?;
            }
            writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", name, histogram.get_count())
                .map_err(export)?;
            writeln!(output, "{}_sum {}", name, histogram.get_sum()).map_err(export)?;
            writeln!(output, "{}_count {}", name, histogram.get_count()).map_err(export)?;
        }

        Ok(output)
    }

    pub fn export_metrics_json(&self) -> serde_json::Value {
        let counters: serde_json::Map<String, serde_json::Value> = Self::sorted(&self.counters)
            .into_iter()
            .map(|(name, counter)| (name, json!(counter.get())))
            .collect();

        let gauges: serde_json::Map<String, serde_json::Value> = Self::sorted(&self.gauges)
            .into_iter()
            .map(|(name, gauge)| (name, json!(gauge.get())))
            .collect();

        let histograms: serde_json::Map<String, serde_json::Value> =
            Self::sorted(&self.histograms)
                .into_iter()
                .map(|(name, histogram)| {
                    (
                        name,
                        json!({
                            "count": histogram.get_count(),
                            "sum": histogram.get_sum(),
                        }),
                    )
                })
                .collect();

        json!({
            "counters": counters,
            "gauges": gauges,
            "histograms": histograms,
        })
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

// Forecast-specific metrics
pub struct ForecastMetrics {
    pub requests_total: Counter,
    pub rejected_total: Counter,
    pub failed_total: Counter,
    pub groups_total: Counter,
    pub inference_duration: Histogram,
    pub horizon_days: Histogram,
    pub models_loaded: Gauge,
}

impl ForecastMetrics {
    pub fn new() -> Self {
        Self {
            requests_total: METRICS.get_or_create_counter("forecast_requests_total"),
            rejected_total: METRICS.get_or_create_counter("forecast_rejected_total"),
            failed_total: METRICS.get_or_create_counter("forecast_failed_total"),
            groups_total: METRICS.get_or_create_counter("forecast_groups_total"),
            inference_duration: METRICS.get_or_create_histogram(
                "forecast_inference_duration_seconds",
                &LATENCY_BUCKETS,
            ),
            horizon_days: METRICS.get_or_create_histogram("forecast_horizon_days", &HORIZON_BUCKETS),
            models_loaded: METRICS.get_or_create_gauge("forecast_models_loaded"),
        }
    }

    pub fn record_success(&self, groups: usize, horizon: usize, duration: Duration) {
        self.requests_total.inc();
        self.groups_total.inc_by(groups as u64);
        self.horizon_days.observe(horizon as f64);
        self.inference_duration.observe(duration.as_secs_f64());
    }

    pub fn record_rejection(&self) {
        self.requests_total.inc();
        self.rejected_total.inc();
    }

    pub fn record_failure(&self) {
        self.requests_total.inc();
        self.failed_total.inc();
    }

    pub fn set_models_loaded(&self, count: usize) {
        self.models_loaded.set(count as f64);
    }
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    pub static ref FORECAST_METRICS: ForecastMetrics = ForecastMetrics::new();
}

// HTTP endpoint handlers
pub async fn metrics_handler() -> Result<Response, MetricsError> {
    let body = METRICS.export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}

pub async fn metrics_json_handler() -> Json<serde_json::Value> {
    Json(METRICS.export_metrics_json())
}

/// Registers the forecast metrics so they are exported before the first request.
pub fn init_metrics(models_loaded: usize) {
    FORECAST_METRICS.set_models_loaded(models_loaded);
    info!(models_loaded, "metrics system initialized");
}

pub fn get_metrics_summary() -> String {
    format!(
        "Forecasts: {}, Rejected: {}, Failed: {}, Groups: {}",
        FORECAST_METRICS.requests_total.get(),
        FORECAST_METRICS.rejected_total.get(),
        FORECAST_METRICS.failed_total.get(),
        FORECAST_METRICS.groups_total.get()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_buckets_are_cumulative() {
        let histogram = Histogram::new(&[1.0, 5.0]);
        histogram.observe(0.5);
        histogram.observe(3.0);
        histogram.observe(9.0);

        assert_eq!(histogram.buckets(), vec![(1.0, 1), (5.0, 2)]);
        assert_eq!(histogram.get_count(), 3);
        assert!((histogram.get_sum() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn gauge_keeps_fractions() {
        let gauge = Gauge::new();
        gauge.set(0.25);
        assert_eq!(gauge.get(), 0.25);
    }

    #[test]
    fn prometheus_export_is_sorted() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("b_total").inc_by(2);
        registry.get_or_create_counter("a_total").inc();
        registry
            .get_or_create_histogram("latency_seconds", &[0.1])
            .observe(0.05);

        let text = registry.export_metrics().unwrap();
        let a = text.find("a_total 1").unwrap();
        let b = text.find("b_total 2").unwrap();
        assert!(a < b);
        assert!(text.contains("latency_seconds_bucket{le=\"0.1\"} 1"));
        assert!(text.contains("latency_seconds_count 1"));
    }

    #[test]
    fn json_export_lists_every_kind() {
        let registry = MetricsRegistry::new();
        registry.get_or_create_counter("requests_total").inc();
        registry.get_or_create_gauge("models_loaded").set(1.0);

        let value = registry.export_metrics_json();
        assert_eq!(value["counters"]["requests_total"], 1);
        assert_eq!(value["gauges"]["models_loaded"], 1.0);
        assert!(value["histograms"].as_object().unwrap().is_empty());
    }
}
