/*!
 * # Metrics Module
 *
 * In-process counters, gauges and histograms kept in a `DashMap` registry and exposed in
 * Prometheus text format at `/metrics`.
 */

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

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

/// Integer gauge
#[derive(Debug, Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
}

impl Gauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Count and sum of observations, in microseconds for latencies
#[derive(Debug, Clone, Default)]
pub struct Histogram {
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn get_sum(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
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

    pub fn get_or_create_histogram(&self, name: &str) -> Histogram {
        self.histograms
            .entry(name.to_string())
            .or_insert_with(Histogram::new)
            .clone()
    }

    /// Prometheus text exposition, metric names sorted
    pub fn export_metrics(&self) -> String {
        let mut output = String::new();

        let mut counters: Vec<(String, u64)> = self
            .counters
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        counters.sort();
        for (name, value) in counters {
            let _ = writeln!(output, "# TYPE {} counter", name);
            let _ = writeln!(output, "{} {}", name, value);
        }

        let mut gauges: Vec<(String, u64)> = self
            .gauges
            .iter()
            .map(|e| (e.key().clone(), e.value().get()))
            .collect();
        gauges.sort();
        for (name, value) in gauges {
            let _ = writeln!(output, "# TYPE {} gauge", name);
            let _ = writeln!(output, "{} {}", name, value);
        }

        let mut histograms: Vec<(String, u64, u64)> = self
            .histograms
            .iter()
            .map(|e| (e.key().clone(), e.value().get_count(), e.value().get_sum()))
            .collect();
        histograms.sort();
        for (name, count, sum) in histograms {
            let _ = writeln!(output, "# TYPE {} summary", name);
            let _ = writeln!(output, "{}_count {}", name, count);
            let _ = writeln!(output, "{}_sum {}", name, sum);
        }

        output
    }
}

// Global metrics registry
lazy_static::lazy_static! {
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
    pub static ref BUSINESS_METRICS: BusinessMetrics = BusinessMetrics::new();
}

pub fn increment_counter(name: &str) {
    METRICS.get_or_create_counter(name).inc();
}

pub fn increment_counter_by(name: &str, value: u64) {
    METRICS.get_or_create_counter(name).inc_by(value);
}

pub fn set_gauge(name: &str, value: u64) {
    METRICS.get_or_create_gauge(name).set(value);
}

/// Counters for the shop-floor workflow
pub struct BusinessMetrics {
    pub orders_created: Counter,
    pub order_status_changes: Counter,
    pub cutting_assignments: Counter,
    pub batch_assignments: Counter,
    pub reassignments: Counter,
    pub qc_records: Counter,
    pub pieces_approved: Counter,
    pub pieces_rejected: Counter,
    pub stock_adjustments: Counter,
    pub goods_receipts: Counter,
    pub invoices_created: Counter,
    pub invoices_issued: Counter,
    pub files_uploaded: Counter,
}

impl BusinessMetrics {
    pub fn new() -> Self {
        Self {
            orders_created: METRICS.get_or_create_counter("orders_created_total"),
            order_status_changes: METRICS.get_or_create_counter("order_status_changes_total"),
            cutting_assignments: METRICS.get_or_create_counter("cutting_assignments_total"),
            batch_assignments: METRICS.get_or_create_counter("batch_assignments_total"),
            reassignments: METRICS.get_or_create_counter("reassignments_total"),
            qc_records: METRICS.get_or_create_counter("qc_records_total"),
            pieces_approved: METRICS.get_or_create_counter("qc_pieces_approved_total"),
            pieces_rejected: METRICS.get_or_create_counter("qc_pieces_rejected_total"),
            stock_adjustments: METRICS.get_or_create_counter("stock_adjustments_total"),
            goods_receipts: METRICS.get_or_create_counter("goods_receipts_total"),
            invoices_created: METRICS.get_or_create_counter("invoices_created_total"),
            invoices_issued: METRICS.get_or_create_counter("invoices_issued_total"),
            files_uploaded: METRICS.get_or_create_counter("files_uploaded_total"),
        }
    }
}

impl Default for BusinessMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Records request count, latency and 5xx responses
pub async fn http_metrics_middleware(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let response = next.run(request).await;

    increment_counter("http_requests_total");
    METRICS
        .get_or_create_histogram("http_request_duration_micros")
        .observe(started.elapsed().as_micros() as u64);
    if response.status().is_server_error() {
        increment_counter("http_server_errors_total");
    }

    response
}

/// Prometheus scrape endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        METRICS.export_metrics(),
    )
}
