//! Prometheus metrics for the search service.
//!
//! Covers HTTP traffic, backend page fetches, result-set walks, live
//! sessions and backend reachability.
//!
//! # Example
//! ```no_run
//! use line_search::metrics::{self, HTTP_REQUESTS_TOTAL};
//!
//! metrics::init_metrics().ok();
//! HTTP_REQUESTS_TOTAL
//!     .with_label_values(&["GET", "/health", "200"])
//!     .inc();
//! ```

use crate::search::backend::{BackendPage, PagingStrategy};
use crate::search::error::SearchResult;
use lazy_static::lazy_static;
use prometheus::{CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry};
use std::time::Duration;

const NAMESPACE: &str = "line_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    /// Total number of HTTP requests received
    ///
    /// Labels: method, path, status_code
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests")
            .namespace(NAMESPACE),
        &["method", "path", "status_code"]
    ).expect("Failed to create HTTP_REQUESTS_TOTAL metric");

    /// HTTP request duration in seconds
    ///
    /// Labels: method, path
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 120.0]),
        &["method", "path"]
    ).expect("Failed to create HTTP_REQUEST_DURATION_SECONDS metric");

    // ============================================================================
    // Backend Metrics
    // ============================================================================

    /// Page fetches issued to the backend
    ///
    /// Labels: strategy, outcome (ok or the error kind)
    pub static ref BACKEND_FETCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("backend_fetches_total", "Total number of backend page fetches")
            .namespace(NAMESPACE),
        &["strategy", "outcome"]
    ).expect("Failed to create BACKEND_FETCHES_TOTAL metric");

    /// Backend page fetch latency in seconds
    ///
    /// Labels: strategy
    pub static ref BACKEND_FETCH_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "backend_fetch_duration_seconds",
            "Backend page fetch duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 60.0]),
        &["strategy"]
    ).expect("Failed to create BACKEND_FETCH_DURATION_SECONDS metric");

    /// Records returned per page fetch
    pub static ref BACKEND_RECORDS_PER_FETCH: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "backend_records_per_fetch",
            "Records returned by a single backend fetch"
        )
        .namespace(NAMESPACE)
        .buckets(prometheus::exponential_buckets(1.0, 10.0, 6).unwrap_or_default())
    ).expect("Failed to create BACKEND_RECORDS_PER_FETCH metric");

    /// 1 when the last health probe reached the backend
    pub static ref BACKEND_UP: Gauge = Gauge::with_opts(
        Opts::new("backend_up", "Whether the search backend answered its last probe")
            .namespace(NAMESPACE)
    ).expect("Failed to create BACKEND_UP metric");

    // ============================================================================
    // Walk / Session Metrics
    // ============================================================================

    /// Full materializations
    ///
    /// Labels: outcome (completed, aborted)
    pub static ref WALKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("walks_total", "Total number of result-set materializations")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create WALKS_TOTAL metric");

    /// Records accumulated per walk
    ///
    /// Labels: outcome
    pub static ref WALK_RECORDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("walk_records", "Records accumulated by one walk")
            .namespace(NAMESPACE)
            .buckets(prometheus::exponential_buckets(1.0, 10.0, 7).unwrap_or_default()),
        &["outcome"]
    ).expect("Failed to create WALK_RECORDS metric");

    /// Live search sessions
    pub static ref SESSIONS_ACTIVE: Gauge = Gauge::with_opts(
        Opts::new("sessions_active", "Number of live search sessions")
            .namespace(NAMESPACE)
    ).expect("Failed to create SESSIONS_ACTIVE metric");
}

/// Register every metric with [`PROMETHEUS_REGISTRY`]. Fails if called twice.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(BACKEND_FETCHES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BACKEND_FETCH_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BACKEND_RECORDS_PER_FETCH.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BACKEND_UP.clone()))?;

    PROMETHEUS_REGISTRY.register(Box::new(WALKS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(WALK_RECORDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SESSIONS_ACTIVE.clone()))?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Record one backend page fetch
pub fn record_fetch(
    strategy: &PagingStrategy,
    result: &SearchResult<BackendPage>,
    elapsed: Duration,
) {
    let strategy = strategy.to_string();
    let outcome = match result {
        Ok(page) => {
            BACKEND_RECORDS_PER_FETCH.observe(page.records.len() as f64);
            "ok"
        }
        Err(e) => e.kind(),
    };

    BACKEND_FETCHES_TOTAL
        .with_label_values(&[strategy.as_str(), outcome])
        .inc();
    BACKEND_FETCH_DURATION_SECONDS
        .with_label_values(&[strategy.as_str()])
        .observe(elapsed.as_secs_f64());
}

/// Record the end of a materialization
pub fn record_walk(outcome: &str, records: usize) {
    WALKS_TOTAL.with_label_values(&[outcome]).inc();
    WALK_RECORDS
        .with_label_values(&[outcome])
        .observe(records as f64);
}

/// Record an HTTP request served by the API
pub fn record_http(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(elapsed.as_secs_f64());
}

/// Generate Prometheus text format metrics for the /metrics endpoint
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
