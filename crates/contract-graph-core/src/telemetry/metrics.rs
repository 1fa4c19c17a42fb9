//! Prometheus metrics for the contract graph engine
//!
//! All metrics live under the `contract_graph` namespace:
//! - `validations_total` (counter) - batch validations by result
//! - `validation_issues_total` (counter) - violations reported
//! - `applies_total` (counter) - applies by result
//! - `apply_duration_seconds` (histogram) - apply duration distribution
//! - `modules_applied` (gauge) - modules written by the last successful apply
//! - `embedding_failures_total` (counter) - embeddings degraded to none
//! - `search_requests_total` (counter) - searches by mode
//! - `change_checks_total` (counter) - change checks by result
//! - `active_sessions` (gauge) - store sessions currently open

use std::sync::Arc;
use std::time::Instant;

use prometheus::{Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry};

use super::{Result, TelemetryError};

const NAMESPACE: &str = "contract_graph";

/// Engine metrics
pub struct EngineMetrics {
    validations_total: CounterVec,
    validation_issues_total: Counter,
    applies_total: CounterVec,
    apply_duration_seconds: Histogram,
    modules_applied: Gauge,
    embedding_failures_total: Counter,
    search_requests_total: CounterVec,
    change_checks_total: CounterVec,
    active_sessions: Gauge,
}

impl EngineMetrics {
    /// Create the metrics and register them with `registry`
    pub fn new(registry: &Registry) -> Result<Self> {
        let validations_total = CounterVec::new(
            Opts::new("validations_total", "Total number of batch validations").namespace(NAMESPACE),
            &["result"],
        )?;

        let validation_issues_total = Counter::with_opts(
            Opts::new(
                "validation_issues_total",
                "Total number of structural and referential violations reported",
            )
            .namespace(NAMESPACE),
        )?;

        let applies_total = CounterVec::new(
            Opts::new("applies_total", "Total number of graph applies").namespace(NAMESPACE),
            &["result"],
        )?;

        let apply_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("apply_duration_seconds", "Graph apply duration in seconds")
                .namespace(NAMESPACE)
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;

        let modules_applied = Gauge::with_opts(
            Opts::new(
                "modules_applied",
                "Modules written by the last successful apply",
            )
            .namespace(NAMESPACE),
        )?;

        let embedding_failures_total = Counter::with_opts(
            Opts::new(
                "embedding_failures_total",
                "Embeddings that failed and were stored as none",
            )
            .namespace(NAMESPACE),
        )?;

        let search_requests_total = CounterVec::new(
            Opts::new("search_requests_total", "Total number of searches").namespace(NAMESPACE),
            &["mode"],
        )?;

        let change_checks_total = CounterVec::new(
            Opts::new("change_checks_total", "Total number of change checks").namespace(NAMESPACE),
            &["result"],
        )?;

        let active_sessions = Gauge::with_opts(
            Opts::new("active_sessions", "Graph store sessions currently open").namespace(NAMESPACE),
        )?;

        registry.register(Box::new(validations_total.clone()))?;
        registry.register(Box::new(validation_issues_total.clone()))?;
        registry.register(Box::new(applies_total.clone()))?;
        registry.register(Box::new(apply_duration_seconds.clone()))?;
        registry.register(Box::new(modules_applied.clone()))?;
        registry.register(Box::new(embedding_failures_total.clone()))?;
        registry.register(Box::new(search_requests_total.clone()))?;
        registry.register(Box::new(change_checks_total.clone()))?;
        registry.register(Box::new(active_sessions.clone()))?;

        Ok(Self {
            validations_total,
            validation_issues_total,
            applies_total,
            apply_duration_seconds,
            modules_applied,
            embedding_failures_total,
            search_requests_total,
            change_checks_total,
            active_sessions,
        })
    }

    /// Record a batch validation and the number of issues it found
    pub fn record_validation(&self, valid: bool, issues: usize) {
        let result = if valid { "valid" } else { "invalid" };
        self.validations_total.with_label_values(&[result]).inc();
        self.validation_issues_total.inc_by(issues as f64);
    }

    /// Record an apply outcome
    pub fn record_apply(&self, success: bool, modules: usize) {
        let result = if success { "success" } else { "failure" };
        self.applies_total.with_label_values(&[result]).inc();
        if success {
            self.modules_applied.set(modules as f64);
        }
    }

    pub fn record_embedding_failure(&self) {
        self.embedding_failures_total.inc();
    }

    /// Record a search; `mode` is `semantic` or `filter`
    pub fn record_search(&self, mode: &str) {
        self.search_requests_total.with_label_values(&[mode]).inc();
    }

    pub fn record_change_check(&self, has_changes: bool) {
        let result = if has_changes { "changed" } else { "unchanged" };
        self.change_checks_total.with_label_values(&[result]).inc();
    }

    pub fn set_active_sessions(&self, sessions: usize) {
        self.active_sessions.set(sessions as f64);
    }

    /// Start an apply timer (records the duration on drop)
    pub fn start_apply_timer(&self) -> ApplyTimer<'_> {
        ApplyTimer {
            start: Instant::now(),
            metrics: self,
        }
    }
}

/// RAII guard for timing applies
pub struct ApplyTimer<'a> {
    start: Instant,
    metrics: &'a EngineMetrics,
}

impl<'a> Drop for ApplyTimer<'a> {
    fn drop(&mut self) {
        self.metrics
            .apply_duration_seconds
            .observe(self.start.elapsed().as_secs_f64());
    }
}

/// Registry owning the engine metrics
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    engine: Arc<EngineMetrics>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        Self::with_registry(Arc::new(Registry::new()))
    }

    /// Register the engine metrics with an existing Prometheus registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let engine = Arc::new(EngineMetrics::new(&registry)?);
        Ok(Self { registry, engine })
    }

    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.registry)
    }

    pub fn engine(&self) -> Arc<EngineMetrics> {
        Arc::clone(&self.engine)
    }

    /// Encode metrics in the Prometheus text exposition format
    pub fn encode_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Encoding(e.to_string()))
    }
}
