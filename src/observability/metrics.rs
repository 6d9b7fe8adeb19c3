//! # Metrics
//!
//! Prometheus metrics for monitoring managed resource reconciliation.
//!
//! ## Metrics Exposed
//!
//! - `managed_reconciles_total{outcome}` - Reconciles by outcome (`done`, `requeue`, `requeue_after`, `error`)
//! - `managed_reconcile_duration_seconds` - Duration of reconcile calls
//! - `managed_external_operations_total{operation,result}` - Calls made through the external client
//! - `managed_first_time_ready_total` - Resources observed ready for the first time
//! - `managed_drift_detected_total` - Observations that found the external resource out of date

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("managed_reconciles_total", "Total number of reconciles by outcome"),
        &["outcome"],
    )
    .expect("Failed to create RECONCILES_TOTAL metric - this should never happen")
});

static RECONCILE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "managed_reconcile_duration_seconds",
            "Duration of reconcile calls in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILE_DURATION metric - this should never happen")
});

static EXTERNAL_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "managed_external_operations_total",
            "Total number of external client operations by operation and result",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create EXTERNAL_OPERATIONS_TOTAL metric - this should never happen")
});

static FIRST_TIME_READY_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "managed_first_time_ready_total",
        "Total number of managed resources observed ready for the first time",
    )
    .expect("Failed to create FIRST_TIME_READY_TOTAL metric - this should never happen")
});

static DRIFT_DETECTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "managed_drift_detected_total",
        "Total number of observations that found the external resource out of date",
    )
    .expect("Failed to create DRIFT_DETECTED_TOTAL metric - this should never happen")
});

/// Register all metrics with the crate registry. Call once at startup.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILE_DURATION.clone()))?;
    REGISTRY.register(Box::new(EXTERNAL_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FIRST_TIME_READY_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DRIFT_DETECTED_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciles(outcome: &str) {
    RECONCILES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn observe_reconcile_duration(duration: f64) {
    RECONCILE_DURATION.observe(duration);
}

pub fn increment_external_operations(operation: &str, ok: bool) {
    let result = if ok { "success" } else { "error" };
    EXTERNAL_OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

pub fn increment_first_time_ready() {
    FIRST_TIME_READY_TOTAL.inc();
}

pub fn increment_drift_detected() {
    DRIFT_DETECTED_TOTAL.inc();
}

/// Side channel the reconciler reports state transitions to.
///
/// Recording must never fail or block reconciliation.
pub trait MetricRecorder: Send + Sync {
    fn record_reconcile(&self, outcome: &str, duration: Duration);

    fn record_external_operation(&self, operation: &str, ok: bool);

    fn record_first_time_ready(&self);

    fn record_drift(&self);
}

/// [`MetricRecorder`] writing to the Prometheus registry
#[derive(Debug, Clone, Copy, Default)]
pub struct PrometheusMetrics;

impl MetricRecorder for PrometheusMetrics {
    fn record_reconcile(&self, outcome: &str, duration: Duration) {
        increment_reconciles(outcome);
        observe_reconcile_duration(duration.as_secs_f64());
    }

    fn record_external_operation(&self, operation: &str, ok: bool) {
        increment_external_operations(operation, ok);
    }

    fn record_first_time_ready(&self) {
        increment_first_time_ready();
    }

    fn record_drift(&self) {
        increment_drift_detected();
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NopMetrics;

impl MetricRecorder for NopMetrics {
    fn record_reconcile(&self, _outcome: &str, _duration: Duration) {}

    fn record_external_operation(&self, _operation: &str, _ok: bool) {}

    fn record_first_time_ready(&self) {}

    fn record_drift(&self) {}
}
