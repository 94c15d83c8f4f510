//! Metrics module for the fee ledger engine.
//! Provides Prometheus metrics for money operations and per-tenant metering.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Engine operation duration histogram
pub static OP_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!(
            "feeledger_op_duration_seconds",
            "Engine operation duration"
        ),
        &["operation"]
    )
    .expect("Failed to register OP_DURATION")
});

/// Payments counter (per-tenant metering)
pub static PAYMENTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Refunds counter (per-tenant metering)
pub static REFUNDS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Records created counter (per-tenant metering)
pub static RECORDS_CREATED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Reconciliation sweep runs by pass
pub static SWEEP_RUNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Records rewritten by the sweep, by pass
pub static SWEEP_REWRITES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Swallowed audit-append failures
pub static AUDIT_FAILURES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    PAYMENTS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "feeledger_payments_total",
                "Total payments recorded by tenant"
            ),
            &["coaching_id"]
        )
        .expect("Failed to register PAYMENTS_TOTAL")
    });

    REFUNDS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("feeledger_refunds_total", "Total refunds recorded by tenant"),
            &["coaching_id"]
        )
        .expect("Failed to register REFUNDS_TOTAL")
    });

    RECORDS_CREATED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "feeledger_records_created_total",
                "Total fee records created by tenant"
            ),
            &["coaching_id"]
        )
        .expect("Failed to register RECORDS_CREATED_TOTAL")
    });

    SWEEP_RUNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "feeledger_sweep_runs_total",
                "Reconciliation sweep executions by tenant and pass"
            ),
            &["coaching_id", "pass"]
        )
        .expect("Failed to register SWEEP_RUNS_TOTAL")
    });

    SWEEP_REWRITES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "feeledger_sweep_rewrites_total",
                "Records rewritten by the sweep, by tenant and pass"
            ),
            &["coaching_id", "pass"]
        )
        .expect("Failed to register SWEEP_REWRITES_TOTAL")
    });

    AUDIT_FAILURES_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "feeledger_audit_failures_total",
                "Audit appends that failed and were swallowed"
            ),
            &["coaching_id"]
        )
        .expect("Failed to register AUDIT_FAILURES_TOTAL")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("feeledger_errors_total", "Engine errors by operation"),
            &["operation", "kind"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });
}

/// Render all registered metrics in Prometheus text format.
pub fn render_metrics() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
