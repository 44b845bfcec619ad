//! # Swap Metrics
//!
//! Prometheus metrics for the coordinator, the adapters and the expiry monitor.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! swap-core = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `swap_orders_created_total` - Counter of created orders (by chain pair)
//! - `swap_status_transitions_total` - Counter of status transitions (by target status)
//! - `swap_adapter_errors_total` - Counter of adapter errors (by chain and kind)
//! - `swap_adapter_retries_total` - Counter of transient-failure retries (by chain and operation)
//! - `swap_refunds_total` - Counter of confirmed leg refunds (by chain)
//! - `swap_invariant_violations_total` - Counter of orders failed on an invariant
//! - `swap_monitor_scans_total` - Counter of expiry monitor scans
//! - `swap_monitor_candidates` - Gauge of candidates found by the last scan

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Orders created, labeled by source and destination chain
    pub static ref ORDERS_CREATED: IntCounterVec = register_int_counter_vec!(
        "swap_orders_created_total",
        "Total number of swap orders created",
        &["from", "to"]
    )
    .expect("Failed to create ORDERS_CREATED metric");

    /// Status transitions, labeled by target status
    pub static ref STATUS_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "swap_status_transitions_total",
        "Total number of swap status transitions",
        &["status"]
    )
    .expect("Failed to create STATUS_TRANSITIONS metric");

    /// Adapter errors, labeled by chain and error kind
    pub static ref ADAPTER_ERRORS: IntCounterVec = register_int_counter_vec!(
        "swap_adapter_errors_total",
        "Total number of chain adapter errors",
        &["chain", "kind"]
    )
    .expect("Failed to create ADAPTER_ERRORS metric");

    /// Retries of transient failures, labeled by chain and operation
    pub static ref ADAPTER_RETRIES: IntCounterVec = register_int_counter_vec!(
        "swap_adapter_retries_total",
        "Total number of chain adapter retries",
        &["chain", "operation"]
    )
    .expect("Failed to create ADAPTER_RETRIES metric");

    /// Confirmed leg refunds, labeled by chain
    pub static ref REFUNDS: IntCounterVec = register_int_counter_vec!(
        "swap_refunds_total",
        "Total number of confirmed leg refunds",
        &["chain"]
    )
    .expect("Failed to create REFUNDS metric");

    /// Orders failed on an invariant violation
    pub static ref INVARIANT_VIOLATIONS: IntCounter = register_int_counter!(
        "swap_invariant_violations_total",
        "Total number of orders failed on an invariant violation"
    )
    .expect("Failed to create INVARIANT_VIOLATIONS metric");

    /// Expiry monitor scans
    pub static ref MONITOR_SCANS: IntCounter = register_int_counter!(
        "swap_monitor_scans_total",
        "Total number of expiry monitor scans"
    )
    .expect("Failed to create MONITOR_SCANS metric");

    /// Candidates found by the last scan
    pub static ref MONITOR_CANDIDATES: IntGauge = register_int_gauge!(
        "swap_monitor_candidates",
        "Number of expiry candidates found by the last monitor scan"
    )
    .expect("Failed to create MONITOR_CANDIDATES metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Record an order created
#[cfg(feature = "metrics")]
pub fn record_order_created(from: &str, to: &str) {
    ORDERS_CREATED.with_label_values(&[from, to]).inc();
}

/// Record a status transition
#[cfg(feature = "metrics")]
pub fn record_transition(status: &str) {
    STATUS_TRANSITIONS.with_label_values(&[status]).inc();
}

/// Record an adapter error
#[cfg(feature = "metrics")]
pub fn record_adapter_error(chain: &str, kind: &str) {
    ADAPTER_ERRORS.with_label_values(&[chain, kind]).inc();
}

/// Record a retry of a transient failure
#[cfg(feature = "metrics")]
pub fn record_retry(chain: &str, operation: &str) {
    ADAPTER_RETRIES.with_label_values(&[chain, operation]).inc();
}

/// Record a confirmed refund
#[cfg(feature = "metrics")]
pub fn record_refund(chain: &str) {
    REFUNDS.with_label_values(&[chain]).inc();
}

/// Record an invariant violation
#[cfg(feature = "metrics")]
pub fn record_invariant_violation() {
    INVARIANT_VIOLATIONS.inc();
}

/// Record a monitor scan and its candidate count
#[cfg(feature = "metrics")]
pub fn record_monitor_scan(candidates: usize) {
    MONITOR_SCANS.inc();
    MONITOR_CANDIDATES.set(candidates as i64);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_order_created(_from: &str, _to: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_transition(_status: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_adapter_error(_chain: &str, _kind: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_retry(_chain: &str, _operation: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_refund(_chain: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_invariant_violation() {}

#[cfg(not(feature = "metrics"))]
pub fn record_monitor_scan(_candidates: usize) {}
