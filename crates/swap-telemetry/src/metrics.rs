//! Node-level Prometheus metrics and text export.
//!
//! Swap metrics themselves live in `swap-core` (feature `metrics`) and are
//! registered with the default registry; [`encode_metrics`] gathers both.
//!
//! All metrics follow the naming convention: `swap_node_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Unix time the node started
    pub static ref NODE_START_TIME: IntGauge = IntGauge::new(
        "swap_node_start_time_seconds",
        "Unix time at which the swap node started"
    ).expect("metric creation failed");

    /// Orders not yet in a terminal status
    pub static ref OPEN_ORDERS: IntGauge = IntGauge::new(
        "swap_node_open_orders",
        "Number of orders not yet in a terminal status"
    ).expect("metric creation failed");

    /// Order driver tasks currently running
    pub static ref ACTIVE_DRIVERS: IntGauge = IntGauge::new(
        "swap_node_active_drivers",
        "Number of running order driver tasks"
    ).expect("metric creation failed");

    /// Metrics snapshots written
    pub static ref METRICS_WRITES: IntCounter = IntCounter::new(
        "swap_node_metrics_writes_total",
        "Total number of metrics snapshots written"
    ).expect("metric creation failed");

    /// Time spent writing a metrics snapshot
    pub static ref METRICS_WRITE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "swap_node_metrics_write_duration_seconds",
            "Time spent writing a metrics snapshot"
        ).buckets(exponential_buckets(0.0001, 2.0, 12).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Proof that node metrics are registered.
pub struct MetricsHandle {
    registered: usize,
}

impl MetricsHandle {
    /// Number of collectors registered by this call.
    pub fn registered(&self) -> usize {
        self.registered
    }
}

/// Register node metrics with the default registry.
///
/// Registering twice is not an error; already-registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(NODE_START_TIME.clone()),
        Box::new(OPEN_ORDERS.clone()),
        Box::new(ACTIVE_DRIVERS.clone()),
        Box::new(METRICS_WRITES.clone()),
        Box::new(METRICS_WRITE_DURATION.clone()),
    ];

    let mut registered = 0;
    for metric in metrics {
        match prometheus::register(metric) {
            Ok(()) => registered += 1,
            Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(MetricsHandle { registered })
}

/// Encode every metric in the default registry as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
