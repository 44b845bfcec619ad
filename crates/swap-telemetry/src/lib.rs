//! # Swap Telemetry
//!
//! Logging and metrics bootstrap for the atomic swap node.
//!
//! ## Components
//!
//! - Structured logs via `tracing-subscriber` (pretty or JSON)
//! - Prometheus metrics, exported as text for a textfile collector
//!
//! ## Usage
//!
//! ```rust,ignore
//! use swap_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("telemetry");
//!     // Logs and metrics are now collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SWAP_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `SWAP_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |
//! | `SWAP_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `SWAP_NETWORK` | `testnet` | Network name in the service name |
//! | `SWAP_SERVICE_NAME` | `atomic-swap` | Service name |

#![warn(missing_docs)]

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{env_filter, init_logging, StructuredLogger};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, ACTIVE_DRIVERS,
    METRICS_WRITES, METRICS_WRITE_DURATION, NODE_START_TIME, OPEN_ORDERS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Global subscriber could not be installed
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    /// Metric registration or encoding failed
    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    /// Configuration value is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Install logging and register node metrics.
///
/// Returns a guard to hold for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logger = init_logging(&config)?;
    Ok(TelemetryGuard {
        service: config.full_service_name(),
        _logger: logger,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service: String,
    _logger: StructuredLogger,
    _metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Service name the guard was initialized with.
    pub fn service(&self) -> &str {
        &self.service
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service, "[swap] Shutting down telemetry");
    }
}
