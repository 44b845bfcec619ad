//! # Service Layer
//!
//! The swap coordinator (one driver task per order) and the expiry monitor.

pub mod coordinator;
pub mod locks;
pub mod monitor;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChainConfig;
use crate::domain::ChainId;
use crate::ports::outbound::ChainAdapter;

pub use coordinator::{StepOutcome, SwapCoordinator, SwapCoordinatorBuilder};
pub use locks::{OrderGuard, OrderLocks};
pub use monitor::{ExpiryMonitor, MonitorAction, ScanReport};

/// A registered chain: its adapter and settings.
#[derive(Clone)]
pub struct ChainHandle {
    /// Adapter, usually wrapped in a `RetryingAdapter`.
    pub adapter: Arc<dyn ChainAdapter>,
    /// Chain settings.
    pub config: ChainConfig,
}

impl ChainHandle {
    /// Confirmation timeout for this chain.
    pub fn confirmation_timeout(&self, default: Duration) -> Duration {
        self.config.confirmation_timeout.unwrap_or(default)
    }
}

pub(crate) type ChainMap = Arc<HashMap<ChainId, ChainHandle>>;
