//! Per-order locks shared by the coordinator and the expiry monitor.
//!
//! A guard is held for a whole state-machine step, including adapter awaits,
//! so it is a `tokio` mutex. The coordinator waits for it; the monitor only
//! tries and skips busy orders.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::domain::SwapId;

/// Guard proving exclusive access to one order.
pub type OrderGuard = OwnedMutexGuard<()>;

/// Lock table keyed by order id.
#[derive(Clone, Default)]
pub struct OrderLocks {
    inner: Arc<Mutex<HashMap<SwapId, Arc<AsyncMutex<()>>>>>,
}

impl OrderLocks {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: SwapId) -> Arc<AsyncMutex<()>> {
        self.inner
            .lock()
            .entry(id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Wait for exclusive access.
    pub async fn lock(&self, id: SwapId) -> OrderGuard {
        self.entry(id).lock_owned().await
    }

    /// Exclusive access if nobody holds it right now.
    pub fn try_lock(&self, id: SwapId) -> Option<OrderGuard> {
        self.entry(id).try_lock_owned().ok()
    }

    /// Drop entries nobody holds or waits on.
    pub fn prune(&self) {
        self.inner
            .lock()
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    /// Number of tracked orders.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether no order is tracked.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
