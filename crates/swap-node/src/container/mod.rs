//! # Node Container
//!
//! Wires the swap core together from a [`NodeConfig`] and owns the
//! background tasks.
//!
//! ## Startup Order
//!
//! ```text
//! 1. Create data dir, take the LOCK file
//! 2. Open the order store (file or RocksDB)
//! 3. Build one adapter per chain, wrapped in RetryingAdapter
//! 4. Build the coordinator; derive the expiry monitor from it
//! 5. start(): resume open orders, spawn supervisor, monitor, metrics writer
//! ```

pub mod config;

pub use config::{NodeConfig, NodeConfigError, StorageBackend};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use swap_core::adapters::{
    DatabaseLock, FileBackedKVStore, KvOrderStore, Ledger, LedgerAdapter, LockError,
    RetryingAdapter, SystemTimeSource,
};
use swap_core::{
    AdapterError, AdapterKind, ChainAdapter, ChainConfig, ChainId, CreateSwapRequest,
    ExpiryMonitor, OrderStore, StoreError, SwapApi, SwapCoordinator, SwapError, SwapOrder,
    SwapResult,
    TimeSource,
};
use swap_telemetry::TelemetryError;

/// How long shutdown waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Node errors.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Bad configuration.
    #[error(transparent)]
    Config(#[from] NodeConfigError),

    /// Data directory is locked by another process.
    #[error(transparent)]
    Lock(#[from] LockError),

    /// Order store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Chain adapter could not be built.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Order listing failed.
    #[error(transparent)]
    Swap(#[from] SwapError),

    /// Telemetry export failed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration asks for something this build does not include.
    #[error("{what} requires the `{feature}` feature")]
    FeatureDisabled {
        /// What was requested
        what: String,
        /// Cargo feature to enable
        feature: &'static str,
    },
}

/// A running (or ready to run) swap node.
pub struct SwapNode {
    config: NodeConfig,
    coordinator: Arc<SwapCoordinator>,
    monitor: ExpiryMonitor,
    ledgers: HashMap<ChainId, Arc<Ledger>>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    _lock: DatabaseLock,
}

impl SwapNode {
    /// Build a node on the system clock.
    pub fn build(config: NodeConfig) -> Result<Self, NodeError> {
        Self::build_with_clock(config, Arc::new(SystemTimeSource))
    }

    /// Build a node with an injected clock.
    pub fn build_with_clock(
        config: NodeConfig,
        clock: Arc<dyn TimeSource>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        std::fs::create_dir_all(&config.data_dir)?;
        let lock = DatabaseLock::acquire(&config.data_dir)?;
        info!("[swap] Data directory locked: {}", config.data_dir.display());

        let store = open_store(&config)?;

        let mut ledgers = HashMap::new();
        let mut builder = SwapCoordinator::builder(config.swap.clone(), store, clock.clone());
        for chain in &config.chains {
            let adapter = build_adapter(chain, &clock, &mut ledgers)?;
            builder = builder.chain(chain.clone(), adapter);
            info!(chain = %chain.chain, "[swap] Registered {:?} adapter", chain.adapter);
        }
        for (chain, account, amount) in &config.ledger_funding {
            match ledgers.get(chain) {
                Some(ledger) => ledger.fund(account, *amount),
                None => warn!(chain = %chain, "[swap] Funding ignored, chain is not ledger-backed"),
            }
        }

        let coordinator = Arc::new(builder.build().map_err(NodeConfigError::from)?);
        let monitor = coordinator.monitor();
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            coordinator,
            monitor,
            ledgers,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
            _lock: lock,
        })
    }

    /// Resume open orders and spawn the background tasks.
    pub async fn start(&self) -> Result<(), NodeError> {
        info!("===========================================");
        info!("  Atomic Swap Node v{}", swap_core::VERSION);
        info!("===========================================");

        let resumed = self.coordinator.resume_open_orders()?;
        info!("[swap] {} open order(s) resumed", resumed);

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(
            Arc::clone(&self.coordinator).run(self.shutdown_tx.subscribe()),
        ));
        tasks.push(tokio::spawn(
            self.monitor.clone().run(self.shutdown_tx.subscribe()),
        ));
        if let Some(path) = self.config.metrics_file.clone() {
            tasks.push(tokio::spawn(metrics_writer(
                Arc::clone(&self.coordinator),
                path,
                self.config.swap.monitor_interval,
                self.shutdown_tx.subscribe(),
            )));
        }
        drop(tasks);

        swap_telemetry::NODE_START_TIME.set(SystemTimeSource.now() as i64);
        info!("[swap] Chains: {}", self.chain_names());
        info!("[swap] Data Dir: {}", self.config.data_dir.display());
        Ok(())
    }

    /// Create an order and start driving it right away.
    pub async fn submit(&self, request: CreateSwapRequest) -> SwapResult<SwapOrder> {
        let order = self.coordinator.create_swap(request).await?;
        self.coordinator.spawn(order.id);
        swap_telemetry::log_swap_event!(info, order.id, "[swap] Order accepted", status = %order.status);
        Ok(order)
    }

    /// Stop every task and wait for it, up to a grace period.
    pub async fn shutdown(&self) {
        info!("[swap] Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);
        self.coordinator.shutdown();

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("[swap] Background task did not stop in {:?}", SHUTDOWN_GRACE);
            }
        }
        info!("[swap] Shutdown complete");
    }

    /// Order submission API.
    pub fn api(&self) -> Arc<dyn SwapApi> {
        self.coordinator.clone()
    }

    /// The coordinator.
    pub fn coordinator(&self) -> &Arc<SwapCoordinator> {
        &self.coordinator
    }

    /// The expiry monitor.
    pub fn monitor(&self) -> &ExpiryMonitor {
        &self.monitor
    }

    /// In-process ledger for a ledger-backed chain.
    pub fn ledger(&self, chain: ChainId) -> Option<&Arc<Ledger>> {
        self.ledgers.get(&chain)
    }

    /// Configuration the node was built with.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn chain_names(&self) -> String {
        self.config
            .chains
            .iter()
            .map(|c| c.chain.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn open_store(config: &NodeConfig) -> Result<Arc<dyn OrderStore>, NodeError> {
    let path = config.store_path();
    match config.storage {
        StorageBackend::File => Ok(Arc::new(KvOrderStore::new(FileBackedKVStore::open(path)?))),
        #[cfg(feature = "rocksdb")]
        StorageBackend::RocksDb => Ok(Arc::new(KvOrderStore::new(
            crate::adapters::storage::RocksDbStore::open_default(path)?,
        ))),
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::RocksDb => Err(NodeError::FeatureDisabled {
            what: "RocksDB storage".into(),
            feature: "rocksdb",
        }),
    }
}

fn build_adapter(
    chain: &ChainConfig,
    clock: &Arc<dyn TimeSource>,
    ledgers: &mut HashMap<ChainId, Arc<Ledger>>,
) -> Result<Arc<dyn ChainAdapter>, NodeError> {
    match chain.adapter {
        AdapterKind::Ledger => {
            let ledger = Arc::new(Ledger::new(chain.chain, clock.clone()));
            ledgers.insert(chain.chain, ledger.clone());
            let adapter = LedgerAdapter::new(ledger, chain.resolver_address.clone());
            Ok(Arc::new(RetryingAdapter::new(adapter)))
        }
        #[cfg(feature = "evm")]
        AdapterKind::Evm => {
            let adapter = swap_core::adapters::EvmHtlcAdapter::from_config(chain)?;
            Ok(Arc::new(RetryingAdapter::new(adapter)))
        }
        #[cfg(not(feature = "evm"))]
        AdapterKind::Evm => Err(NodeError::FeatureDisabled {
            what: format!("EVM adapter for {}", chain.chain),
            feature: "evm",
        }),
    }
}

/// Write a Prometheus text snapshot every `interval` until shutdown.
async fn metrics_writer(
    coordinator: Arc<SwapCoordinator>,
    path: std::path::PathBuf,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if let Err(e) = write_metrics(&coordinator, &path).await {
                    warn!("[swap] Could not write metrics to {}: {}", path.display(), e);
                }
            }
        }
    }
}

/// Refresh node gauges and write the snapshot atomically.
pub async fn write_metrics(coordinator: &SwapCoordinator, path: &Path) -> Result<(), NodeError> {
    let _timer = swap_telemetry::time_histogram!(swap_telemetry::METRICS_WRITE_DURATION);
    if let Ok(orders) = coordinator.list_swaps(None).await {
        let open = orders.iter().filter(|o| !o.status.is_terminal()).count();
        swap_telemetry::OPEN_ORDERS.set(open as i64);
    }
    swap_telemetry::ACTIVE_DRIVERS.set(coordinator.active_drivers() as i64);

    let text = swap_telemetry::encode_metrics()?;
    let tmp = path.with_extension("prom.tmp");
    tokio::fs::write(&tmp, text).await?;
    tokio::fs::rename(&tmp, path).await?;
    swap_telemetry::METRICS_WRITES.inc();
    Ok(())
}
