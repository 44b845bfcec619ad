//! # Swap Core
//!
//! Coordination core for cross-chain atomic swaps built on hash time-locked
//! contracts (HTLC).
//!
//! **Architecture:** Hexagonal (DDD + Ports/Adapters)
//!
//! ## Purpose
//!
//! Exchange assets between two independent chains without a trusted
//! intermediary:
//! - One secret, one SHA-256 hashlock, two escrows
//! - Destination leg expires before the source leg, with a margin
//! - Secret revealed only after both deposits are confirmed and verified
//! - Expired legs refunded by a background monitor
//!
//! ## Safety Rules
//!
//! | Rule | Enforced in |
//! |------|-------------|
//! | `dst_timelock < src_timelock` with margin | `algorithms::timelocks` |
//! | `H(secret) == hashlock` | `domain::invariants` |
//! | No reveal before both deposits | `service::coordinator` |
//! | On-chain escrow matches the order | `service::coordinator` |
//! | Status changes are compare-and-swap | `ports::outbound::OrderStore` |
//! | Secret never logged | `domain::secure_secret` |
//!
//! ## Module Structure
//!
//! ```text
//! swap-core/
//! ├── domain/          # SwapOrder, SwapStatus, Hashlock, errors, invariants
//! ├── algorithms/      # Secret generation, timelock calculation
//! ├── ports/           # SwapApi, ChainAdapter, OrderStore, KeyValueStore
//! ├── adapters/        # Ledger, EVM, retry, stores, clock, encodings
//! ├── service/         # SwapCoordinator, ExpiryMonitor, order locks
//! ├── config.rs        # SwapConfig, ChainConfig
//! └── metrics.rs       # Prometheus counters (feature `metrics`)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;
pub mod service;

// Re-exports
pub use algorithms::{
    calculate_timelocks, has_time_for, validate_swap_timelocks, SecretManager, Timelocks,
};
pub use config::{AdapterKind, ChainConfig, ConfigError, SwapConfig, TimelockPolicy};
pub use domain::{
    canonical_hash, AdapterError, Amount, AssetId, ChainId, DepositInfo, DepositRef,
    DepositState, FailureReason, Hashlock, Leg, SecureSecret, StoreError, SwapError, SwapId,
    SwapOrder, SwapResult, SwapStatus, TxRef,
};
pub use ports::{ChainAdapter, CreateSwapRequest, KeyValueStore, OrderStore, SwapApi, TimeSource};
pub use service::{
    ExpiryMonitor, MonitorAction, ScanReport, StepOutcome, SwapCoordinator, SwapCoordinatorBuilder,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
