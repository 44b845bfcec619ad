//! # Swap Node
//!
//! Long-running host for the swap coordinator.
//!
//! ## Modular Structure
//!
//! - `container/` - Configuration and dependency wiring ([`SwapNode`])
//! - `adapters/` - Storage backends that live outside the core (RocksDB)
//!
//! ## Startup Sequence
//!
//! 1. Load configuration from `SWAP_*` environment variables
//! 2. Reject the in-process ledger when `SWAP_PRODUCTION` is set
//! 3. Lock the data directory and open the order store
//! 4. Register chain adapters, build coordinator and monitor
//! 5. Resume open orders, start background tasks
//! 6. Run until Ctrl+C, then shut down gracefully

pub mod adapters;
pub mod container;

pub use container::{NodeConfig, NodeConfigError, NodeError, StorageBackend, SwapNode};
