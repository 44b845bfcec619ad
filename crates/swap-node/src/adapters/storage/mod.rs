//! # Production Storage Adapters
//!
//! ## Usage
//!
//! Enable the `rocksdb` feature to use the RocksDB order store:
//!
//! ```toml
//! swap-node = { path = "...", features = ["rocksdb"] }
//! ```
//!
//! Without it the node uses `swap_core::adapters::FileBackedKVStore`.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

pub use swap_core::adapters::{FileBackedKVStore, InMemoryKVStore};
