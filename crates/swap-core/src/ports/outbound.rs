//! # Outbound Ports (Driven Ports)
//!
//! Dependencies the coordinator requires from the host application.
//!
//! | Port | Production | Testing |
//! |------|------------|---------|
//! | `ChainAdapter` | `EvmHtlcAdapter` (feature `evm`) | `LedgerAdapter` |
//! | `OrderStore` | `KvOrderStore<FileBackedKVStore>` | `KvOrderStore<InMemoryKVStore>` |
//! | `KeyValueStore` | `FileBackedKVStore`, RocksDB in `swap-node` | `InMemoryKVStore` |
//! | `TimeSource` | `SystemTimeSource` | `ManualClock` |

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    AdapterError, Amount, AssetId, ChainId, DepositInfo, DepositRef, Hashlock, SecureSecret,
    StoreError, SwapId, SwapOrder, SwapStatus, TxRef,
};

/// HTLC primitives against one chain's escrow.
///
/// Implementations own signing, fees and address formats. Every method must be
/// safe to call against an unreachable chain: transient failures surface as
/// `Unavailable`/`RateLimited` and are retried by
/// [`RetryingAdapter`](crate::adapters::RetryingAdapter).
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain this adapter talks to.
    fn chain(&self) -> ChainId;

    /// Deterministic deposit identifier for a hashlock.
    fn deposit_ref(&self, hashlock: &Hashlock) -> DepositRef;

    /// Whether the adapter can lock this asset.
    fn supports_asset(&self, asset: &AssetId) -> bool {
        asset.is_native()
    }

    /// Lock `amount` claimable by `claimer` with the secret before `expiry`.
    ///
    /// Idempotent under the same `(hashlock, expiry, amount)`: an existing
    /// matching deposit is success and returns its original transaction.
    async fn deposit(
        &self,
        claimer: &str,
        amount: Amount,
        hashlock: &Hashlock,
        expiry: u64,
    ) -> Result<TxRef, AdapterError>;

    /// Reveal the secret and pay the registered claimer.
    async fn claim(&self, deposit: &DepositRef, secret: &SecureSecret) -> Result<TxRef, AdapterError>;

    /// Return the funds to the depositor after expiry.
    async fn refund(&self, deposit: &DepositRef) -> Result<TxRef, AdapterError>;

    /// Current on-chain state of a deposit.
    async fn get_deposit(&self, deposit: &DepositRef) -> Result<DepositInfo, AdapterError>;

    /// Suspend until the transaction is final or `timeout` elapses.
    async fn wait_for_confirmation(&self, tx: &TxRef, timeout: Duration) -> Result<(), AdapterError>;
}

/// Durable order storage.
///
/// All writes for one order are atomic. `compare_and_swap` is the only way to
/// change a stored order; it fails with `StatusConflict` when the stored status
/// is not the expected one.
pub trait OrderStore: Send + Sync {
    /// Insert a new order and its secret.
    ///
    /// Fails with `DuplicateId` or `HashlockInUse` without writing anything.
    fn insert(&self, order: &SwapOrder, secret: &SecureSecret) -> Result<(), StoreError>;

    /// Load an order.
    fn get(&self, id: SwapId) -> Result<Option<SwapOrder>, StoreError>;

    /// Replace an order if its stored status is still `expected`.
    fn compare_and_swap(&self, expected: SwapStatus, order: &SwapOrder) -> Result<(), StoreError>;

    /// Orders, optionally filtered by status.
    fn list(&self, status: Option<SwapStatus>) -> Result<Vec<SwapOrder>, StoreError>;

    /// Ids whose relevant timelock has elapsed (`timelock < now`).
    fn expiry_candidates(&self, now: u64) -> Result<Vec<SwapId>, StoreError>;

    /// Ids of every non-terminal order (crash recovery).
    fn open_orders(&self) -> Result<Vec<SwapId>, StoreError>;

    /// Secret stored for a hashlock at creation.
    fn load_secret(&self, hashlock: &Hashlock) -> Result<Option<SecureSecret>, StoreError>;
}

/// Abstract key-value database.
pub trait KeyValueStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Put a single key-value pair.
    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Delete a key.
    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError>;

    /// Either all operations are applied or none are.
    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError>;

    /// Check if a key exists.
    fn exists(&self, key: &[u8]) -> Result<bool, StoreError>;

    /// Entries whose key starts with `prefix`.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

/// Batch operation for atomic writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Put a key-value pair.
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Delete a key.
    Delete {
        /// Key
        key: Vec<u8>,
    },
}

impl BatchOperation {
    /// Create a Put operation.
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        BatchOperation::Delete { key: key.into() }
    }
}

/// Wall clock in unix seconds.
pub trait TimeSource: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> u64;
}
