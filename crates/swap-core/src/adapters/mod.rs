//! # Adapters Layer (Hexagonal Architecture)
//!
//! Implementations of the outbound ports: chain adapters, the retry
//! decorator, order storage and time sources.

pub mod clock;
pub mod encoding;
#[cfg(feature = "evm")]
pub mod evm;
pub mod ledger;
#[cfg(feature = "locking")]
pub mod lock;
pub mod order_store;
pub mod retry;
pub mod storage;

pub use clock::{ManualClock, SystemTimeSource};
pub use encoding::{deposit_ref_for, encode_hashlock, normalize_hashlock, HashlockEncoding};
#[cfg(feature = "evm")]
pub use evm::{default_evm_chain_id, EvmHtlcAdapter};
pub use ledger::{Ledger, LedgerAdapter, LedgerOp};
#[cfg(feature = "locking")]
pub use lock::{DatabaseLock, LockError};
pub use order_store::KvOrderStore;
pub use retry::{RetryPolicy, RetryingAdapter};
pub use storage::{FileBackedKVStore, InMemoryKVStore};
