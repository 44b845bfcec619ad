//! # Domain Errors
//!
//! Error taxonomy for the swap core.
//!
//! | Class | Variants | Handling |
//! |-------|----------|----------|
//! | Transient | `Unavailable`, `RateLimited` | Retried with backoff inside the adapter layer |
//! | Deterministic rejection | `InvalidSecret`, `Expired`, `AlreadyClaimed`, ... | Never retried, mapped to a transition |
//! | Invariant violation | `SwapError::InvariantViolation` | Order moves to `Failed`, no chain call |

use thiserror::Error;

use super::value_objects::{ChainId, DepositRef, Hashlock, SwapId, SwapStatus};

/// Errors surfaced by a [`ChainAdapter`](crate::ports::outbound::ChainAdapter).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    /// Chain endpoint unreachable (after retries when returned by the retry layer).
    #[error("Chain unavailable: {0}")]
    Unavailable(String),

    /// Endpoint rate-limited the request.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Transaction was not final before the deadline.
    #[error("Timed out waiting for confirmation of {0}")]
    Timeout(String),

    /// Secret does not hash to the deposit's hashlock.
    #[error("Invalid secret for hashlock")]
    InvalidSecret,

    /// Deposit is past its expiry (claim no longer possible).
    #[error("Deposit expired")]
    Expired,

    /// Deposit has not reached its expiry (refund not yet possible).
    #[error("Deposit not expired (cannot refund)")]
    NotExpired,

    /// Deposit already claimed.
    #[error("Deposit already claimed")]
    AlreadyClaimed,

    /// Deposit already refunded.
    #[error("Deposit already refunded")]
    AlreadyRefunded,

    /// Signer cannot cover the deposit.
    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance {
        /// Amount required
        needed: String,
        /// Amount available
        available: String,
    },

    /// No deposit exists under this reference.
    #[error("Deposit not found: {0}")]
    NotFound(DepositRef),

    /// A deposit exists for the hashlock but with different parameters.
    #[error("Deposit mismatch: {0}")]
    DepositMismatch(String),

    /// Chain rejected the transaction for another reason.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// Adapter configuration is invalid (bad key, bad address, unsupported asset).
    #[error("Adapter misconfigured: {0}")]
    Misconfigured(String),
}

impl AdapterError {
    /// Transient errors worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::RateLimited(_))
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "unavailable",
            Self::RateLimited(_) => "rate_limited",
            Self::Timeout(_) => "timeout",
            Self::InvalidSecret => "invalid_secret",
            Self::Expired => "expired",
            Self::NotExpired => "not_expired",
            Self::AlreadyClaimed => "already_claimed",
            Self::AlreadyRefunded => "already_refunded",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotFound(_) => "not_found",
            Self::DepositMismatch(_) => "deposit_mismatch",
            Self::Rejected(_) => "rejected",
            Self::Misconfigured(_) => "misconfigured",
        }
    }
}

/// Storage errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("I/O error: {message}")]
    Io {
        /// Error message
        message: String,
    },

    /// Record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored data failed an integrity check.
    #[error("Corrupted store: {0}")]
    Corrupted(String),

    /// An order with this id already exists.
    #[error("Duplicate swap id: {0}")]
    DuplicateId(SwapId),

    /// Hashlock already backs an active order on this chain pair.
    #[error("Hashlock {0} already in use")]
    HashlockInUse(Hashlock),

    /// Compare-and-swap lost: status changed underneath.
    #[error("Status conflict for {id}: expected {expected}, found {actual}")]
    StatusConflict {
        /// Order id
        id: SwapId,
        /// Status the writer expected
        expected: SwapStatus,
        /// Status actually stored
        actual: SwapStatus,
    },

    /// Order does not exist.
    #[error("Swap not found: {0}")]
    NotFound(SwapId),
}

/// Errors returned by the coordinator and the order submission API.
#[derive(Debug, Error)]
pub enum SwapError {
    /// Malformed request, rejected before any secret or adapter call.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Chain has no registered adapter.
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(ChainId),

    /// Source and destination chains are identical or otherwise unusable together.
    #[error("Unsupported chain pair: {from} -> {to}")]
    UnsupportedPair {
        /// Source chain
        from: ChainId,
        /// Destination chain
        to: ChainId,
    },

    /// Timelocks violate `dst < src` with the required margin, or are already past.
    #[error("Invalid timelocks: src={src_timelock}, dst={dst_timelock}, required margin={required_margin}s")]
    InvalidTimelocks {
        /// Source leg expiry
        src_timelock: u64,
        /// Destination leg expiry
        dst_timelock: u64,
        /// Required margin in seconds
        required_margin: u64,
    },

    /// Hashlock already backs an active order (conflict).
    #[error("Hashlock {0} already backs an active swap")]
    HashlockInUse(Hashlock),

    /// Order does not exist.
    #[error("Swap not found: {0}")]
    NotFound(SwapId),

    /// Illegal state machine transition.
    #[error("Invalid swap transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: SwapStatus,
        /// Attempted status
        to: SwapStatus,
    },

    /// Cancellation requested after funds may have been locked.
    #[error("Swap {id} cannot be cancelled in status {status}")]
    NotCancellable {
        /// Order id
        id: SwapId,
        /// Current status
        status: SwapStatus,
    },

    /// Refund requested before any leg became refundable.
    #[error("Swap {id} is not refundable yet")]
    NotRefundable {
        /// Order id
        id: SwapId,
    },

    /// Internal consistency check failed.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Chain adapter error.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Storage error.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result alias for coordinator operations.
pub type SwapResult<T> = Result<T, SwapError>;
