//! # Retry Layer
//!
//! Bounded exponential backoff for transient chain failures, applied once
//! around any [`ChainAdapter`].
//!
//! Only `Unavailable` and `RateLimited` are retried. Deterministic rejections
//! pass straight through so the coordinator can map them to a transition.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::{debug, warn};

use crate::domain::{
    AdapterError, Amount, AssetId, ChainId, DepositInfo, DepositRef, Hashlock, SecureSecret, TxRef,
};
use crate::metrics;
use crate::ports::outbound::ChainAdapter;

/// Backoff parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// First delay.
    pub base_delay: Duration,
    /// Upper bound on the exponential part of a delay.
    pub max_delay: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Random extra delay, drawn uniformly from `0..=max_jitter`.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1_500),
            max_delay: Duration::from_secs(45),
            max_retries: 6,
            max_jitter: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Policy without waiting, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            max_retries,
            max_jitter: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.backoff(attempt) + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails deterministically or runs out of retries.
    ///
    /// Exhausted retries surface as `Unavailable` carrying the last message.
    pub async fn run<T, F, Fut>(&self, chain: ChainId, name: &'static str, mut op: F) -> Result<T, AdapterError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdapterError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.jittered(attempt);
                    debug!(
                        chain = %chain,
                        operation = name,
                        attempt = attempt + 1,
                        "[swap] Transient failure ({}), retrying in {:?}",
                        err,
                        delay
                    );
                    metrics::record_retry(chain.name(), name);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        chain = %chain,
                        operation = name,
                        "[swap] Giving up after {} retries: {}",
                        attempt,
                        err
                    );
                    metrics::record_adapter_error(chain.name(), err.kind());
                    let message = match err {
                        AdapterError::Unavailable(m) | AdapterError::RateLimited(m) => m,
                        other => other.to_string(),
                    };
                    return Err(AdapterError::Unavailable(message));
                }
                Err(err) => {
                    metrics::record_adapter_error(chain.name(), err.kind());
                    return Err(err);
                }
            }
        }
    }
}

/// Decorator adding [`RetryPolicy`] to every call of an inner adapter.
pub struct RetryingAdapter<A> {
    inner: A,
    policy: RetryPolicy,
}

impl<A: ChainAdapter> RetryingAdapter<A> {
    /// Wrap `inner` with the default policy.
    pub fn new(inner: A) -> Self {
        Self::with_policy(inner, RetryPolicy::default())
    }

    /// Wrap `inner` with a custom policy.
    pub fn with_policy(inner: A, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped adapter.
    pub fn inner(&self) -> &A {
        &self.inner
    }
}

#[async_trait]
impl<A: ChainAdapter> ChainAdapter for RetryingAdapter<A> {
    fn chain(&self) -> ChainId {
        self.inner.chain()
    }

    fn deposit_ref(&self, hashlock: &Hashlock) -> DepositRef {
        self.inner.deposit_ref(hashlock)
    }

    fn supports_asset(&self, asset: &AssetId) -> bool {
        self.inner.supports_asset(asset)
    }

    async fn deposit(
        &self,
        claimer: &str,
        amount: Amount,
        hashlock: &Hashlock,
        expiry: u64,
    ) -> Result<TxRef, AdapterError> {
        self.policy
            .run(self.chain(), "deposit", || {
                self.inner.deposit(claimer, amount, hashlock, expiry)
            })
            .await
    }

    async fn claim(&self, deposit: &DepositRef, secret: &SecureSecret) -> Result<TxRef, AdapterError> {
        self.policy
            .run(self.chain(), "claim", || self.inner.claim(deposit, secret))
            .await
    }

    async fn refund(&self, deposit: &DepositRef) -> Result<TxRef, AdapterError> {
        self.policy
            .run(self.chain(), "refund", || self.inner.refund(deposit))
            .await
    }

    async fn get_deposit(&self, deposit: &DepositRef) -> Result<DepositInfo, AdapterError> {
        self.policy
            .run(self.chain(), "get_deposit", || self.inner.get_deposit(deposit))
            .await
    }

    async fn wait_for_confirmation(&self, tx: &TxRef, timeout: Duration) -> Result<(), AdapterError> {
        self.policy
            .run(self.chain(), "wait_for_confirmation", || {
                self.inner.wait_for_confirmation(tx, timeout)
            })
            .await
    }
}
