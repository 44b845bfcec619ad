//! # Inbound Ports (Driving Ports)
//!
//! Order submission API exposed to callers such as a CLI or web backend.

use async_trait::async_trait;

use crate::domain::{Amount, AssetId, ChainId, SecureSecret, SwapId, SwapOrder, SwapResult, SwapStatus};

/// Parameters of a new swap.
#[derive(Clone, Debug)]
pub struct CreateSwapRequest {
    /// Chain the user pays on.
    pub from_chain: ChainId,
    /// Chain the user receives on.
    pub to_chain: ChainId,
    /// Asset the user pays.
    pub from_asset: AssetId,
    /// Asset the user receives.
    pub to_asset: AssetId,
    /// Amount locked on the source leg.
    pub amount: Amount,
    /// Amount locked on the destination leg; defaults to `amount`.
    pub to_amount: Option<Amount>,
    /// User's address on the source chain (source depositor).
    pub user_address: String,
    /// Address receiving the destination asset (destination claimer).
    pub counterparty_address: String,
    /// Explicit `(src, dst)` timelocks; calculated when absent.
    pub timelocks: Option<(u64, u64)>,
    /// Caller-supplied preimage; generated when absent.
    pub secret: Option<SecureSecret>,
}

impl CreateSwapRequest {
    /// Request with generated secret and calculated timelocks.
    pub fn new(
        from_chain: ChainId,
        to_chain: ChainId,
        amount: Amount,
        user_address: impl Into<String>,
        counterparty_address: impl Into<String>,
    ) -> Self {
        Self {
            from_chain,
            to_chain,
            from_asset: AssetId::Native,
            to_asset: AssetId::Native,
            amount,
            to_amount: None,
            user_address: user_address.into(),
            counterparty_address: counterparty_address.into(),
            timelocks: None,
            secret: None,
        }
    }

    /// Set the destination amount.
    pub fn with_to_amount(mut self, amount: Amount) -> Self {
        self.to_amount = Some(amount);
        self
    }

    /// Set explicit timelocks.
    pub fn with_timelocks(mut self, src: u64, dst: u64) -> Self {
        self.timelocks = Some((src, dst));
        self
    }

    /// Use a caller-supplied secret.
    pub fn with_secret(mut self, secret: SecureSecret) -> Self {
        self.secret = Some(secret);
        self
    }
}

/// Primary API for swap callers.
#[async_trait]
pub trait SwapApi: Send + Sync {
    /// Validate, generate the secret and persist a new order in `Created`.
    async fn create_swap(&self, request: CreateSwapRequest) -> SwapResult<SwapOrder>;

    /// Current state of an order.
    async fn get_swap(&self, id: SwapId) -> SwapResult<SwapOrder>;

    /// Orders, optionally filtered by status.
    async fn list_swaps(&self, status: Option<SwapStatus>) -> SwapResult<Vec<SwapOrder>>;

    /// Cancel an order that has not locked any funds.
    async fn cancel_swap(&self, id: SwapId) -> SwapResult<SwapOrder>;

    /// Whether a chain has a registered adapter.
    fn is_chain_supported(&self, chain: ChainId) -> bool;
}
