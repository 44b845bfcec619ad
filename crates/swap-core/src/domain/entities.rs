//! # Domain Entities
//!
//! `SwapOrder` is the persistent record of one exchange. It is mutated only
//! through the methods below so that status moves and the secret invariant are
//! checked in one place.

use serde::{Deserialize, Serialize};

use super::errors::SwapError;
use super::secure_secret::SecureSecret;
use super::value_objects::{Amount, AssetId, ChainId, Hashlock, Leg, SwapId, SwapStatus, TxRef};

/// Why an order ended in `Failed`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// Cancelled by the caller before any funds were locked.
    Cancelled,
    /// Internal consistency check failed; no further chain calls were made.
    InvariantViolation(String),
    /// Chain rejected an action in a way that cannot be retried.
    Rejected(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::Cancelled => f.write_str("cancelled"),
            FailureReason::InvariantViolation(d) => write!(f, "invariant violation: {}", d),
            FailureReason::Rejected(d) => write!(f, "rejected: {}", d),
        }
    }
}

/// One side of the swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapLeg {
    /// Chain the escrow lives on.
    pub chain: ChainId,
    /// Asset being locked.
    pub asset: AssetId,
    /// Amount in the chain's smallest unit.
    pub amount: Amount,
    /// Address funding the escrow.
    pub depositor: String,
    /// Address allowed to claim with the secret.
    pub claimer: String,
    /// Absolute expiry (unix seconds).
    pub timelock: u64,
    /// Deposit transaction, recorded when broadcast.
    pub deposit_tx: Option<TxRef>,
    /// Claim transaction.
    pub claim_tx: Option<TxRef>,
    /// Refund transaction.
    pub refund_tx: Option<TxRef>,
    /// Leg is settled without a transaction we recorded: the deposit never
    /// landed, or the chain reports it closed but not by which transaction.
    #[serde(default)]
    pub closed_externally: bool,
}

impl SwapLeg {
    /// Funds may still be locked on this leg.
    pub fn is_open(&self) -> bool {
        self.deposit_tx.is_some()
            && self.claim_tx.is_none()
            && self.refund_tx.is_none()
            && !self.closed_externally
    }

    /// Whether the leg's timelock has elapsed (refund possible).
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.timelock
    }
}

/// Persistent record of one atomic swap.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SwapOrder {
    /// Unique identifier.
    pub id: SwapId,
    /// Source leg (user → resolver).
    pub source: SwapLeg,
    /// Destination leg (resolver → user).
    pub destination: SwapLeg,
    /// `H(secret)`.
    pub hashlock: Hashlock,
    /// Present iff status is SecretRevealed, DstClaimed or Completed.
    pub secret: Option<SecureSecret>,
    /// State machine position.
    pub status: SwapStatus,
    /// Set when status is Failed.
    pub failure: Option<FailureReason>,
    /// Most recent adapter error, kept for operators.
    pub last_error: Option<String>,
    /// Creation time (unix seconds).
    pub created_at: u64,
    /// Last mutation time (unix seconds).
    pub updated_at: u64,
}

impl SwapOrder {
    /// Source chain.
    pub fn from_chain(&self) -> ChainId {
        self.source.chain
    }

    /// Destination chain.
    pub fn to_chain(&self) -> ChainId {
        self.destination.chain
    }

    /// Borrow a leg.
    pub fn leg(&self, leg: Leg) -> &SwapLeg {
        match leg {
            Leg::Source => &self.source,
            Leg::Destination => &self.destination,
        }
    }

    /// Borrow a leg mutably.
    pub fn leg_mut(&mut self, leg: Leg) -> &mut SwapLeg {
        match leg {
            Leg::Source => &mut self.source,
            Leg::Destination => &mut self.destination,
        }
    }

    /// Move along the state machine.
    ///
    /// Leaving the secret-bearing statuses clears `secret`; entering them
    /// without a secret is an invariant violation.
    pub fn transition_to(&mut self, next: SwapStatus, now: u64) -> Result<(), SwapError> {
        if !self.status.can_transition_to(next) {
            return Err(SwapError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        if next.reveals_secret() && self.secret.is_none() {
            return Err(SwapError::InvariantViolation(format!(
                "{} requires a revealed secret",
                next
            )));
        }
        if !next.reveals_secret() {
            self.secret = None;
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Record the destination claim carrying the secret.
    pub fn reveal_secret(
        &mut self,
        secret: SecureSecret,
        claim_tx: TxRef,
        now: u64,
    ) -> Result<(), SwapError> {
        if self.status != SwapStatus::DstDeposited {
            return Err(SwapError::InvalidTransition {
                from: self.status,
                to: SwapStatus::SecretRevealed,
            });
        }
        self.secret = Some(secret);
        self.destination.claim_tx = Some(claim_tx);
        self.transition_to(SwapStatus::SecretRevealed, now)
    }

    /// Move to `Failed` with a reason.
    pub fn fail(&mut self, reason: FailureReason, now: u64) -> Result<(), SwapError> {
        self.transition_to(SwapStatus::Failed, now)?;
        self.failure = Some(reason);
        Ok(())
    }

    /// Remember the last adapter error.
    pub fn record_error(&mut self, error: impl std::fmt::Display, now: u64) {
        self.last_error = Some(error.to_string());
        self.updated_at = now;
    }

    /// Timelock the expiry monitor watches for the current status.
    ///
    /// `None` for statuses the monitor never touches.
    pub fn relevant_timelock(&self) -> Option<u64> {
        match self.status {
            SwapStatus::Created | SwapStatus::SrcDeposited => Some(self.source.timelock),
            SwapStatus::DstDeposited => Some(self.destination.timelock),
            // secret is public: the source is claimable now, not at its expiry
            SwapStatus::Refunding if self.destination_claimed() && self.source.is_open() => {
                Some(self.destination.timelock)
            }
            SwapStatus::Refunding => [&self.destination, &self.source]
                .iter()
                .filter(|leg| leg.is_open())
                .map(|leg| leg.timelock)
                .min()
                .or(Some(self.source.timelock)),
            _ => None,
        }
    }

    /// The destination deposit was paid out to the user.
    pub fn destination_claimed(&self) -> bool {
        self.destination.claim_tx.is_some()
    }

    /// Every leg that ever received a deposit is closed.
    pub fn all_legs_closed(&self) -> bool {
        !self.source.is_open() && !self.destination.is_open()
    }
}

/// Builder for [`SwapOrder`].
#[derive(Clone, Debug)]
pub struct SwapOrderBuilder {
    id: SwapId,
    hashlock: Hashlock,
    created_at: u64,
    source: Option<SwapLeg>,
    destination: Option<SwapLeg>,
}

impl SwapOrderBuilder {
    /// Start a builder with a fresh id.
    pub fn new(hashlock: Hashlock, created_at: u64) -> Self {
        Self {
            id: SwapId::new(),
            hashlock,
            created_at,
            source: None,
            destination: None,
        }
    }

    /// Set the source leg.
    pub fn source(mut self, leg: LegParams) -> Self {
        self.source = Some(leg.into_leg());
        self
    }

    /// Set the destination leg.
    pub fn destination(mut self, leg: LegParams) -> Self {
        self.destination = Some(leg.into_leg());
        self
    }

    /// Build the order in `Created`.
    pub fn build(self) -> Result<SwapOrder, SwapError> {
        let source = self
            .source
            .ok_or_else(|| SwapError::InvalidRequest("source leg missing".into()))?;
        let destination = self
            .destination
            .ok_or_else(|| SwapError::InvalidRequest("destination leg missing".into()))?;
        Ok(SwapOrder {
            id: self.id,
            source,
            destination,
            hashlock: self.hashlock,
            secret: None,
            status: SwapStatus::Created,
            failure: None,
            last_error: None,
            created_at: self.created_at,
            updated_at: self.created_at,
        })
    }
}

/// Parameters of one leg at creation time.
#[derive(Clone, Debug)]
pub struct LegParams {
    /// Chain.
    pub chain: ChainId,
    /// Asset.
    pub asset: AssetId,
    /// Amount.
    pub amount: Amount,
    /// Funding address.
    pub depositor: String,
    /// Claiming address.
    pub claimer: String,
    /// Expiry.
    pub timelock: u64,
}

impl LegParams {
    fn into_leg(self) -> SwapLeg {
        SwapLeg {
            chain: self.chain,
            asset: self.asset,
            amount: self.amount,
            depositor: self.depositor,
            claimer: self.claimer,
            timelock: self.timelock,
            deposit_tx: None,
            claim_tx: None,
            refund_tx: None,
            closed_externally: false,
        }
    }
}
