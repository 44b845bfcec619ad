//! # In-Process HTLC Ledger
//!
//! A complete HTLC escrow with balances, run inside the node. Used for local
//! development networks and by every test; it enforces the same rules an
//! escrow contract does, so a coordinator bug shows up as a rejected call or
//! a wrong balance.
//!
//! One [`Ledger`] models one chain. Any number of [`LedgerAdapter`]s share it,
//! one per signing account.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::encoding::deposit_ref_for;
use crate::domain::{
    canonical_hash, AdapterError, Amount, ChainId, DepositInfo, DepositRef, DepositState, Hashlock,
    SecureSecret, TxRef,
};
use crate::ports::outbound::{ChainAdapter, TimeSource};

/// Operations a fault can be injected into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LedgerOp {
    /// `deposit`
    Deposit,
    /// `claim`
    Claim,
    /// `refund`
    Refund,
    /// `get_deposit`
    GetDeposit,
    /// `wait_for_confirmation`
    WaitForConfirmation,
}

#[derive(Clone, Debug)]
struct Escrow {
    depositor: String,
    claimer: String,
    amount: Amount,
    hashlock: Hashlock,
    expiry: u64,
    state: DepositState,
    deposit_tx: TxRef,
    claim_tx: Option<TxRef>,
    refund_tx: Option<TxRef>,
    revealed_secret: Option<SecureSecret>,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<String, Amount>,
    escrows: HashMap<DepositRef, Escrow>,
    // tx ref -> confirmed
    txs: HashMap<TxRef, bool>,
    nonce: u64,
    faults: VecDeque<(LedgerOp, AdapterError)>,
    calls: HashMap<LedgerOp, u64>,
    manual_confirmations: bool,
}

/// Shared state of one in-process chain.
pub struct Ledger {
    chain: ChainId,
    clock: Arc<dyn TimeSource>,
    state: RwLock<LedgerState>,
}

impl Ledger {
    /// Empty ledger for `chain` reading time from `clock`.
    pub fn new(chain: ChainId, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            chain,
            clock,
            state: RwLock::new(LedgerState::default()),
        }
    }

    /// Chain this ledger models.
    pub fn chain(&self) -> ChainId {
        self.chain
    }

    /// Credit an account.
    pub fn fund(&self, account: &str, amount: Amount) {
        let mut state = self.state.write();
        let balance = state.balances.entry(account.to_string()).or_default();
        *balance = balance.saturating_add(amount);
    }

    /// Current balance of an account.
    pub fn balance(&self, account: &str) -> Amount {
        self.state
            .read()
            .balances
            .get(account)
            .copied()
            .unwrap_or_default()
    }

    /// Escrow snapshot, if one exists.
    pub fn escrow(&self, deposit: &DepositRef) -> Option<DepositInfo> {
        self.state
            .read()
            .escrows
            .get(deposit)
            .map(|e| Self::info(deposit, e))
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: LedgerOp, error: AdapterError) {
        self.fail_times(op, error, 1);
    }

    /// Make the next `times` calls of `op` fail with `error`.
    pub fn fail_times(&self, op: LedgerOp, error: AdapterError, times: usize) {
        let mut state = self.state.write();
        for _ in 0..times {
            state.faults.push_back((op, error.clone()));
        }
    }

    /// How many times `op` was called, including failed calls.
    pub fn call_count(&self, op: LedgerOp) -> u64 {
        self.state.read().calls.get(&op).copied().unwrap_or(0)
    }

    /// Hold transactions unconfirmed until [`confirm_all`](Self::confirm_all).
    pub fn set_manual_confirmations(&self, manual: bool) {
        self.state.write().manual_confirmations = manual;
    }

    /// Confirm every pending transaction.
    pub fn confirm_all(&self) {
        for confirmed in self.state.write().txs.values_mut() {
            *confirmed = true;
        }
    }

    /// Whether a transaction is known and confirmed.
    pub fn is_confirmed(&self, tx: &TxRef) -> bool {
        self.state.read().txs.get(tx).copied().unwrap_or(false)
    }

    fn begin(&self, op: LedgerOp) -> Result<(), AdapterError> {
        let mut state = self.state.write();
        *state.calls.entry(op).or_default() += 1;
        if let Some(pos) = state.faults.iter().position(|(o, _)| *o == op) {
            if let Some((_, err)) = state.faults.remove(pos) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn info(deposit: &DepositRef, escrow: &Escrow) -> DepositInfo {
        DepositInfo {
            deposit_ref: deposit.clone(),
            depositor: escrow.depositor.clone(),
            claimer: escrow.claimer.clone(),
            amount: escrow.amount,
            hashlock: escrow.hashlock,
            expiry: escrow.expiry,
            state: escrow.state,
            claim_tx: escrow.claim_tx.clone(),
            refund_tx: escrow.refund_tx.clone(),
            revealed_secret: escrow.revealed_secret.clone(),
        }
    }

    fn record_tx(&self, state: &mut LedgerState, kind: &str, deposit: &DepositRef) -> TxRef {
        state.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.chain.name().as_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(deposit.0.as_bytes());
        hasher.update(state.nonce.to_le_bytes());
        let tx = TxRef(format!("0x{}", hex::encode(hasher.finalize())));
        let confirmed = !state.manual_confirmations;
        state.txs.insert(tx.clone(), confirmed);
        tx
    }
}

/// [`ChainAdapter`] signing as one account on a [`Ledger`].
#[derive(Clone)]
pub struct LedgerAdapter {
    ledger: Arc<Ledger>,
    signer: String,
    poll_interval: Duration,
}

impl LedgerAdapter {
    /// Adapter acting as `signer`.
    pub fn new(ledger: Arc<Ledger>, signer: impl Into<String>) -> Self {
        Self {
            ledger,
            signer: signer.into(),
            poll_interval: Duration::from_millis(10),
        }
    }

    /// Shared ledger.
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Signing account.
    pub fn signer(&self) -> &str {
        &self.signer
    }
}

#[async_trait]
impl ChainAdapter for LedgerAdapter {
    fn chain(&self) -> ChainId {
        self.ledger.chain
    }

    fn deposit_ref(&self, hashlock: &Hashlock) -> DepositRef {
        deposit_ref_for(self.ledger.chain, hashlock)
    }

    async fn deposit(
        &self,
        claimer: &str,
        amount: Amount,
        hashlock: &Hashlock,
        expiry: u64,
    ) -> Result<TxRef, AdapterError> {
        self.ledger.begin(LedgerOp::Deposit)?;
        if amount.is_zero() {
            return Err(AdapterError::Rejected("deposit amount must be positive".into()));
        }
        if claimer.trim().is_empty() {
            return Err(AdapterError::Rejected("claimer address is empty".into()));
        }
        let now = self.ledger.clock.now();
        if expiry <= now {
            return Err(AdapterError::Rejected(format!(
                "expiry {} is not in the future (now {})",
                expiry, now
            )));
        }

        let deposit = self.deposit_ref(hashlock);
        let mut state = self.ledger.state.write();

        if let Some(existing) = state.escrows.get(&deposit) {
            let same = existing.amount == amount
                && existing.expiry == expiry
                && existing.claimer.eq_ignore_ascii_case(claimer);
            if same {
                debug!(
                    "[swap] {} deposit {} already exists, returning original tx",
                    self.ledger.chain,
                    hashlock.short()
                );
                return Ok(existing.deposit_tx.clone());
            }
            return Err(AdapterError::DepositMismatch(format!(
                "{} already holds a deposit for {} with different parameters",
                self.ledger.chain, hashlock
            )));
        }

        let available = state.balances.get(&self.signer).copied().unwrap_or_default();
        if available < amount {
            return Err(AdapterError::InsufficientBalance {
                needed: amount.to_string(),
                available: available.to_string(),
            });
        }
        state.balances.insert(self.signer.clone(), available - amount);

        let tx = self.ledger.record_tx(&mut state, "deposit", &deposit);
        state.escrows.insert(
            deposit,
            Escrow {
                depositor: self.signer.clone(),
                claimer: claimer.to_string(),
                amount,
                hashlock: *hashlock,
                expiry,
                state: DepositState::Locked,
                deposit_tx: tx.clone(),
                claim_tx: None,
                refund_tx: None,
                revealed_secret: None,
            },
        );

        info!(
            "[swap] {} locked {} for {} under {}",
            self.ledger.chain,
            amount,
            claimer,
            hashlock.short()
        );
        Ok(tx)
    }

    async fn claim(&self, deposit: &DepositRef, secret: &SecureSecret) -> Result<TxRef, AdapterError> {
        self.ledger.begin(LedgerOp::Claim)?;
        let now = self.ledger.clock.now();
        let mut state = self.ledger.state.write();

        let escrow = state
            .escrows
            .get(deposit)
            .ok_or_else(|| AdapterError::NotFound(deposit.clone()))?;
        match escrow.state {
            DepositState::Claimed => return Err(AdapterError::AlreadyClaimed),
            DepositState::Refunded => return Err(AdapterError::AlreadyRefunded),
            DepositState::Locked => {}
        }
        if now > escrow.expiry {
            return Err(AdapterError::Expired);
        }
        if canonical_hash(secret) != escrow.hashlock {
            return Err(AdapterError::InvalidSecret);
        }

        let claimer = escrow.claimer.clone();
        let amount = escrow.amount;
        let tx = self.ledger.record_tx(&mut state, "claim", deposit);
        let balance = state.balances.entry(claimer.clone()).or_default();
        *balance = balance.saturating_add(amount);
        if let Some(escrow) = state.escrows.get_mut(deposit) {
            escrow.state = DepositState::Claimed;
            escrow.claim_tx = Some(tx.clone());
            escrow.revealed_secret = Some(secret.clone());
        }

        info!("[swap] {} deposit {} claimed by {}", self.ledger.chain, deposit, claimer);
        Ok(tx)
    }

    async fn refund(&self, deposit: &DepositRef) -> Result<TxRef, AdapterError> {
        self.ledger.begin(LedgerOp::Refund)?;
        let now = self.ledger.clock.now();
        let mut state = self.ledger.state.write();

        let escrow = state
            .escrows
            .get(deposit)
            .ok_or_else(|| AdapterError::NotFound(deposit.clone()))?;
        match escrow.state {
            DepositState::Claimed => return Err(AdapterError::AlreadyClaimed),
            DepositState::Refunded => return Err(AdapterError::AlreadyRefunded),
            DepositState::Locked => {}
        }
        if now <= escrow.expiry {
            return Err(AdapterError::NotExpired);
        }

        let depositor = escrow.depositor.clone();
        let amount = escrow.amount;
        let tx = self.ledger.record_tx(&mut state, "refund", deposit);
        let balance = state.balances.entry(depositor.clone()).or_default();
        *balance = balance.saturating_add(amount);
        if let Some(escrow) = state.escrows.get_mut(deposit) {
            escrow.state = DepositState::Refunded;
            escrow.refund_tx = Some(tx.clone());
        }

        info!("[swap] {} deposit {} refunded to {}", self.ledger.chain, deposit, depositor);
        Ok(tx)
    }

    async fn get_deposit(&self, deposit: &DepositRef) -> Result<DepositInfo, AdapterError> {
        self.ledger.begin(LedgerOp::GetDeposit)?;
        self.ledger
            .escrow(deposit)
            .ok_or_else(|| AdapterError::NotFound(deposit.clone()))
    }

    async fn wait_for_confirmation(&self, tx: &TxRef, timeout: Duration) -> Result<(), AdapterError> {
        self.ledger.begin(LedgerOp::WaitForConfirmation)?;
        let poll = async {
            loop {
                let confirmed = self.ledger.state.read().txs.get(tx).copied();
                match confirmed {
                    None => return Err(AdapterError::Rejected(format!("unknown transaction {}", tx))),
                    Some(true) => return Ok(()),
                    Some(false) => {}
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };
        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout(tx.to_string())),
        }
    }
}
