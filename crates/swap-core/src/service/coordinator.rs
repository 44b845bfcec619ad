//! # Swap Coordinator
//!
//! Drives each order through the HTLC state machine, one step at a time.
//!
//! ```text
//! Created ──deposit src, confirm, verify──► SrcDeposited
//! SrcDeposited ──deposit dst, confirm, verify──► DstDeposited
//! DstDeposited ──verify both legs, claim dst with secret──► SecretRevealed
//! SecretRevealed ──confirm dst claim──► DstClaimed
//! DstClaimed ──claim src, confirm──► Completed
//! ```
//!
//! Every step runs under the order's lock and ends in a compare-and-swap on
//! the status. Broadcast transactions are written down before waiting for
//! them, so a restarted node re-confirms instead of re-sending.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::locks::OrderLocks;
use super::monitor::ExpiryMonitor;
use super::{ChainHandle, ChainMap};
use crate::algorithms::{
    calculate_timelocks, has_time_for, validate_swap_timelocks, SecretManager, Timelocks,
};
use crate::config::{ChainConfig, ConfigError, SwapConfig};
use crate::domain::{
    invariant_deposit_matches, invariant_reveal_allowed, AdapterError, ChainId, DepositInfo,
    DepositState, FailureReason, Leg, LegParams, SecureSecret, StoreError, SwapError, SwapId,
    SwapOrder, SwapOrderBuilder, SwapResult, SwapStatus, TxRef,
};
use crate::metrics;
use crate::ports::inbound::{CreateSwapRequest, SwapApi};
use crate::ports::outbound::{ChainAdapter, OrderStore, TimeSource};

/// Result of one [`SwapCoordinator::advance`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// Order moved to a new status.
    Advanced(SwapStatus),
    /// Nothing to do until a confirmation or a transient failure clears.
    Waiting(String),
    /// The coordinator will not move this order; the expiry monitor or an
    /// operator takes over.
    Parked(String),
    /// Order is terminal.
    Terminal(SwapStatus),
    /// Another writer changed the order; try again.
    Busy,
}

/// Builder for [`SwapCoordinator`].
pub struct SwapCoordinatorBuilder {
    config: SwapConfig,
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn TimeSource>,
    chains: Vec<ChainHandle>,
}

impl SwapCoordinatorBuilder {
    /// Register a chain.
    pub fn chain(mut self, config: ChainConfig, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.chains.push(ChainHandle { adapter, config });
        self
    }

    /// Validate the configuration and build.
    pub fn build(self) -> Result<SwapCoordinator, ConfigError> {
        self.config.validate()?;
        let mut chains = HashMap::new();
        for handle in self.chains {
            handle.config.validate()?;
            let chain = handle.config.chain;
            if handle.adapter.chain() != chain {
                return Err(ConfigError::InvalidField {
                    chain,
                    field: "adapter",
                    reason: format!("adapter serves {}", handle.adapter.chain()),
                });
            }
            if chains.insert(chain, handle).is_some() {
                return Err(ConfigError::DuplicateChain(chain));
            }
        }

        let (shutdown_tx, _) = watch::channel(false);
        Ok(SwapCoordinator {
            config: self.config,
            store: self.store,
            clock: self.clock,
            chains: Arc::new(chains),
            secrets: SecretManager::new(),
            locks: OrderLocks::new(),
            drivers: Arc::new(Mutex::new(HashSet::new())),
            parked: Mutex::new(HashSet::new()),
            shutdown_tx,
        })
    }
}

/// Order owner: validates requests, persists orders and drives them.
pub struct SwapCoordinator {
    config: SwapConfig,
    store: Arc<dyn OrderStore>,
    clock: Arc<dyn TimeSource>,
    chains: ChainMap,
    secrets: SecretManager,
    locks: OrderLocks,
    drivers: Arc<Mutex<HashSet<SwapId>>>,
    parked: Mutex<HashSet<SwapId>>,
    shutdown_tx: watch::Sender<bool>,
}

impl SwapCoordinator {
    /// Start building a coordinator.
    pub fn builder(
        config: SwapConfig,
        store: Arc<dyn OrderStore>,
        clock: Arc<dyn TimeSource>,
    ) -> SwapCoordinatorBuilder {
        SwapCoordinatorBuilder {
            config,
            store,
            clock,
            chains: Vec::new(),
        }
    }

    /// Coordinator settings.
    pub fn config(&self) -> &SwapConfig {
        &self.config
    }

    /// Registered chains.
    pub fn chains(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.chains.keys().copied()
    }

    /// Expiry monitor sharing this coordinator's store, adapters and locks.
    pub fn monitor(&self) -> ExpiryMonitor {
        ExpiryMonitor::new(
            self.config.clone(),
            self.store.clone(),
            self.chains.clone(),
            self.clock.clone(),
            self.locks.clone(),
        )
    }

    /// Per-order locks shared with the monitor.
    pub fn locks(&self) -> &OrderLocks {
        &self.locks
    }

    /// Receiver that flips to `true` on [`shutdown`](Self::shutdown).
    pub fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Stop every driver after its current step.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Number of running driver tasks.
    pub fn active_drivers(&self) -> usize {
        self.drivers.lock().len()
    }

    fn now(&self) -> u64 {
        self.clock.now()
    }

    fn handle(&self, chain: ChainId) -> SwapResult<&ChainHandle> {
        self.chains.get(&chain).ok_or(SwapError::UnsupportedChain(chain))
    }

    fn load(&self, id: SwapId) -> SwapResult<SwapOrder> {
        self.store.get(id)?.ok_or(SwapError::NotFound(id))
    }

    /// Persist `order` if the stored status is still `expected`.
    ///
    /// `Ok(false)` when another writer got there first.
    fn cas(&self, expected: SwapStatus, order: &SwapOrder) -> SwapResult<bool> {
        match self.store.compare_and_swap(expected, order) {
            Ok(()) => Ok(true),
            Err(StoreError::StatusConflict { actual, .. }) => {
                debug!(
                    swap_id = %order.id,
                    "[swap] Lost status race: expected {}, found {}",
                    expected,
                    actual
                );
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn move_to(&self, mut order: SwapOrder, next: SwapStatus) -> SwapResult<StepOutcome> {
        order.last_error = None;
        self.persist_transition(order, next)
    }

    /// Like [`move_to`](Self::move_to) but keeps `last_error`.
    fn persist_transition(&self, mut order: SwapOrder, next: SwapStatus) -> SwapResult<StepOutcome> {
        let from = order.status;
        order.transition_to(next, self.now())?;
        if !self.cas(from, &order)? {
            return Ok(StepOutcome::Busy);
        }
        info!(
            swap_id = %order.id,
            status = %next,
            "[swap] {} -> {}",
            from,
            next
        );
        metrics::record_transition(&next.to_string());
        Ok(StepOutcome::Advanced(next))
    }

    /// Record a broadcast transaction without changing the status.
    fn record_tx(&self, order: &mut SwapOrder) -> SwapResult<bool> {
        order.updated_at = self.now();
        self.cas(order.status, order)
    }

    fn violate(&self, mut order: SwapOrder, detail: String) -> SwapResult<StepOutcome> {
        error!(
            swap_id = %order.id,
            status = %order.status,
            invariant = %detail,
            "[swap] Invariant violation, failing order without further chain calls"
        );
        metrics::record_invariant_violation();
        let expected = order.status;
        order.fail(FailureReason::InvariantViolation(detail), self.now())?;
        if !self.cas(expected, &order)? {
            return Ok(StepOutcome::Busy);
        }
        metrics::record_transition(&SwapStatus::Failed.to_string());
        Ok(StepOutcome::Advanced(SwapStatus::Failed))
    }

    /// Deterministic rejection: refund path if funds may be locked, else fail.
    fn reject(&self, mut order: SwapOrder, reason: String) -> SwapResult<StepOutcome> {
        let funded = order.source.deposit_tx.is_some() || order.destination.deposit_tx.is_some();
        if funded && order.status.can_transition_to(SwapStatus::Refunding) {
            warn!(swap_id = %order.id, "[swap] {}; leaving funded legs to the refund path", reason);
            return self.persist_transition(order, SwapStatus::Refunding);
        }
        warn!(swap_id = %order.id, "[swap] {}; failing order", reason);
        let expected = order.status;
        order.fail(FailureReason::Rejected(reason), self.now())?;
        if !self.cas(expected, &order)? {
            return Ok(StepOutcome::Busy);
        }
        metrics::record_transition(&SwapStatus::Failed.to_string());
        Ok(StepOutcome::Advanced(SwapStatus::Failed))
    }

    /// Park with the error recorded on the order.
    fn park(&self, mut order: SwapOrder, reason: String) -> SwapResult<StepOutcome> {
        order.record_error(&reason, self.now());
        self.cas(order.status, &order)?;
        Ok(StepOutcome::Parked(reason))
    }

    fn on_adapter_error(
        &self,
        mut order: SwapOrder,
        leg: Leg,
        action: &str,
        err: AdapterError,
    ) -> SwapResult<StepOutcome> {
        let chain = order.leg(leg).chain;
        warn!(
            swap_id = %order.id,
            chain = %chain,
            status = %order.status,
            "[swap] {} {} failed: {}",
            leg,
            action,
            err
        );
        let reason = format!("{} {} on {}: {}", leg, action, chain, err);
        match err {
            AdapterError::Unavailable(_) | AdapterError::RateLimited(_) | AdapterError::Timeout(_) => {
                order.record_error(&reason, self.now());
                self.cas(order.status, &order)?;
                Ok(StepOutcome::Waiting(reason))
            }
            _ => {
                order.record_error(&reason, self.now());
                self.reject(order, reason)
            }
        }
    }

    async fn confirm(&self, handle: &ChainHandle, tx: &TxRef) -> Result<(), AdapterError> {
        handle
            .adapter
            .wait_for_confirmation(tx, handle.confirmation_timeout(self.config.confirmation_timeout))
            .await
    }

    /// Perform at most one state machine step for an order.
    pub async fn advance(&self, id: SwapId) -> SwapResult<StepOutcome> {
        let _guard = self.locks.lock(id).await;
        let order = self.load(id)?;
        if order.status.is_terminal() {
            return Ok(StepOutcome::Terminal(order.status));
        }
        match order.status {
            SwapStatus::Created => self.step_source_deposit(order).await,
            SwapStatus::SrcDeposited => self.step_destination_deposit(order).await,
            SwapStatus::DstDeposited => self.step_reveal(order).await,
            SwapStatus::SecretRevealed => self.step_destination_claim_confirmed(order).await,
            SwapStatus::DstClaimed => self.step_source_claim(order).await,
            SwapStatus::Refunding => Ok(StepOutcome::Parked("refund in progress".into())),
            terminal => Ok(StepOutcome::Terminal(terminal)),
        }
    }

    async fn step_source_deposit(&self, mut order: SwapOrder) -> SwapResult<StepOutcome> {
        let handle = self.handle(order.from_chain())?;
        let tx = match order.source.deposit_tx.clone() {
            Some(tx) => tx,
            None => {
                let window = self.config.deposit_window_secs + self.config.reveal_window_secs;
                if !has_time_for(self.now(), order.destination.timelock, window) {
                    info!(
                        swap_id = %order.id,
                        "[swap] Destination deadline too close to start, expiring"
                    );
                    return self.move_to(order, SwapStatus::Expired);
                }
                let leg = &order.source;
                match handle
                    .adapter
                    .deposit(&leg.claimer, leg.amount, &order.hashlock, leg.timelock)
                    .await
                {
                    Ok(tx) => {
                        order.source.deposit_tx = Some(tx.clone());
                        if !self.record_tx(&mut order)? {
                            return Ok(StepOutcome::Busy);
                        }
                        info!(
                            swap_id = %order.id,
                            chain = %order.from_chain(),
                            "[swap] Source deposit sent: {}",
                            tx
                        );
                        tx
                    }
                    Err(e) => return self.on_adapter_error(order, Leg::Source, "deposit", e),
                }
            }
        };
        self.confirm_deposit(order, Leg::Source, tx, SwapStatus::SrcDeposited)
            .await
    }

    async fn step_destination_deposit(&self, mut order: SwapOrder) -> SwapResult<StepOutcome> {
        let handle = self.handle(order.to_chain())?;
        let tx = match order.destination.deposit_tx.clone() {
            Some(tx) => tx,
            None => {
                if !has_time_for(
                    self.now(),
                    order.destination.timelock,
                    self.config.deposit_window_secs,
                ) {
                    info!(
                        swap_id = %order.id,
                        "[swap] Deposit window closed before destination deposit"
                    );
                    return self.move_to(order, SwapStatus::Refunding);
                }
                let leg = &order.destination;
                match handle
                    .adapter
                    .deposit(&leg.claimer, leg.amount, &order.hashlock, leg.timelock)
                    .await
                {
                    Ok(tx) => {
                        order.destination.deposit_tx = Some(tx.clone());
                        if !self.record_tx(&mut order)? {
                            return Ok(StepOutcome::Busy);
                        }
                        info!(
                            swap_id = %order.id,
                            chain = %order.to_chain(),
                            "[swap] Destination deposit sent: {}",
                            tx
                        );
                        tx
                    }
                    Err(e) => return self.on_adapter_error(order, Leg::Destination, "deposit", e),
                }
            }
        };
        self.confirm_deposit(order, Leg::Destination, tx, SwapStatus::DstDeposited)
            .await
    }

    /// Wait for a deposit, check it on chain, then move to `next`.
    async fn confirm_deposit(
        &self,
        order: SwapOrder,
        leg: Leg,
        tx: TxRef,
        next: SwapStatus,
    ) -> SwapResult<StepOutcome> {
        let handle = self.handle(order.leg(leg).chain)?;
        if let Err(e) = self.confirm(handle, &tx).await {
            return self.on_adapter_error(order, leg, "deposit confirmation", e);
        }
        let deposit = handle.adapter.deposit_ref(&order.hashlock);
        let info = match handle.adapter.get_deposit(&deposit).await {
            Ok(info) => info,
            Err(e) => return self.on_adapter_error(order, leg, "deposit lookup", e),
        };
        if let Err(detail) = invariant_deposit_matches(order.leg(leg), &order.hashlock, &info) {
            return self.violate(order, detail);
        }
        self.move_to(order, next)
    }

    async fn step_reveal(&self, order: SwapOrder) -> SwapResult<StepOutcome> {
        if let Err(e) = invariant_reveal_allowed(&order) {
            let detail = match e {
                SwapError::InvariantViolation(detail) => detail,
                other => other.to_string(),
            };
            return self.violate(order, detail);
        }
        let src = self.handle(order.from_chain())?;
        let dst = self.handle(order.to_chain())?;
        let src_ref = src.adapter.deposit_ref(&order.hashlock);
        let dst_ref = dst.adapter.deposit_ref(&order.hashlock);

        let src_info = match src.adapter.get_deposit(&src_ref).await {
            Ok(info) => info,
            Err(e) => return self.on_adapter_error(order, Leg::Source, "deposit lookup", e),
        };
        let dst_info = match dst.adapter.get_deposit(&dst_ref).await {
            Ok(info) => info,
            Err(e) => return self.on_adapter_error(order, Leg::Destination, "deposit lookup", e),
        };

        match dst_info.state {
            DepositState::Claimed => return self.adopt_destination_claim(order, dst_info),
            DepositState::Refunded => return self.move_to(order, SwapStatus::Refunding),
            DepositState::Locked => {}
        }
        if src_info.state != DepositState::Locked {
            return self.violate(
                order,
                format!("source deposit is {:?} before the secret was revealed", src_info.state),
            );
        }
        for (leg, info) in [(Leg::Source, &src_info), (Leg::Destination, &dst_info)] {
            if let Err(detail) = invariant_deposit_matches(order.leg(leg), &order.hashlock, info) {
                return self.violate(order, detail);
            }
        }

        // A claim already on chain is adopted above at any time; only a new
        // claim needs the window.
        if !has_time_for(
            self.now(),
            order.destination.timelock,
            self.config.reveal_window_secs,
        ) {
            return self.park(
                order,
                "reveal window closed; destination leg left to the expiry monitor".into(),
            );
        }
        let secret = match self.vault_secret(&order)? {
            Ok(secret) => secret,
            Err(detail) => return self.violate(order, detail),
        };

        match dst.adapter.claim(&dst_ref, &secret).await {
            Ok(tx) => self.record_reveal(order, secret, tx),
            Err(AdapterError::AlreadyClaimed) => match dst.adapter.get_deposit(&dst_ref).await {
                Ok(info) => self.adopt_destination_claim(order, info),
                Err(e) => self.on_adapter_error(order, Leg::Destination, "claim lookup", e),
            },
            Err(AdapterError::AlreadyRefunded) => self.move_to(order, SwapStatus::Refunding),
            Err(e @ AdapterError::InvalidSecret) | Err(e @ AdapterError::Expired) => {
                warn!(
                    swap_id = %order.id,
                    chain = %order.to_chain(),
                    "[swap] Destination claim refused: {}",
                    e
                );
                self.park(order, format!("dst claim on {}: {}", dst.config.chain, e))
            }
            Err(e) => self.on_adapter_error(order, Leg::Destination, "claim", e),
        }
    }

    /// Secret from the vault, checked against the hashlock.
    fn vault_secret(&self, order: &SwapOrder) -> SwapResult<Result<SecureSecret, String>> {
        Ok(match self.store.load_secret(&order.hashlock)? {
            None => Err(format!("secret for {} missing from the vault", order.hashlock)),
            Some(secret) if !self.secrets.verify(&secret, &order.hashlock) => {
                Err(format!("stored secret does not hash to {}", order.hashlock))
            }
            Some(secret) => Ok(secret),
        })
    }

    fn record_reveal(&self, mut order: SwapOrder, secret: SecureSecret, tx: TxRef) -> SwapResult<StepOutcome> {
        let from = order.status;
        order.last_error = None;
        order.reveal_secret(secret, tx.clone(), self.now())?;
        if !self.cas(from, &order)? {
            return Ok(StepOutcome::Busy);
        }
        info!(
            swap_id = %order.id,
            chain = %order.to_chain(),
            status = %order.status,
            "[swap] Secret revealed on destination: {}",
            tx
        );
        metrics::record_transition(&order.status.to_string());
        Ok(StepOutcome::Advanced(order.status))
    }

    /// The destination deposit is already claimed: adopt that claim.
    fn adopt_destination_claim(&self, order: SwapOrder, info: DepositInfo) -> SwapResult<StepOutcome> {
        let Some(tx) = info.claim_tx else {
            return self.park(order, "destination claimed by an unknown transaction".into());
        };
        let secret = match self.vault_secret(&order)? {
            Ok(secret) => secret,
            Err(detail) => match info.revealed_secret {
                Some(secret) if self.secrets.verify(&secret, &order.hashlock) => secret,
                _ => return self.violate(order, detail),
            },
        };
        self.record_reveal(order, secret, tx)
    }

    async fn step_destination_claim_confirmed(&self, order: SwapOrder) -> SwapResult<StepOutcome> {
        let Some(tx) = order.destination.claim_tx.clone() else {
            return self.violate(order, "secret revealed without a destination claim".into());
        };
        let handle = self.handle(order.to_chain())?;
        if let Err(e) = self.confirm(handle, &tx).await {
            return self.on_adapter_error(order, Leg::Destination, "claim confirmation", e);
        }
        self.move_to(order, SwapStatus::DstClaimed)
    }

    async fn step_source_claim(&self, mut order: SwapOrder) -> SwapResult<StepOutcome> {
        let secret = match order.secret.clone() {
            Some(secret) if self.secrets.verify(&secret, &order.hashlock) => secret,
            recorded => match self.vault_secret(&order)? {
                Ok(secret) => {
                    warn!(
                        swap_id = %order.id,
                        status = %order.status,
                        "[swap] Secret on record {}; using the vault copy",
                        if recorded.is_some() { "does not match the hashlock" } else { "is missing" }
                    );
                    secret
                }
                Err(detail) => return self.violate(order, detail),
            },
        };
        let handle = self.handle(order.from_chain())?;
        let deposit = handle.adapter.deposit_ref(&order.hashlock);

        let tx = match order.source.claim_tx.clone() {
            Some(tx) => tx,
            None => {
                let tx = match handle.adapter.claim(&deposit, &secret).await {
                    Ok(tx) => tx,
                    Err(AdapterError::AlreadyClaimed) => {
                        match handle.adapter.get_deposit(&deposit).await {
                            Ok(DepositInfo {
                                claim_tx: Some(tx), ..
                            }) => tx,
                            Ok(_) => {
                                return self.park(order, "source claimed by an unknown transaction".into())
                            }
                            Err(e) => return self.on_adapter_error(order, Leg::Source, "claim lookup", e),
                        }
                    }
                    Err(e @ AdapterError::Expired) | Err(e @ AdapterError::AlreadyRefunded) => {
                        error!(
                            swap_id = %order.id,
                            chain = %order.from_chain(),
                            "[swap] Source leg lost after the secret went public: {}",
                            e
                        );
                        return self.reject(order, format!("src claim on {}: {}", handle.config.chain, e));
                    }
                    Err(e) => return self.on_adapter_error(order, Leg::Source, "claim", e),
                };
                order.source.claim_tx = Some(tx.clone());
                if !self.record_tx(&mut order)? {
                    return Ok(StepOutcome::Busy);
                }
                info!(
                    swap_id = %order.id,
                    chain = %order.from_chain(),
                    "[swap] Source claim sent: {}",
                    tx
                );
                tx
            }
        };

        if let Err(e) = self.confirm(handle, &tx).await {
            return self.on_adapter_error(order, Leg::Source, "claim confirmation", e);
        }
        self.move_to(order, SwapStatus::Completed)
    }

    /// Spawn a driver task for an order unless one is already running.
    pub fn spawn(self: &Arc<Self>, id: SwapId) -> Option<JoinHandle<()>> {
        if !self.drivers.lock().insert(id) {
            return None;
        }
        let this = Arc::clone(self);
        let shutdown = self.subscribe_shutdown();
        Some(tokio::spawn(async move {
            this.drive(id, shutdown).await;
            this.drivers.lock().remove(&id);
        }))
    }

    async fn drive(&self, id: SwapId, mut shutdown: watch::Receiver<bool>) {
        debug!(swap_id = %id, "[swap] Driver started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.advance(id).await {
                Ok(StepOutcome::Advanced(status)) if !status.is_terminal() => continue,
                Ok(StepOutcome::Advanced(status)) | Ok(StepOutcome::Terminal(status)) => {
                    debug!(swap_id = %id, status = %status, "[swap] Driver finished");
                    break;
                }
                Ok(StepOutcome::Parked(reason)) => {
                    info!(swap_id = %id, "[swap] Order parked: {}", reason);
                    self.parked.lock().insert(id);
                    break;
                }
                Ok(StepOutcome::Waiting(reason)) => {
                    debug!(swap_id = %id, "[swap] Waiting: {}", reason);
                }
                Ok(StepOutcome::Busy) => {}
                Err(SwapError::NotFound(_)) => break,
                Err(e) => {
                    warn!(swap_id = %id, "[swap] Step failed: {}", e);
                }
            }
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Spawn drivers for every order the coordinator can still move.
    ///
    /// Skips orders in `Refunding` and orders parked since startup. Parked
    /// orders that have since closed are forgotten.
    pub fn resume_open_orders(self: &Arc<Self>) -> SwapResult<usize> {
        let open: HashSet<SwapId> = self.store.open_orders()?.into_iter().collect();
        let parked = {
            let mut parked = self.parked.lock();
            parked.retain(|id| open.contains(id));
            parked.clone()
        };
        let mut spawned = 0;
        for id in open {
            if parked.contains(&id) || self.drivers.lock().contains(&id) {
                continue;
            }
            match self.store.get(id)? {
                Some(order) if order.status != SwapStatus::Refunding => {}
                _ => continue,
            }
            if self.spawn(id).is_some() {
                spawned += 1;
            }
        }
        if spawned > 0 {
            info!("[swap] Resumed {} order driver(s)", spawned);
        }
        Ok(spawned)
    }

    /// Number of orders parked for the expiry monitor or an operator.
    pub fn parked_count(&self) -> usize {
        self.parked.lock().len()
    }

    /// Keep drivers running for new and recovered orders until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[swap] Coordinator shutting down");
                    self.shutdown();
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.resume_open_orders() {
                        warn!("[swap] Could not list open orders: {}", e);
                    }
                    self.locks.prune();
                }
            }
        }
    }

    fn validate_request(&self, request: &CreateSwapRequest) -> SwapResult<Timelocks> {
        if request.user_address.trim().is_empty() {
            return Err(SwapError::InvalidRequest("user address is empty".into()));
        }
        if request.counterparty_address.trim().is_empty() {
            return Err(SwapError::InvalidRequest("counterparty address is empty".into()));
        }
        if request.amount.is_zero() || request.to_amount.map_or(false, |a| a.is_zero()) {
            return Err(SwapError::InvalidRequest("amount must be positive".into()));
        }
        if request.from_chain == request.to_chain {
            return Err(SwapError::UnsupportedPair {
                from: request.from_chain,
                to: request.to_chain,
            });
        }
        let src = self.handle(request.from_chain)?;
        let dst = self.handle(request.to_chain)?;
        if !src.adapter.supports_asset(&request.from_asset) {
            return Err(SwapError::InvalidRequest(format!(
                "asset {} not supported on {}",
                request.from_asset, request.from_chain
            )));
        }
        if !dst.adapter.supports_asset(&request.to_asset) {
            return Err(SwapError::InvalidRequest(format!(
                "asset {} not supported on {}",
                request.to_asset, request.to_chain
            )));
        }

        let now = self.now();
        let timelocks = match request.timelocks {
            Some((src, dst)) => Timelocks { src, dst },
            None => calculate_timelocks(request.from_chain, request.to_chain, now, &self.config),
        };
        validate_swap_timelocks(timelocks, now, &self.config)?;
        Ok(timelocks)
    }
}

#[async_trait]
impl SwapApi for SwapCoordinator {
    async fn create_swap(&self, request: CreateSwapRequest) -> SwapResult<SwapOrder> {
        let timelocks = self.validate_request(&request)?;
        let src = self.handle(request.from_chain)?;
        let dst = self.handle(request.to_chain)?;

        let secret = match request.secret {
            Some(secret) => secret,
            None => self.secrets.generate_secret(),
        };
        let hashlock = self.secrets.compute_hashlock(&secret);
        let now = self.now();

        let order = SwapOrderBuilder::new(hashlock, now)
            .source(LegParams {
                chain: request.from_chain,
                asset: request.from_asset,
                amount: request.amount,
                depositor: request.user_address,
                claimer: src.config.resolver_address.clone(),
                timelock: timelocks.src,
            })
            .destination(LegParams {
                chain: request.to_chain,
                asset: request.to_asset,
                amount: request.to_amount.unwrap_or(request.amount),
                depositor: dst.config.resolver_address.clone(),
                claimer: request.counterparty_address,
                timelock: timelocks.dst,
            })
            .build()?;

        match self.store.insert(&order, &secret) {
            Ok(()) => {}
            Err(StoreError::HashlockInUse(h)) => return Err(SwapError::HashlockInUse(h)),
            Err(e) => return Err(e.into()),
        }

        metrics::record_order_created(order.from_chain().name(), order.to_chain().name());
        info!(
            swap_id = %order.id,
            "[swap] Created swap {} -> {} (hashlock {}, src expiry {}, dst expiry {})",
            order.from_chain(),
            order.to_chain(),
            hashlock.short(),
            timelocks.src,
            timelocks.dst
        );
        Ok(order)
    }

    async fn get_swap(&self, id: SwapId) -> SwapResult<SwapOrder> {
        self.load(id)
    }

    async fn list_swaps(&self, status: Option<SwapStatus>) -> SwapResult<Vec<SwapOrder>> {
        Ok(self.store.list(status)?)
    }

    async fn cancel_swap(&self, id: SwapId) -> SwapResult<SwapOrder> {
        let _guard = self.locks.lock(id).await;
        let mut order = self.load(id)?;
        if order.status != SwapStatus::Created || order.source.deposit_tx.is_some() {
            return Err(SwapError::NotCancellable {
                id,
                status: order.status,
            });
        }
        order.fail(FailureReason::Cancelled, self.now())?;
        if !self.cas(SwapStatus::Created, &order)? {
            return Err(SwapError::NotCancellable {
                id,
                status: self.load(id)?.status,
            });
        }
        info!(swap_id = %id, "[swap] Cancelled before any deposit");
        metrics::record_transition(&SwapStatus::Failed.to_string());
        Ok(order)
    }

    fn is_chain_supported(&self, chain: ChainId) -> bool {
        self.chains.contains_key(&chain)
    }
}
