//! # Expiry Monitor
//!
//! Periodically scans for orders whose relevant timelock has passed and
//! drives them to `Expired` or through `Refunding` to `Refunded`.
//!
//! The monitor only ever `try_lock`s an order: if a coordinator step holds
//! it, the order is skipped and picked up on the next scan. Every status
//! change is a compare-and-swap, so a claim that lands between the scan and
//! the refund loses nothing.
//!
//! Once the destination leg has been claimed the secret is public, so an open
//! source leg is claimed for the resolver instead of refunded.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::locks::OrderLocks;
use super::{ChainHandle, ChainMap};
use crate::config::SwapConfig;
use crate::domain::{
    canonical_hash, AdapterError, ChainId, DepositInfo, DepositState, Leg, SecureSecret,
    StoreError, SwapError, SwapId, SwapOrder, SwapResult, SwapStatus,
};
use crate::metrics;
use crate::ports::outbound::{OrderStore, TimeSource};

/// What the monitor did with one order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorAction {
    /// Nothing has expired yet.
    NotDue,
    /// Held by another task; retried next scan.
    Busy,
    /// Moved to `Expired` (no funds were ever locked).
    Expired,
    /// Some legs were settled; others still wait for their timelock.
    Progress,
    /// Every funded leg is closed.
    Refunded,
    /// A chain call failed; recorded on the order, retried next scan.
    Error(AdapterError),
}

/// Summary of one scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Orders returned by the expiry index.
    pub candidates: usize,
    /// Orders moved to `Expired`.
    pub expired: usize,
    /// Orders moved to `Refunded`.
    pub refunded: usize,
    /// Orders still in `Refunding` after the scan.
    pub in_progress: usize,
    /// Orders skipped because another task held them.
    pub busy: usize,
    /// Orders with a chain or store error.
    pub errors: usize,
}

impl ScanReport {
    fn record(&mut self, action: &MonitorAction) {
        match action {
            MonitorAction::NotDue => {}
            MonitorAction::Busy => self.busy += 1,
            MonitorAction::Expired => self.expired += 1,
            MonitorAction::Progress => self.in_progress += 1,
            MonitorAction::Refunded => self.refunded += 1,
            MonitorAction::Error(_) => self.errors += 1,
        }
    }
}

/// Background task that refunds expired legs.
#[derive(Clone)]
pub struct ExpiryMonitor {
    config: SwapConfig,
    store: Arc<dyn OrderStore>,
    chains: ChainMap,
    clock: Arc<dyn TimeSource>,
    locks: OrderLocks,
}

impl ExpiryMonitor {
    pub(crate) fn new(
        config: SwapConfig,
        store: Arc<dyn OrderStore>,
        chains: ChainMap,
        clock: Arc<dyn TimeSource>,
        locks: OrderLocks,
    ) -> Self {
        Self {
            config,
            store,
            chains,
            clock,
            locks,
        }
    }

    /// Scan once and process every candidate concurrently.
    pub async fn scan_once(&self) -> SwapResult<ScanReport> {
        let now = self.clock.now();
        let candidates = self.store.expiry_candidates(now)?;
        metrics::record_monitor_scan(candidates.len());

        let mut report = ScanReport {
            candidates: candidates.len(),
            ..ScanReport::default()
        };
        if candidates.is_empty() {
            return Ok(report);
        }
        debug!("[swap] Expiry scan found {} candidate(s)", candidates.len());

        let mut tasks = JoinSet::new();
        for id in candidates {
            let this = self.clone();
            tasks.spawn(async move { (id, this.process(id).await) });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(action))) => report.record(&action),
                Ok((id, Err(e))) => {
                    warn!(swap_id = %id, "[swap] Expiry handling failed: {}", e);
                    report.errors += 1;
                }
                Err(e) => {
                    error!("[swap] Expiry task panicked: {}", e);
                    report.errors += 1;
                }
            }
        }
        if report.expired + report.refunded + report.in_progress + report.errors > 0 {
            info!(
                "[swap] Expiry scan: {} expired, {} refunded, {} in progress, {} busy, {} errors",
                report.expired, report.refunded, report.in_progress, report.busy, report.errors
            );
        }
        Ok(report)
    }

    /// Scan every `monitor_interval` until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.monitor_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            "[swap] Expiry monitor started (interval {:?})",
            self.config.monitor_interval
        );
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("[swap] Expiry monitor shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!("[swap] Expiry scan failed: {}", e);
                    }
                }
            }
        }
    }

    /// Handle one order if nobody else holds it.
    pub async fn process(&self, id: SwapId) -> SwapResult<MonitorAction> {
        let Some(_guard) = self.locks.try_lock(id) else {
            debug!(swap_id = %id, "[swap] Order busy, skipping expiry check");
            return Ok(MonitorAction::Busy);
        };
        self.expire_or_refund(id).await
    }

    /// Operator-triggered refund. Waits for the order lock.
    pub async fn refund_order(&self, id: SwapId) -> SwapResult<SwapOrder> {
        let _guard = self.locks.lock(id).await;
        match self.expire_or_refund(id).await? {
            MonitorAction::NotDue => Err(SwapError::NotRefundable { id }),
            MonitorAction::Error(e) => Err(SwapError::Adapter(e)),
            _ => self.store.get(id)?.ok_or(SwapError::NotFound(id)),
        }
    }

    async fn expire_or_refund(&self, id: SwapId) -> SwapResult<MonitorAction> {
        let mut order = self.store.get(id)?.ok_or(SwapError::NotFound(id))?;
        let now = self.clock.now();

        if order.status == SwapStatus::Refunding && order.all_legs_closed() {
            return self.finish(order);
        }
        if !order.status.is_refund_candidate() {
            return Ok(MonitorAction::NotDue);
        }
        match order.relevant_timelock() {
            Some(timelock) if timelock < now => {}
            _ => return Ok(MonitorAction::NotDue),
        }

        match order.status {
            SwapStatus::Created if order.source.deposit_tx.is_none() => {
                let expected = order.status;
                order.transition_to(SwapStatus::Expired, now)?;
                if !self.cas(expected, &order)? {
                    return Ok(MonitorAction::Busy);
                }
                info!(swap_id = %id, status = %order.status, "[swap] Expired before any deposit");
                metrics::record_transition(&SwapStatus::Expired.to_string());
                return Ok(MonitorAction::Expired);
            }
            SwapStatus::Created | SwapStatus::SrcDeposited | SwapStatus::DstDeposited => {
                let expected = order.status;
                order.transition_to(SwapStatus::Refunding, now)?;
                if !self.cas(expected, &order)? {
                    return Ok(MonitorAction::Busy);
                }
                info!(
                    swap_id = %id,
                    status = %order.status,
                    "[swap] Timelock passed in {}, refunding",
                    expected
                );
                metrics::record_transition(&SwapStatus::Refunding.to_string());
            }
            _ => {}
        }

        self.refund_open_legs(order).await
    }

    /// Settle every open leg that is due: destination first.
    async fn refund_open_legs(&self, mut order: SwapOrder) -> SwapResult<MonitorAction> {
        let now = self.clock.now();
        let mut changed = false;
        let mut failure = None;

        for leg in [Leg::Destination, Leg::Source] {
            if !order.leg(leg).is_open() {
                continue;
            }
            let result = match leg {
                Leg::Destination if order.destination.is_expired(now) => {
                    self.settle_leg(&mut order, leg).await
                }
                Leg::Destination => continue,
                Leg::Source => match self.public_secret(&order).await {
                    Ok(Some(secret)) => self.claim_source(&mut order, &secret).await,
                    Ok(None) if order.source.is_expired(now) => self.settle_leg(&mut order, leg).await,
                    Ok(None) => continue,
                    Err(e) => Err(e),
                },
            };
            match result {
                Ok(()) => changed = true,
                Err(e) => {
                    warn!(
                        swap_id = %order.id,
                        chain = %order.leg(leg).chain,
                        "[swap] {} settlement failed: {}",
                        leg,
                        e
                    );
                    order.record_error(format!("{} settlement: {}", leg, e), self.clock.now());
                    failure = Some(e);
                    changed = true;
                    break;
                }
            }
        }

        if changed && !self.cas(SwapStatus::Refunding, &order)? {
            return Ok(MonitorAction::Busy);
        }
        if let Some(e) = failure {
            return Ok(MonitorAction::Error(e));
        }
        if order.all_legs_closed() {
            return self.finish(order);
        }
        Ok(MonitorAction::Progress)
    }

    fn handle(&self, chain: ChainId) -> Result<&ChainHandle, AdapterError> {
        self.chains
            .get(&chain)
            .ok_or_else(|| AdapterError::Misconfigured(format!("no adapter for {}", chain)))
    }

    /// The secret, once the destination leg has paid out to the user.
    ///
    /// Vault copy first, then whatever the destination chain recorded. Either
    /// must hash to the order's hashlock.
    async fn public_secret(&self, order: &SwapOrder) -> Result<Option<SecureSecret>, AdapterError> {
        if !order.destination_claimed() {
            return Ok(None);
        }
        let matches = |secret: &SecureSecret| canonical_hash(secret) == order.hashlock;
        let vault = self
            .store
            .load_secret(&order.hashlock)
            .map_err(|e| AdapterError::Unavailable(format!("secret vault: {}", e)))?;
        if let Some(secret) = vault.filter(|s| matches(s)) {
            return Ok(Some(secret));
        }
        let handle = self.handle(order.to_chain())?;
        let deposit = handle.adapter.deposit_ref(&order.hashlock);
        let info = handle.adapter.get_deposit(&deposit).await?;
        Ok(info.revealed_secret.filter(|s| matches(s)))
    }

    /// Claim the source leg for the resolver.
    async fn claim_source(&self, order: &mut SwapOrder, secret: &SecureSecret) -> Result<(), AdapterError> {
        let chain = order.source.chain;
        let handle = self.handle(chain)?;
        let deposit = handle.adapter.deposit_ref(&order.hashlock);

        match handle.adapter.claim(&deposit, secret).await {
            Ok(tx) => {
                handle
                    .adapter
                    .wait_for_confirmation(
                        &tx,
                        handle.confirmation_timeout(self.config.confirmation_timeout),
                    )
                    .await?;
                info!(
                    swap_id = %order.id,
                    chain = %chain,
                    "[swap] Source leg claimed after the destination paid out: {}",
                    tx
                );
                order.source.claim_tx = Some(tx);
                Ok(())
            }
            Err(AdapterError::Expired) => {
                error!(
                    swap_id = %order.id,
                    chain = %chain,
                    "[swap] Source leg expired before it could be claimed, refunding"
                );
                self.settle_leg(order, Leg::Source).await
            }
            Err(AdapterError::AlreadyClaimed) | Err(AdapterError::AlreadyRefunded) => {
                let info = handle.adapter.get_deposit(&deposit).await?;
                Self::close_from(order, Leg::Source, info);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Bring one leg to a closed state: refund it, or record how it closed.
    async fn settle_leg(&self, order: &mut SwapOrder, leg: Leg) -> Result<(), AdapterError> {
        let chain = order.leg(leg).chain;
        let handle = self.handle(chain)?;
        let deposit = handle.adapter.deposit_ref(&order.hashlock);

        let info = match handle.adapter.get_deposit(&deposit).await {
            Ok(info) => info,
            Err(AdapterError::NotFound(_)) => {
                info!(
                    swap_id = %order.id,
                    chain = %chain,
                    "[swap] {} deposit never landed, closing leg",
                    leg
                );
                order.leg_mut(leg).closed_externally = true;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if info.state != DepositState::Locked {
            Self::close_from(order, leg, info);
            return Ok(());
        }

        match handle.adapter.refund(&deposit).await {
            Ok(tx) => {
                handle
                    .adapter
                    .wait_for_confirmation(
                        &tx,
                        handle.confirmation_timeout(self.config.confirmation_timeout),
                    )
                    .await?;
                info!(
                    swap_id = %order.id,
                    chain = %chain,
                    "[swap] {} leg refunded: {}",
                    leg,
                    tx
                );
                metrics::record_refund(chain.name());
                order.leg_mut(leg).refund_tx = Some(tx);
                Ok(())
            }
            Err(AdapterError::AlreadyClaimed) | Err(AdapterError::AlreadyRefunded) => {
                let info = handle.adapter.get_deposit(&deposit).await?;
                Self::close_from(order, leg, info);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn close_from(order: &mut SwapOrder, leg: Leg, info: DepositInfo) {
        let id = order.id;
        let state = order.leg_mut(leg);
        match info.state {
            DepositState::Claimed => {
                // a claim that beat the refund is a payout we keep
                if info.claim_tx.is_none() {
                    state.closed_externally = true;
                }
                state.claim_tx = info.claim_tx;
                info!(swap_id = %id, chain = %state.chain, "[swap] {} leg was claimed", leg);
            }
            DepositState::Refunded => {
                if info.refund_tx.is_none() {
                    state.closed_externally = true;
                }
                state.refund_tx = info.refund_tx;
                info!(swap_id = %id, chain = %state.chain, "[swap] {} leg already refunded", leg);
            }
            DepositState::Locked => {}
        }
    }

    fn finish(&self, mut order: SwapOrder) -> SwapResult<MonitorAction> {
        order.last_error = None;
        order.transition_to(SwapStatus::Refunded, self.clock.now())?;
        if !self.cas(SwapStatus::Refunding, &order)? {
            return Ok(MonitorAction::Busy);
        }
        info!(swap_id = %order.id, status = %order.status, "[swap] All funded legs closed");
        metrics::record_transition(&SwapStatus::Refunded.to_string());
        Ok(MonitorAction::Refunded)
    }

    fn cas(&self, expected: SwapStatus, order: &SwapOrder) -> SwapResult<bool> {
        match self.store.compare_and_swap(expected, order) {
            Ok(()) => Ok(true),
            Err(StoreError::StatusConflict { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryKVStore, KvOrderStore, Ledger, LedgerAdapter, LedgerOp, ManualClock};
    use crate::config::{AdapterKind, ChainConfig};
    use crate::domain::{Amount, ChainId, SecureSecret};
    use crate::ports::outbound::ChainAdapter;
    use crate::ports::inbound::{CreateSwapRequest, SwapApi};
    use crate::service::{StepOutcome, SwapCoordinator};

    const NOW: u64 = 1_700_000_000;

    struct Harness {
        clock: ManualClock,
        src: Arc<Ledger>,
        dst: Arc<Ledger>,
        coordinator: Arc<SwapCoordinator>,
        monitor: ExpiryMonitor,
    }

    fn harness() -> Harness {
        let clock = ManualClock::new(NOW);
        let time: Arc<dyn TimeSource> = Arc::new(clock.clone());
        let src = Arc::new(Ledger::new(ChainId::Ethereum, time.clone()));
        let dst = Arc::new(Ledger::new(ChainId::Near, time.clone()));
        src.fund("user", Amount::from(1_000u64));
        dst.fund("resolver.near", Amount::from(1_000u64));

        let store: Arc<dyn OrderStore> = Arc::new(KvOrderStore::new(InMemoryKVStore::new()));
        let coordinator = SwapCoordinator::builder(SwapConfig::for_testing(), store, time)
            .chain(
                ChainConfig::new(ChainId::Ethereum, AdapterKind::Ledger, "0xresolver"),
                Arc::new(LedgerAdapter::new(src.clone(), "user")),
            )
            .chain(
                ChainConfig::new(ChainId::Near, AdapterKind::Ledger, "resolver.near"),
                Arc::new(LedgerAdapter::new(dst.clone(), "resolver.near")),
            )
            .build()
            .unwrap();
        let monitor = coordinator.monitor();
        Harness {
            clock,
            src,
            dst,
            coordinator: Arc::new(coordinator),
            monitor,
        }
    }

    fn secret() -> SecureSecret {
        SecureSecret::new([7; 32])
    }

    async fn create(h: &Harness) -> SwapOrder {
        h.coordinator
            .create_swap(
                CreateSwapRequest::new(
                    ChainId::Ethereum,
                    ChainId::Near,
                    Amount::from(100u64),
                    "user",
                    "user.near",
                )
                .with_secret(secret()),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_unfunded_order_expires() {
        let h = harness();
        let order = create(&h).await;

        assert_eq!(h.monitor.scan_once().await.unwrap().candidates, 0);
        h.clock.set(order.source.timelock + 1);

        let report = h.monitor.scan_once().await.unwrap();
        assert_eq!(report.expired, 1);
        let stored = h.coordinator.get_swap(order.id).await.unwrap();
        assert_eq!(stored.status, SwapStatus::Expired);
        assert_eq!(h.src.call_count(LedgerOp::Refund), 0);
    }

    #[tokio::test]
    async fn test_both_legs_refunded_destination_first() {
        let h = harness();
        let order = create(&h).await;
        h.coordinator.advance(order.id).await.unwrap();
        h.coordinator.advance(order.id).await.unwrap();

        // destination expired, source still locked
        h.clock.set(order.destination.timelock + 1);
        assert_eq!(h.monitor.process(order.id).await.unwrap(), MonitorAction::Progress);
        let mid = h.coordinator.get_swap(order.id).await.unwrap();
        assert_eq!(mid.status, SwapStatus::Refunding);
        assert!(mid.destination.refund_tx.is_some());
        assert!(mid.source.is_open());
        assert_eq!(h.dst.balance("resolver.near"), Amount::from(1_000u64));

        // the coordinator leaves a refunding order alone
        assert!(matches!(
            h.coordinator.advance(order.id).await.unwrap(),
            StepOutcome::Parked(_)
        ));

        h.clock.set(order.source.timelock + 1);
        let report = h.monitor.scan_once().await.unwrap();
        assert_eq!(report.refunded, 1);
        let done = h.coordinator.get_swap(order.id).await.unwrap();
        assert_eq!(done.status, SwapStatus::Refunded);
        assert!(done.source.refund_tx.is_some());
        assert_eq!(h.src.balance("user"), Amount::from(1_000u64));
    }

    #[tokio::test]
    async fn test_claim_that_beats_refund_is_kept() {
        let h = harness();
        let order = create(&h).await;
        h.coordinator.advance(order.id).await.unwrap();
        h.coordinator.advance(order.id).await.unwrap();

        // user claims the destination leg directly with the secret
        let claimant = LedgerAdapter::new(h.dst.clone(), "user.near");
        let dst_ref = claimant.deposit_ref(&order.hashlock);
        claimant.claim(&dst_ref, &secret()).await.unwrap();

        h.clock.set(order.destination.timelock + 1);
        assert_eq!(h.monitor.process(order.id).await.unwrap(), MonitorAction::Refunded);
        let stored = h.coordinator.get_swap(order.id).await.unwrap();
        assert!(stored.destination.claim_tx.is_some());
        assert!(stored.destination.refund_tx.is_none());
        assert_eq!(h.dst.balance("user.near"), Amount::from(100u64));

        // the secret is public, so the resolver is paid instead of the user refunded
        assert!(stored.source.claim_tx.is_some());
        assert!(stored.source.refund_tx.is_none());
        assert_eq!(h.src.balance("0xresolver"), Amount::from(100u64));
        assert_eq!(h.src.balance("user"), Amount::from(900u64));
        assert_eq!(h.src.call_count(LedgerOp::Refund), 0);
    }

    #[tokio::test]
    async fn test_failed_source_claim_retried_before_source_expiry() {
        let h = harness();
        let order = create(&h).await;
        h.coordinator.advance(order.id).await.unwrap();
        h.coordinator.advance(order.id).await.unwrap();

        let claimant = LedgerAdapter::new(h.dst.clone(), "user.near");
        claimant
            .claim(&claimant.deposit_ref(&order.hashlock), &secret())
            .await
            .unwrap();

        h.clock.set(order.destination.timelock + 1);
        h.src.fail_next(LedgerOp::Claim, AdapterError::Unavailable("rpc down".into()));
        let action = h.monitor.process(order.id).await.unwrap();
        assert!(matches!(action, MonitorAction::Error(AdapterError::Unavailable(_))));
        let stored = h.coordinator.get_swap(order.id).await.unwrap();
        assert_eq!(stored.status, SwapStatus::Refunding);
        assert!(stored.source.is_open());

        // still a candidate well before the source timelock
        let report = h.monitor.scan_once().await.unwrap();
        assert_eq!(report.refunded, 1);
        assert_eq!(h.src.balance("0xresolver"), Amount::from(100u64));
    }

    #[tokio::test]
    async fn test_busy_order_is_skipped() {
        let h = harness();
        let order = create(&h).await;
        h.clock.set(order.source.timelock + 1);

        let guard = h.monitor.locks.lock(order.id).await;
        assert_eq!(h.monitor.process(order.id).await.unwrap(), MonitorAction::Busy);
        drop(guard);
        assert_eq!(h.monitor.process(order.id).await.unwrap(), MonitorAction::Expired);
    }

    #[tokio::test]
    async fn test_refund_error_is_recorded_and_retried() {
        let h = harness();
        let order = create(&h).await;
        h.coordinator.advance(order.id).await.unwrap();
        h.clock.set(order.source.timelock + 1);

        h.src.fail_next(LedgerOp::Refund, AdapterError::Unavailable("rpc down".into()));
        let action = h.monitor.process(order.id).await.unwrap();
        assert!(matches!(action, MonitorAction::Error(AdapterError::Unavailable(_))));
        let stored = h.coordinator.get_swap(order.id).await.unwrap();
        assert_eq!(stored.status, SwapStatus::Refunding);
        assert!(stored.last_error.is_some());

        assert_eq!(h.monitor.process(order.id).await.unwrap(), MonitorAction::Refunded);
        assert!(h.coordinator.get_swap(order.id).await.unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_refund_order_before_expiry_is_rejected() {
        let h = harness();
        let order = create(&h).await;
        h.coordinator.advance(order.id).await.unwrap();

        assert!(matches!(
            h.monitor.refund_order(order.id).await,
            Err(SwapError::NotRefundable { .. })
        ));
        h.clock.set(order.source.timelock + 1);
        let refunded = h.monitor.refund_order(order.id).await.unwrap();
        assert_eq!(refunded.status, SwapStatus::Refunded);
    }
}
