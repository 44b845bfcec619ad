//! Two in-process chains wired to a coordinator and a monitor.
//!
//! Ethereum is the source chain, Near the destination. The user and the
//! resolver start with `10 * ONE` on the chain they pay from.

use std::sync::Arc;

use swap_core::adapters::{
    deposit_ref_for, InMemoryKVStore, KvOrderStore, Ledger, LedgerAdapter, ManualClock,
    RetryPolicy, RetryingAdapter,
};
use swap_core::{
    AdapterKind, Amount, ChainConfig, ChainId, CreateSwapRequest, DepositInfo,
    ExpiryMonitor, OrderStore, StepOutcome, SwapConfig, SwapCoordinator, SwapId, SwapOrder,
    SwapStatus, TimeSource,
};

/// Fixed start time of every network.
pub const NOW: u64 = 1_700_000_000;
/// One whole unit of either asset.
pub const ONE: u64 = 1_000_000;

/// User paying on the source chain.
pub const USER: &str = "0xuser";
/// User's receiving address on the destination chain.
pub const USER_DST: &str = "user.near";
/// Resolver's receiving address on the source chain.
pub const RESOLVER_SRC: &str = "0xresolver";
/// Resolver paying on the destination chain.
pub const RESOLVER_DST: &str = "resolver.near";

/// Retries per adapter call.
pub const RETRIES: u32 = 3;

/// Ledgers, store, coordinator and monitor sharing one manual clock.
pub struct TestNetwork {
    /// Shared clock.
    pub clock: ManualClock,
    /// Source chain (Ethereum).
    pub src: Arc<Ledger>,
    /// Destination chain (Near).
    pub dst: Arc<Ledger>,
    /// Order store.
    pub store: Arc<dyn OrderStore>,
    /// Coordinator under test.
    pub coordinator: Arc<SwapCoordinator>,
    /// Monitor sharing the coordinator's locks.
    pub monitor: ExpiryMonitor,
}

impl Default for TestNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl TestNetwork {
    /// Fresh network on an in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(KvOrderStore::new(InMemoryKVStore::new())))
    }

    /// Fresh network on `store`.
    pub fn with_store(store: Arc<dyn OrderStore>) -> Self {
        let clock = ManualClock::new(NOW);
        let time: Arc<dyn TimeSource> = Arc::new(clock.clone());
        let src = Arc::new(Ledger::new(ChainId::Ethereum, time.clone()));
        let dst = Arc::new(Ledger::new(ChainId::Near, time));
        src.fund(USER, Amount::from(10 * ONE));
        dst.fund(RESOLVER_DST, Amount::from(10 * ONE));
        Self::assemble(clock, src, dst, store)
    }

    /// Same chains and clock, new coordinator on `store`: a node restart.
    pub fn restart(&self, store: Arc<dyn OrderStore>) -> Self {
        Self::assemble(self.clock.clone(), self.src.clone(), self.dst.clone(), store)
    }

    fn assemble(
        clock: ManualClock,
        src: Arc<Ledger>,
        dst: Arc<Ledger>,
        store: Arc<dyn OrderStore>,
    ) -> Self {
        let time: Arc<dyn TimeSource> = Arc::new(clock.clone());
        let coordinator = SwapCoordinator::builder(SwapConfig::for_testing(), store.clone(), time)
            .chain(
                ChainConfig::new(ChainId::Ethereum, AdapterKind::Ledger, RESOLVER_SRC),
                Arc::new(RetryingAdapter::with_policy(
                    LedgerAdapter::new(src.clone(), USER),
                    RetryPolicy::immediate(RETRIES),
                )),
            )
            .chain(
                ChainConfig::new(ChainId::Near, AdapterKind::Ledger, RESOLVER_DST),
                Arc::new(RetryingAdapter::with_policy(
                    LedgerAdapter::new(dst.clone(), RESOLVER_DST),
                    RetryPolicy::immediate(RETRIES),
                )),
            )
            .build()
            .expect("test network configuration is valid");
        let coordinator = Arc::new(coordinator);
        let monitor = coordinator.monitor();

        Self {
            clock,
            src,
            dst,
            store,
            coordinator,
            monitor,
        }
    }

    /// `ONE` from Ethereum to Near with default timelocks.
    pub fn request(&self) -> CreateSwapRequest {
        CreateSwapRequest::new(
            ChainId::Ethereum,
            ChainId::Near,
            Amount::from(ONE),
            USER,
            USER_DST,
        )
    }

    /// Stored order.
    pub fn order(&self, id: SwapId) -> SwapOrder {
        self.store
            .get(id)
            .expect("store readable")
            .expect("order exists")
    }

    /// Stored status.
    pub fn status(&self, id: SwapId) -> SwapStatus {
        self.order(id).status
    }

    /// Step the coordinator until `target`, a terminal status or a park.
    pub async fn advance_until(&self, id: SwapId, target: SwapStatus) -> SwapStatus {
        for _ in 0..16 {
            let status = self.status(id);
            if status == target || status.is_terminal() {
                return status;
            }
            match self.coordinator.advance(id).await.expect("advance") {
                StepOutcome::Parked(_) | StepOutcome::Terminal(_) => return self.status(id),
                _ => {}
            }
        }
        self.status(id)
    }

    /// Escrow for `order` on the source chain.
    pub fn src_escrow(&self, order: &SwapOrder) -> Option<DepositInfo> {
        self.src.escrow(&deposit_ref_for(ChainId::Ethereum, &order.hashlock))
    }

    /// Escrow for `order` on the destination chain.
    pub fn dst_escrow(&self, order: &SwapOrder) -> Option<DepositInfo> {
        self.dst.escrow(&deposit_ref_for(ChainId::Near, &order.hashlock))
    }
}

/// `n * ONE` as an [`Amount`].
pub fn units(n: u64) -> Amount {
    Amount::from(n * ONE)
}
