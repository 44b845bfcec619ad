//! # Races and Retries
//!
//! The coordinator and the expiry monitor share per-order locks and change
//! status only by compare-and-swap. These tests run them against each other
//! and against flaky chains.

#[cfg(test)]
mod tests {
    use swap_core::adapters::{LedgerAdapter, LedgerOp};
    use swap_core::{
        AdapterError, ChainAdapter, DepositState, MonitorAction, OrderStore, StepOutcome, SwapApi,
        SwapId, SwapStatus,
    };

    use crate::harness::*;

    // =============================================================================
    // MONITOR VS COORDINATOR
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_expired_destination_refunded_once_under_concurrency() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        assert_eq!(
            net.advance_until(id, SwapStatus::DstDeposited).await,
            SwapStatus::DstDeposited
        );
        let order = net.order(id);
        net.clock.set(order.destination.timelock + 1);

        let coordinator = net.coordinator.clone();
        let monitor = net.monitor.clone();
        let (stepped, scanned) = tokio::join!(
            tokio::spawn(async move { coordinator.advance(id).await }),
            tokio::spawn(async move { monitor.scan_once().await }),
        );
        stepped.unwrap().unwrap();
        scanned.unwrap().unwrap();

        // Whatever interleaving happened, a second scan finishes the destination
        for _ in 0..3 {
            net.monitor.scan_once().await.unwrap();
        }
        let after_dst = net.order(id);
        assert_eq!(after_dst.status, SwapStatus::Refunding);
        assert!(after_dst.destination.refund_tx.is_some());
        assert!(after_dst.destination.claim_tx.is_none());
        assert_eq!(net.dst.call_count(LedgerOp::Claim), 0);
        assert_eq!(net.dst.balance(RESOLVER_DST), units(10));

        net.clock.set(order.source.timelock + 1);
        net.monitor.scan_once().await.unwrap();
        assert_eq!(net.status(id), SwapStatus::Refunded);
        assert_eq!(net.src.balance(USER), units(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pending_destination_claim_survives_concurrent_scan() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.advance_until(id, SwapStatus::DstDeposited).await;

        // the claim is broadcast but stays unconfirmed past the destination timelock
        net.dst.set_manual_confirmations(true);
        assert_eq!(
            net.coordinator.advance(id).await.unwrap(),
            StepOutcome::Advanced(SwapStatus::SecretRevealed)
        );
        let order = net.order(id);
        net.clock.set(order.destination.timelock + 1);

        let coordinator = net.coordinator.clone();
        let monitor = net.monitor.clone();
        let (stepped, scanned) = tokio::join!(
            tokio::spawn(async move { coordinator.advance(id).await }),
            tokio::spawn(async move { monitor.scan_once().await }),
        );
        assert!(matches!(stepped.unwrap().unwrap(), StepOutcome::Waiting(_)));
        assert_eq!(scanned.unwrap().unwrap().candidates, 0);
        assert_eq!(net.status(id), SwapStatus::SecretRevealed);

        net.dst.confirm_all();
        assert_eq!(
            net.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Completed
        );
        assert_eq!(net.dst.call_count(LedgerOp::Refund), 0);
        assert_eq!(net.src.call_count(LedgerOp::Refund), 0);
        assert_eq!(net.src.balance(RESOLVER_SRC), units(1));
    }

    /// Claim the destination leg as the user would, straight from the vault.
    async fn user_claims_destination(net: &TestNetwork, id: SwapId) {
        let order = net.order(id);
        let secret = net.store.load_secret(&order.hashlock).unwrap().unwrap();
        let user = LedgerAdapter::new(net.dst.clone(), USER_DST);
        user.claim(&user.deposit_ref(&order.hashlock), &secret)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_user_claim_near_timelock_adopted_not_parked() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.advance_until(id, SwapStatus::DstDeposited).await;
        user_claims_destination(&net, id).await;

        // inside the reveal window: no new claim would be sent, but this one landed
        let order = net.order(id);
        net.clock.set(order.destination.timelock - 60);
        assert_eq!(
            net.coordinator.advance(id).await.unwrap(),
            StepOutcome::Advanced(SwapStatus::SecretRevealed)
        );
        assert_eq!(
            net.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Completed
        );
        assert_eq!(net.src.balance(RESOLVER_SRC), units(1));
        assert_eq!(net.src.balance(USER), units(9));
    }

    #[tokio::test]
    async fn test_monitor_claims_source_after_user_claimed_destination() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.advance_until(id, SwapStatus::DstDeposited).await;
        user_claims_destination(&net, id).await;

        // the coordinator never runs again; the monitor reaches the order first
        let order = net.order(id);
        net.clock.set(order.destination.timelock + 1);
        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.refunded, 1);

        let settled = net.order(id);
        assert_eq!(settled.status, SwapStatus::Refunded);
        assert!(settled.destination.claim_tx.is_some());
        assert!(settled.source.claim_tx.is_some());
        assert!(settled.source.refund_tx.is_none());
        assert_eq!(net.src_escrow(&settled).unwrap().state, DepositState::Claimed);
        assert_eq!(net.src.call_count(LedgerOp::Refund), 0);
        assert_eq!(net.src.balance(RESOLVER_SRC), units(1));
        assert_eq!(net.src.balance(USER), units(9));
    }

    #[tokio::test]
    async fn test_landed_destination_claim_not_refunded() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        assert_eq!(
            net.advance_until(id, SwapStatus::SecretRevealed).await,
            SwapStatus::SecretRevealed
        );
        let order = net.order(id);
        assert_eq!(net.dst_escrow(&order).unwrap().state, DepositState::Claimed);

        // The destination claim landed; the monitor finds nothing to refund
        net.clock.set(order.destination.timelock + 1);
        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.candidates, 0);
        assert_eq!(net.dst.call_count(LedgerOp::Refund), 0);

        // The resolver still has time on the source leg
        assert_eq!(
            net.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Completed
        );
        assert_eq!(net.src.balance(RESOLVER_SRC), units(1));
    }

    #[tokio::test]
    async fn test_monitor_skips_order_held_by_coordinator() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.clock.set(net.order(id).source.timelock + 1);

        let guard = net.coordinator.locks().lock(id).await;
        assert_eq!(net.monitor.process(id).await.unwrap(), MonitorAction::Busy);
        drop(guard);

        assert_eq!(net.monitor.process(id).await.unwrap(), MonitorAction::Expired);
        assert_eq!(net.status(id), SwapStatus::Expired);
    }

    // =============================================================================
    // RETRIES
    // =============================================================================

    #[tokio::test]
    async fn test_transient_deposit_failures_retried_in_place() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.src.fail_times(
            LedgerOp::Deposit,
            AdapterError::Unavailable("connection reset".into()),
            RETRIES as usize - 1,
        );

        let outcome = net.coordinator.advance(id).await.unwrap();
        assert_eq!(outcome, StepOutcome::Advanced(SwapStatus::SrcDeposited));
        assert_eq!(net.src.call_count(LedgerOp::Deposit), RETRIES as u64);
        assert_eq!(net.src.balance(USER), units(9));
    }

    #[tokio::test]
    async fn test_exhausted_retries_wait_for_next_step() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.src.fail_times(
            LedgerOp::Deposit,
            AdapterError::RateLimited("429".into()),
            RETRIES as usize + 1,
        );

        let outcome = net.coordinator.advance(id).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Waiting(_)));
        let order = net.order(id);
        assert_eq!(order.status, SwapStatus::Created);
        assert!(order.last_error.is_some());
        assert_eq!(net.src.balance(USER), units(10));

        assert_eq!(
            net.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Completed
        );
        assert!(net.order(id).last_error.is_none());
    }

    #[tokio::test]
    async fn test_failed_refund_retried_on_next_scan() {
        let net = TestNetwork::new();
        let id = net
            .coordinator
            .create_swap(net.request().with_to_amount(units(50)))
            .await
            .unwrap()
            .id;
        assert_eq!(
            net.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Refunding
        );

        net.clock.set(net.order(id).source.timelock + 1);
        net.src.fail_times(
            LedgerOp::Refund,
            AdapterError::Unavailable("node down".into()),
            RETRIES as usize + 1,
        );
        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.errors, 1);
        assert_eq!(net.status(id), SwapStatus::Refunding);
        assert!(net.order(id).last_error.is_some());

        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.refunded, 1);
        assert_eq!(net.status(id), SwapStatus::Refunded);
        assert_eq!(net.src.balance(USER), units(10));
        assert!(net.coordinator.get_swap(id).await.unwrap().source.refund_tx.is_some());
    }
}
