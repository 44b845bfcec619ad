//! # End-to-End Swap Flows
//!
//! One order at a time through the coordinator and the expiry monitor, with
//! balances checked on both ledgers.
//!
//! ## Flows Tested:
//!
//! 1. **Happy path**: both deposits, reveal, both claims, `Completed`
//! 2. **Missing destination deposit**: source refunded after its timelock
//! 3. **Wrong secret**: claim rejected on chain, order untouched
//! 4. **Hashlock conflict**: concurrent creation with one secret

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use swap_core::adapters::LedgerAdapter;
    use swap_core::{
        AdapterError, ChainAdapter, DepositState, SecureSecret, SwapApi, SwapError, SwapStatus,
    };

    use crate::harness::*;

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    #[tokio::test]
    async fn test_happy_path_moves_funds_both_ways() {
        let net = TestNetwork::new();
        let order = net
            .coordinator
            .create_swap(net.request().with_timelocks(NOW + 3_600, NOW + 1_800))
            .await
            .unwrap();
        assert!(order.destination.timelock < order.source.timelock);

        let status = net.advance_until(order.id, SwapStatus::Completed).await;
        assert_eq!(status, SwapStatus::Completed);

        // User paid on the source chain and received on the destination chain
        assert_eq!(net.src.balance(USER), units(9));
        assert_eq!(net.dst.balance(USER_DST), units(1));
        // Resolver mirrored it
        assert_eq!(net.dst.balance(RESOLVER_DST), units(9));
        assert_eq!(net.src.balance(RESOLVER_SRC), units(1));

        let done = net.order(order.id);
        assert!(done.secret.is_some());
        assert!(done.source.claim_tx.is_some());
        assert!(done.destination.claim_tx.is_some());
        assert_eq!(net.src_escrow(&done).unwrap().state, DepositState::Claimed);
        assert_eq!(net.dst_escrow(&done).unwrap().state, DepositState::Claimed);
    }

    #[tokio::test]
    async fn test_refund_after_claim_is_rejected() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        assert_eq!(
            net.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Completed
        );

        let order = net.order(id);
        net.clock.set(order.source.timelock + 1);
        let resolver = LedgerAdapter::new(net.dst.clone(), RESOLVER_DST);
        let result = resolver.refund(&resolver.deposit_ref(&order.hashlock)).await;
        assert!(matches!(result, Err(AdapterError::AlreadyClaimed)));

        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.candidates, 0);
        assert_eq!(net.dst.balance(RESOLVER_DST), units(9));
    }

    #[tokio::test]
    async fn test_reversed_timelocks_rejected() {
        let net = TestNetwork::new();
        let result = net
            .coordinator
            .create_swap(net.request().with_timelocks(NOW + 1_800, NOW + 3_600))
            .await;

        assert!(matches!(result, Err(SwapError::InvalidTimelocks { .. })));
        assert!(net.coordinator.list_swaps(None).await.unwrap().is_empty());
    }

    // =============================================================================
    // MISSING DESTINATION DEPOSIT
    // =============================================================================

    #[tokio::test]
    async fn test_missing_destination_deposit_refunds_source_after_its_timelock() {
        let net = TestNetwork::new();
        // Resolver holds 10 units on Near and cannot fund 50
        let id = net
            .coordinator
            .create_swap(net.request().with_to_amount(units(50)))
            .await
            .unwrap()
            .id;

        let status = net.advance_until(id, SwapStatus::Completed).await;
        assert_eq!(status, SwapStatus::Refunding);
        let order = net.order(id);
        assert!(order.destination.deposit_tx.is_none());
        assert!(order.last_error.is_some());
        assert_eq!(net.src.balance(USER), units(9));

        // Destination timelock passing changes nothing: the source is still locked
        net.clock.set(order.destination.timelock + 1);
        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.refunded, 0);
        assert_eq!(net.status(id), SwapStatus::Refunding);
        assert_eq!(net.src_escrow(&order).unwrap().state, DepositState::Locked);

        net.clock.set(order.source.timelock + 1);
        let report = net.monitor.scan_once().await.unwrap();
        assert_eq!(report.refunded, 1);

        let refunded = net.order(id);
        assert_eq!(refunded.status, SwapStatus::Refunded);
        assert!(refunded.source.refund_tx.is_some());
        assert!(refunded.secret.is_none());
        assert_eq!(net.src.balance(USER), units(10));
        assert_eq!(net.dst.balance(USER_DST), units(0));
    }

    // =============================================================================
    // WRONG SECRET
    // =============================================================================

    #[tokio::test]
    async fn test_claim_with_wrong_secret_moves_nothing() {
        let net = TestNetwork::new();
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        assert_eq!(
            net.advance_until(id, SwapStatus::DstDeposited).await,
            SwapStatus::DstDeposited
        );

        let order = net.order(id);
        let user = LedgerAdapter::new(net.dst.clone(), USER_DST);
        let forged = SecureSecret::new([0xAB; 32]);
        let result = user.claim(&user.deposit_ref(&order.hashlock), &forged).await;

        assert!(matches!(result, Err(AdapterError::InvalidSecret)));
        assert_eq!(net.status(id), SwapStatus::DstDeposited);
        assert_eq!(net.dst.balance(USER_DST), units(0));
        assert_eq!(net.dst_escrow(&order).unwrap().state, DepositState::Locked);
    }

    // =============================================================================
    // HASHLOCK CONFLICT
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_creation_with_one_hashlock_conflicts() {
        let net = TestNetwork::new();
        let secret = SecureSecret::new([0x42; 32]);

        let mut handles = Vec::new();
        for _ in 0..2 {
            let coordinator = Arc::clone(&net.coordinator);
            let request = net.request().with_secret(secret.clone());
            handles.push(tokio::spawn(async move {
                coordinator.create_swap(request).await
            }));
        }

        let mut created = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(SwapError::HashlockInUse(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!((created, conflicts), (1, 1));
        assert_eq!(net.coordinator.list_swaps(None).await.unwrap().len(), 1);
    }
}
