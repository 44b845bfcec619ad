//! # Crash Recovery
//!
//! A coordinator restarted on the same file-backed store must pick up every
//! open order where it stopped, without repeating a chain call whose
//! transaction was already recorded.

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use swap_core::adapters::{FileBackedKVStore, KvOrderStore, LedgerOp};
    use swap_core::{AdapterError, OrderStore, StepOutcome, SwapApi, SwapStatus};

    use crate::harness::*;

    fn file_store(path: &Path) -> Arc<dyn OrderStore> {
        Arc::new(KvOrderStore::new(FileBackedKVStore::open(path).unwrap()))
    }

    #[tokio::test]
    async fn test_restart_resumes_driver_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");

        let net = TestNetwork::with_store(file_store(&path));
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        assert_eq!(
            net.advance_until(id, SwapStatus::SrcDeposited).await,
            SwapStatus::SrcDeposited
        );

        let restarted = net.restart(file_store(&path));
        drop(net.coordinator);
        assert_eq!(restarted.status(id), SwapStatus::SrcDeposited);
        assert_eq!(restarted.coordinator.resume_open_orders().unwrap(), 1);

        let mut status = restarted.status(id);
        for _ in 0..200 {
            if status == SwapStatus::Completed {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = restarted.status(id);
        }
        assert_eq!(status, SwapStatus::Completed);
        assert_eq!(restarted.src.call_count(LedgerOp::Deposit), 1);
        assert_eq!(restarted.src.balance(RESOLVER_SRC), units(1));
    }

    #[tokio::test]
    async fn test_recorded_deposit_is_confirmed_not_resent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");

        let net = TestNetwork::with_store(file_store(&path));
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.src
            .fail_next(LedgerOp::WaitForConfirmation, AdapterError::Timeout("deposit".into()));

        let outcome = net.coordinator.advance(id).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Waiting(_)));
        let order = net.order(id);
        assert_eq!(order.status, SwapStatus::Created);
        assert!(order.source.deposit_tx.is_some());

        let restarted = net.restart(file_store(&path));
        assert_eq!(
            restarted.advance_until(id, SwapStatus::SrcDeposited).await,
            SwapStatus::SrcDeposited
        );
        assert_eq!(restarted.src.call_count(LedgerOp::Deposit), 1);
        assert_eq!(restarted.src.balance(USER), units(9));
        assert!(restarted.order(id).last_error.is_none());
    }

    #[tokio::test]
    async fn test_revealed_secret_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");

        let net = TestNetwork::with_store(file_store(&path));
        let id = net.coordinator.create_swap(net.request()).await.unwrap().id;
        assert_eq!(
            net.advance_until(id, SwapStatus::SecretRevealed).await,
            SwapStatus::SecretRevealed
        );

        let restarted = net.restart(file_store(&path));
        let order = restarted.order(id);
        assert!(order.secret.is_some());

        assert_eq!(
            restarted.advance_until(id, SwapStatus::Completed).await,
            SwapStatus::Completed
        );
        assert_eq!(restarted.dst.balance(USER_DST), units(1));
        assert_eq!(restarted.src.balance(RESOLVER_SRC), units(1));
        assert_eq!(restarted.dst.call_count(LedgerOp::Claim), 1);
    }

    #[tokio::test]
    async fn test_terminal_orders_not_resumed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.db");

        let net = TestNetwork::with_store(file_store(&path));
        let done = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.advance_until(done, SwapStatus::Completed).await;
        let cancelled = net.coordinator.create_swap(net.request()).await.unwrap().id;
        net.coordinator.cancel_swap(cancelled).await.unwrap();

        let restarted = net.restart(file_store(&path));
        assert_eq!(restarted.coordinator.resume_open_orders().unwrap(), 0);
        assert_eq!(restarted.coordinator.list_swaps(None).await.unwrap().len(), 2);
    }
}
