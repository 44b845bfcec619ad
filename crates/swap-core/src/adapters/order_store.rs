//! # Order Store
//!
//! [`OrderStore`] over any [`KeyValueStore`].
//!
//! ## Key layout
//!
//! | Key | Value |
//! |-----|-------|
//! | `order:{id}` | order JSON |
//! | `hashlock:{from}:{to}:{hex}` | owning order id |
//! | `expiry:{status}:{timelock:020}:{id}` | empty |
//! | `secret:{hex}` | secret (hex JSON string) |
//! | `open:{id}` | empty, present until the order is terminal |
//!
//! Every mutation of one order is a single `atomic_batch_write`. The hashlock
//! index entry is released once an order ends without paying out
//! (`Refunded`, `Expired`, `Failed`); a `Completed` order keeps it because its
//! secret is public and the hashlock must never back a new swap.

use parking_lot::RwLock;

use crate::domain::{Hashlock, SecureSecret, StoreError, SwapId, SwapOrder, SwapStatus};
use crate::ports::outbound::{BatchOperation, KeyValueStore, OrderStore};

const ORDER_PREFIX: &str = "order:";
const EXPIRY_PREFIX: &str = "expiry:";
const OPEN_PREFIX: &str = "open:";

fn order_key(id: SwapId) -> String {
    format!("{}{}", ORDER_PREFIX, id)
}

fn hashlock_key(order: &SwapOrder) -> String {
    format!(
        "hashlock:{}:{}:{}",
        order.from_chain(),
        order.to_chain(),
        order.hashlock.to_hex()
    )
}

fn open_key(id: SwapId) -> String {
    format!("{}{}", OPEN_PREFIX, id)
}

fn secret_key(hashlock: &Hashlock) -> String {
    format!("secret:{}", hashlock.to_hex())
}

fn expiry_key(order: &SwapOrder) -> Option<String> {
    order
        .relevant_timelock()
        .map(|t| format!("{}{}:{:020}:{}", EXPIRY_PREFIX, order.status, t, order.id))
}

fn releases_hashlock(status: SwapStatus) -> bool {
    matches!(
        status,
        SwapStatus::Refunded | SwapStatus::Expired | SwapStatus::Failed
    )
}

fn encode(order: &SwapOrder) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(order).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<SwapOrder, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Order store backed by a key-value database.
pub struct KvOrderStore<S> {
    kv: RwLock<S>,
}

impl<S: KeyValueStore> KvOrderStore<S> {
    /// Wrap a key-value store.
    pub fn new(kv: S) -> Self {
        Self { kv: RwLock::new(kv) }
    }

    fn load(kv: &S, id: SwapId) -> Result<Option<SwapOrder>, StoreError> {
        kv.get(order_key(id).as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn scan_orders(&self) -> Result<Vec<SwapOrder>, StoreError> {
        let kv = self.kv.read();
        kv.prefix_scan(ORDER_PREFIX.as_bytes())?
            .into_iter()
            .map(|(_, bytes)| decode(&bytes))
            .collect()
    }
}

impl<S: KeyValueStore> OrderStore for KvOrderStore<S> {
    fn insert(&self, order: &SwapOrder, secret: &SecureSecret) -> Result<(), StoreError> {
        let mut kv = self.kv.write();
        let key = order_key(order.id);
        if kv.exists(key.as_bytes())? {
            return Err(StoreError::DuplicateId(order.id));
        }
        let index = hashlock_key(order);
        if kv.exists(index.as_bytes())? {
            return Err(StoreError::HashlockInUse(order.hashlock));
        }
        let secret_json =
            serde_json::to_vec(secret).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut batch = vec![
            BatchOperation::put(key, encode(order)?),
            BatchOperation::put(index, order.id.to_string()),
            BatchOperation::put(secret_key(&order.hashlock), secret_json),
        ];
        if !order.status.is_terminal() {
            batch.push(BatchOperation::put(open_key(order.id), Vec::new()));
        }
        if let Some(expiry) = expiry_key(order) {
            batch.push(BatchOperation::put(expiry, Vec::new()));
        }
        kv.atomic_batch_write(batch)
    }

    fn get(&self, id: SwapId) -> Result<Option<SwapOrder>, StoreError> {
        Self::load(&self.kv.read(), id)
    }

    fn compare_and_swap(&self, expected: SwapStatus, order: &SwapOrder) -> Result<(), StoreError> {
        let mut kv = self.kv.write();
        let stored = Self::load(&kv, order.id)?.ok_or(StoreError::NotFound(order.id))?;
        if stored.status != expected {
            return Err(StoreError::StatusConflict {
                id: order.id,
                expected,
                actual: stored.status,
            });
        }

        let mut batch = vec![BatchOperation::put(order_key(order.id), encode(order)?)];
        let old_expiry = expiry_key(&stored);
        let new_expiry = expiry_key(order);
        if old_expiry != new_expiry {
            if let Some(old) = old_expiry {
                batch.push(BatchOperation::delete(old));
            }
            if let Some(new) = new_expiry {
                batch.push(BatchOperation::put(new, Vec::new()));
            }
        }
        if releases_hashlock(order.status) && !releases_hashlock(stored.status) {
            batch.push(BatchOperation::delete(hashlock_key(order)));
        }
        if order.status.is_terminal() && !stored.status.is_terminal() {
            batch.push(BatchOperation::delete(open_key(order.id)));
        }
        kv.atomic_batch_write(batch)
    }

    fn list(&self, status: Option<SwapStatus>) -> Result<Vec<SwapOrder>, StoreError> {
        let mut orders: Vec<_> = self
            .scan_orders()?
            .into_iter()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .collect();
        orders.sort_by_key(|o| (o.created_at, o.id));
        Ok(orders)
    }

    fn expiry_candidates(&self, now: u64) -> Result<Vec<SwapId>, StoreError> {
        let kv = self.kv.read();
        let mut ids = Vec::new();
        for (key, _) in kv.prefix_scan(EXPIRY_PREFIX.as_bytes())? {
            let key = String::from_utf8(key)
                .map_err(|_| StoreError::Corrupted("non UTF-8 expiry key".into()))?;
            let mut parts = key[EXPIRY_PREFIX.len()..].splitn(3, ':');
            let (_status, timelock, id) = match (parts.next(), parts.next(), parts.next()) {
                (Some(s), Some(t), Some(i)) => (s, t, i),
                _ => return Err(StoreError::Corrupted(format!("bad expiry key {}", key))),
            };
            let timelock: u64 = timelock
                .parse()
                .map_err(|_| StoreError::Corrupted(format!("bad timelock in {}", key)))?;
            if timelock < now {
                let id = id
                    .parse()
                    .map_err(|_| StoreError::Corrupted(format!("bad id in {}", key)))?;
                ids.push(id);
            }
        }
        Ok(ids)
    }

    fn open_orders(&self) -> Result<Vec<SwapId>, StoreError> {
        let kv = self.kv.read();
        kv.prefix_scan(OPEN_PREFIX.as_bytes())?
            .into_iter()
            .map(|(key, _)| {
                std::str::from_utf8(&key[OPEN_PREFIX.len()..])
                    .ok()
                    .and_then(|id| id.parse().ok())
                    .ok_or_else(|| {
                        StoreError::Corrupted(format!("bad open key {}", String::from_utf8_lossy(&key)))
                    })
            })
            .collect()
    }

    fn load_secret(&self, hashlock: &Hashlock) -> Result<Option<SecureSecret>, StoreError> {
        let kv = self.kv.read();
        kv.get(secret_key(hashlock).as_bytes())?
            .map(|bytes| {
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryKVStore;
    use crate::algorithms::SecretManager;
    use crate::domain::{Amount, AssetId, ChainId, FailureReason, LegParams, SwapOrderBuilder, TxRef};

    fn order(hashlock: Hashlock) -> SwapOrder {
        let leg = |chain, timelock| LegParams {
            chain,
            asset: AssetId::Native,
            amount: Amount::from(10u64),
            depositor: "a".into(),
            claimer: "b".into(),
            timelock,
        };
        SwapOrderBuilder::new(hashlock, 100)
            .source(leg(ChainId::Ethereum, 3_700))
            .destination(leg(ChainId::Near, 1_900))
            .build()
            .unwrap()
    }

    fn store() -> KvOrderStore<InMemoryKVStore> {
        KvOrderStore::new(InMemoryKVStore::new())
    }

    #[test]
    fn test_insert_and_get() {
        let store = store();
        let (secret, hashlock) = SecretManager::new().generate_pair();
        let order = order(hashlock);
        store.insert(&order, &secret).unwrap();

        let loaded = store.get(order.id).unwrap().unwrap();
        assert_eq!(loaded.hashlock, hashlock);
        assert_eq!(loaded.status, SwapStatus::Created);
        assert!(store.load_secret(&hashlock).unwrap().unwrap().ct_eq(&secret));
    }

    #[test]
    fn test_hashlock_conflict() {
        let store = store();
        let (secret, hashlock) = SecretManager::new().generate_pair();
        store.insert(&order(hashlock), &secret).unwrap();

        let second = order(hashlock);
        assert_eq!(
            store.insert(&second, &secret),
            Err(StoreError::HashlockInUse(hashlock))
        );
        assert!(store.get(second.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_id() {
        let store = store();
        let manager = SecretManager::new();
        let (secret, hashlock) = manager.generate_pair();
        let first = order(hashlock);
        store.insert(&first, &secret).unwrap();

        let (_, other_hashlock) = manager.generate_pair();
        let mut second = order(other_hashlock);
        second.id = first.id;
        assert_eq!(
            store.insert(&second, &secret),
            Err(StoreError::DuplicateId(first.id))
        );
    }

    #[test]
    fn test_compare_and_swap_conflict() {
        let store = store();
        let (secret, hashlock) = SecretManager::new().generate_pair();
        let mut order = order(hashlock);
        store.insert(&order, &secret).unwrap();

        order.source.deposit_tx = Some(TxRef("0x01".into()));
        order.transition_to(SwapStatus::SrcDeposited, 200).unwrap();
        store.compare_and_swap(SwapStatus::Created, &order).unwrap();

        let stale = store.compare_and_swap(SwapStatus::Created, &order);
        assert_eq!(
            stale,
            Err(StoreError::StatusConflict {
                id: order.id,
                expected: SwapStatus::Created,
                actual: SwapStatus::SrcDeposited,
            })
        );
    }

    #[test]
    fn test_expiry_index_follows_status() {
        let store = store();
        let (secret, hashlock) = SecretManager::new().generate_pair();
        let mut order = order(hashlock);
        store.insert(&order, &secret).unwrap();

        assert!(store.expiry_candidates(3_700).unwrap().is_empty());
        assert_eq!(store.expiry_candidates(3_701).unwrap(), vec![order.id]);

        order.source.deposit_tx = Some(TxRef("0x01".into()));
        order.transition_to(SwapStatus::SrcDeposited, 200).unwrap();
        store.compare_and_swap(SwapStatus::Created, &order).unwrap();
        order.destination.deposit_tx = Some(TxRef("0x02".into()));
        order.transition_to(SwapStatus::DstDeposited, 300).unwrap();
        store.compare_and_swap(SwapStatus::SrcDeposited, &order).unwrap();

        // now keyed on the destination timelock
        assert_eq!(store.expiry_candidates(1_901).unwrap(), vec![order.id]);

        order.fail(FailureReason::Rejected("test".into()), 400).unwrap();
        store.compare_and_swap(SwapStatus::DstDeposited, &order).unwrap();
        assert!(store.expiry_candidates(u64::MAX).unwrap().is_empty());
    }

    #[test]
    fn test_terminal_failure_releases_hashlock() {
        let store = store();
        let (secret, hashlock) = SecretManager::new().generate_pair();
        let mut first = order(hashlock);
        store.insert(&first, &secret).unwrap();

        first.fail(FailureReason::Cancelled, 150).unwrap();
        store.compare_and_swap(SwapStatus::Created, &first).unwrap();

        assert!(store.insert(&order(hashlock), &secret).is_ok());
        assert_eq!(store.open_orders().unwrap().len(), 1);
        assert_eq!(store.list(Some(SwapStatus::Failed)).unwrap().len(), 1);
    }

    #[test]
    fn test_open_index_drops_terminal_orders() {
        let store = store();
        let manager = SecretManager::new();
        let (s1, h1) = manager.generate_pair();
        let (s2, h2) = manager.generate_pair();
        let mut done = order(h1);
        let live = order(h2);
        store.insert(&done, &s1).unwrap();
        store.insert(&live, &s2).unwrap();

        let mut open = store.open_orders().unwrap();
        open.sort();
        let mut expected = vec![done.id, live.id];
        expected.sort();
        assert_eq!(open, expected);

        done.fail(FailureReason::Cancelled, 150).unwrap();
        store.compare_and_swap(SwapStatus::Created, &done).unwrap();
        assert_eq!(store.open_orders().unwrap(), vec![live.id]);
        // the terminal order itself stays readable
        assert_eq!(store.get(done.id).unwrap().unwrap().status, SwapStatus::Failed);
    }
}
