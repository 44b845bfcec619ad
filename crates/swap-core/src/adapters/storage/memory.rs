use std::collections::BTreeMap;

use crate::domain::StoreError;
use crate::ports::outbound::{BatchOperation, KeyValueStore};

/// In-memory key-value store for tests and throwaway nodes.
///
/// Keys are ordered, so prefix scans come back sorted.
#[derive(Default)]
pub struct InMemoryKVStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryKVStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KeyValueStore for InMemoryKVStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    fn atomic_batch_write(&mut self, operations: Vec<BatchOperation>) -> Result<(), StoreError> {
        for op in operations {
            match op {
                BatchOperation::Put { key, value } => {
                    self.data.insert(key, value);
                }
                BatchOperation::Delete { key } => {
                    self.data.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_kv_store() {
        let mut store = InMemoryKVStore::new();

        store.put(b"order:1", b"a").unwrap();
        store.put(b"order:2", b"b").unwrap();
        store.put(b"secret:1", b"c").unwrap();

        assert_eq!(store.get(b"order:1").unwrap(), Some(b"a".to_vec()));
        assert_eq!(store.get(b"order:3").unwrap(), None);
        assert!(store.exists(b"secret:1").unwrap());

        store.delete(b"secret:1").unwrap();
        assert!(!store.exists(b"secret:1").unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_prefix_scan_sorted() {
        let mut store = InMemoryKVStore::new();
        store.put(b"expiry:b", b"2").unwrap();
        store.put(b"expiry:a", b"1").unwrap();
        store.put(b"expirz", b"x").unwrap();

        let keys: Vec<_> = store
            .prefix_scan(b"expiry:")
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"expiry:a".to_vec(), b"expiry:b".to_vec()]);
    }

    #[test]
    fn test_batch_write() {
        let mut store = InMemoryKVStore::new();
        store.put(b"old", b"1").unwrap();
        store
            .atomic_batch_write(vec![
                BatchOperation::put(b"new".to_vec(), b"2".to_vec()),
                BatchOperation::delete(b"old".to_vec()),
            ])
            .unwrap();
        assert!(!store.exists(b"old").unwrap());
        assert_eq!(store.get(b"new").unwrap(), Some(b"2".to_vec()));
    }
}
