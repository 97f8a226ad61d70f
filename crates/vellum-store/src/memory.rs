use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::RwLock;

use crate::error::StoreError;
use crate::store::{BatchOp, Store};

/// BTreeMap-backed store. Batches apply under one write-lock acquisition,
/// which gives the crash-atomicity contract trivially.
#[derive(Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Store for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(key).cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.data.write().remove(key);
        Ok(())
    }

    fn range(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let data = self.data.read();
        let items = data
            .range((Bound::Included(prefix.to_vec()), Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(items)
    }

    fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let store = MemoryStore::new();
        store.put(b"a", b"1").unwrap();
        assert_eq!(store.get(b"a").unwrap(), Some(b"1".to_vec()));
        store.delete(b"a").unwrap();
        assert_eq!(store.get(b"a").unwrap(), None);
    }

    #[test]
    fn range_respects_prefix_and_order() {
        let store = MemoryStore::new();
        store.put(b"r/2", b"b").unwrap();
        store.put(b"r/1", b"a").unwrap();
        store.put(b"s/1", b"x").unwrap();
        let items = store.range(b"r/").unwrap();
        assert_eq!(
            items,
            vec![
                (b"r/1".to_vec(), b"a".to_vec()),
                (b"r/2".to_vec(), b"b".to_vec()),
            ]
        );
    }

    #[test]
    fn batch_commit_applies_all_ops() {
        let store = MemoryStore::new();
        store.put(b"old", b"x").unwrap();
        store
            .batch_commit(vec![
                BatchOp::Put {
                    key: b"new".to_vec(),
                    value: b"y".to_vec(),
                },
                BatchOp::Delete {
                    key: b"old".to_vec(),
                },
            ])
            .unwrap();
        assert_eq!(store.get(b"new").unwrap(), Some(b"y".to_vec()));
        assert_eq!(store.get(b"old").unwrap(), None);
    }
}
