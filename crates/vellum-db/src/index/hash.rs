use std::collections::{BTreeSet, HashMap};

use vellum_query::Value;

use crate::payload::RowId;

/// Point-lookup index: key → posting set. Relies on `Value`'s hash being
/// consistent with its numeric-promotion equality, so Int32(5) and
/// Double(5.0) land in the same bucket.
#[derive(Debug, Default)]
pub(crate) struct HashIndex {
    entries: HashMap<Value, BTreeSet<RowId>>,
    present: BTreeSet<RowId>,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row_id: RowId, keys: &[Value]) {
        for key in keys {
            self.entries.entry(key.clone()).or_default().insert(row_id);
        }
        if !keys.is_empty() {
            self.present.insert(row_id);
        }
    }

    pub fn erase(&mut self, row_id: RowId, keys: &[Value]) {
        for key in keys {
            if let Some(posting) = self.entries.get_mut(key) {
                posting.remove(&row_id);
                if posting.is_empty() {
                    self.entries.remove(key);
                }
            }
        }
        self.present.remove(&row_id);
    }

    pub fn get(&self, key: &Value) -> BTreeSet<RowId> {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn cardinality(&self) -> usize {
        self.entries.len()
    }

    pub fn present(&self) -> &BTreeSet<RowId> {
        &self.present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_promotion_finds_cross_type_keys() {
        let mut idx = HashIndex::new();
        idx.insert(1, &[Value::Int32(100)]);
        assert_eq!(idx.get(&Value::Int64(100)), BTreeSet::from([1]));
        assert_eq!(idx.get(&Value::Double(100.0)), BTreeSet::from([1]));
    }

    #[test]
    fn tuple_keys_work_for_composite() {
        let mut idx = HashIndex::new();
        let key = Value::Tuple(vec![Value::Int32(3), Value::Int32(5)]);
        idx.insert(9, &[key.clone()]);
        assert_eq!(idx.get(&key), BTreeSet::from([9]));
    }
}
