use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

use vellum_query::Value;

use crate::payload::RowId;

/// Ordered index: key → posting set. `Value`'s total order (numeric
/// promotion, NaN last, byte-wise strings, lexicographic tuples) is the
/// iteration order, so composite keys need no byte encoding tricks.
#[derive(Debug, Default)]
pub(crate) struct TreeIndex {
    entries: BTreeMap<Value, BTreeSet<RowId>>,
    present: BTreeSet<RowId>,
}

impl TreeIndex {
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

    pub fn range(&self, lower: Bound<&Value>, upper: Bound<&Value>) -> BTreeSet<RowId> {
        // An inverted interval yields nothing (and would panic in BTreeMap).
        if let (
            Bound::Included(lo) | Bound::Excluded(lo),
            Bound::Included(hi) | Bound::Excluded(hi),
        ) = (lower, upper)
        {
            if lo > hi {
                return BTreeSet::new();
            }
        }
        let mut out = BTreeSet::new();
        for (_, posting) in self.entries.range::<Value, _>((lower, upper)) {
            out.extend(posting.iter().copied());
        }
        out
    }

    /// Keys with their postings, in index order.
    pub fn iter_ordered(
        &self,
        desc: bool,
    ) -> Box<dyn Iterator<Item = (&Value, &BTreeSet<RowId>)> + '_> {
        if desc {
            Box::new(self.entries.iter().rev())
        } else {
            Box::new(self.entries.iter())
        }
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
    fn range_is_closed_and_handles_inversion() {
        let mut idx = TreeIndex::new();
        for (row, year) in [(1u64, 2001), (2, 2005), (3, 2010)] {
            idx.insert(row, &[Value::Int32(year)]);
        }
        let hits = idx.range(
            Bound::Included(&Value::Int32(2001)),
            Bound::Included(&Value::Int32(2005)),
        );
        assert_eq!(hits, BTreeSet::from([1, 2]));

        let empty = idx.range(
            Bound::Included(&Value::Int32(2010)),
            Bound::Included(&Value::Int32(2001)),
        );
        assert!(empty.is_empty());
    }

    #[test]
    fn erase_drops_empty_postings() {
        let mut idx = TreeIndex::new();
        idx.insert(1, &[Value::Int32(5)]);
        idx.erase(1, &[Value::Int32(5)]);
        assert_eq!(idx.cardinality(), 0);
        assert!(idx.present().is_empty());
    }

    #[test]
    fn array_keys_point_at_one_row() {
        let mut idx = TreeIndex::new();
        idx.insert(1, &[Value::Int32(1), Value::Int32(2)]);
        assert_eq!(idx.get(&Value::Int32(1)), BTreeSet::from([1]));
        assert_eq!(idx.get(&Value::Int32(2)), BTreeSet::from([1]));
        assert_eq!(idx.present().len(), 1);
    }
}
