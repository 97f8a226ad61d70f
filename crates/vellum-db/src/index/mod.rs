mod fulltext;
mod hash;
mod tree;

use std::collections::BTreeSet;

use vellum_query::{Cond, Value};

pub(crate) use fulltext::{matches_text, FulltextIndex};
pub(crate) use hash::HashIndex;
pub(crate) use tree::TreeIndex;

use crate::error::{Error, Result};
use crate::payload::{Payload, RowId};
use crate::schema::{IndexDef, IndexKind, NamespaceDef};

#[derive(Debug)]
pub(crate) enum IndexData {
    Hash(HashIndex),
    Tree(TreeIndex),
    Fulltext(FulltextIndex),
    /// Materialize-only ("-"): holds no structure, answers no lookups.
    Store,
}

/// One secondary index bound to resolved field positions.
#[derive(Debug)]
pub(crate) struct Index {
    pub def: IndexDef,
    pub field_positions: Vec<usize>,
    pub data: IndexData,
}

impl Index {
    pub fn build(def: IndexDef, ns_def: &NamespaceDef) -> Result<Index> {
        let field_positions: Result<Vec<usize>> = def
            .fields
            .iter()
            .map(|name| {
                ns_def.field_pos(name).ok_or_else(|| {
                    Error::Params(format!(
                        "index {:?} references unknown field {name:?}",
                        def.name
                    ))
                })
            })
            .collect();
        let field_positions = field_positions?;

        let data = match def.kind {
            IndexKind::Hash => IndexData::Hash(HashIndex::new()),
            IndexKind::Tree => IndexData::Tree(TreeIndex::new()),
            IndexKind::Fulltext => IndexData::Fulltext(FulltextIndex::new()),
            IndexKind::Store => IndexData::Store,
        };

        Ok(Index {
            def,
            field_positions,
            data,
        })
    }

    pub fn is_searchable(&self) -> bool {
        !matches!(self.data, IndexData::Store)
    }

    /// Index keys for a payload.
    ///
    /// Single-field: every scalar element (one per array element), so an
    /// array row appears under each of its values. Composite: one tuple
    /// key, and only when every constituent is present.
    pub fn keys_for(&self, payload: &Payload) -> Vec<Value> {
        if self.def.is_composite() {
            let mut parts = Vec::with_capacity(self.field_positions.len());
            for &pos in &self.field_positions {
                if !payload.present(pos) {
                    return Vec::new();
                }
                parts.push(payload.get(pos).clone());
            }
            return vec![Value::Tuple(parts)];
        }

        payload.scalars(self.field_positions[0]).to_vec()
    }

    pub fn insert(&mut self, row_id: RowId, payload: &Payload) {
        let keys = self.keys_for(payload);
        match &mut self.data {
            IndexData::Hash(idx) => idx.insert(row_id, &keys),
            IndexData::Tree(idx) => idx.insert(row_id, &keys),
            IndexData::Fulltext(idx) => idx.insert(row_id, &keys),
            IndexData::Store => {}
        }
    }

    pub fn erase(&mut self, row_id: RowId, payload: &Payload) {
        let keys = self.keys_for(payload);
        match &mut self.data {
            IndexData::Hash(idx) => idx.erase(row_id, &keys),
            IndexData::Tree(idx) => idx.erase(row_id, &keys),
            IndexData::Fulltext(idx) => idx.erase(row_id),
            IndexData::Store => {}
        }
    }

    /// Distinct key count, the planner's only statistic.
    pub fn cardinality(&self) -> usize {
        match &self.data {
            IndexData::Hash(idx) => idx.cardinality(),
            IndexData::Tree(idx) => idx.cardinality(),
            IndexData::Fulltext(idx) => idx.cardinality(),
            IndexData::Store => 0,
        }
    }

    /// Rows whose indexed field is present.
    pub fn present(&self) -> Option<&BTreeSet<RowId>> {
        match &self.data {
            IndexData::Hash(idx) => Some(idx.present()),
            IndexData::Tree(idx) => Some(idx.present()),
            IndexData::Fulltext(idx) => Some(idx.present()),
            IndexData::Store => None,
        }
    }

    /// Whether this index can answer `cond` directly. Unsupported pairs
    /// fall back to a filtered scan rather than erroring.
    pub fn supports(&self, cond: Cond) -> bool {
        match &self.data {
            IndexData::Hash(_) => matches!(cond, Cond::Eq | Cond::Set | Cond::Any | Cond::Empty),
            IndexData::Tree(_) => true,
            IndexData::Fulltext(_) => matches!(cond, Cond::Eq),
            IndexData::Store => false,
        }
    }

    /// Estimated result size of a lookup, used to order conjunction steps.
    pub fn lookup_cost(&self, cond: Cond, operand: &Value, live_rows: usize) -> usize {
        let card = self.cardinality().max(1);
        let per_key = live_rows / card;
        match cond {
            Cond::Eq => per_key,
            Cond::Set => match operand {
                Value::Tuple(items) => per_key.saturating_mul(items.len()),
                _ => per_key,
            },
            Cond::Lt | Cond::Le | Cond::Gt | Cond::Ge | Cond::Range => live_rows / 2,
            Cond::Any => self.present().map_or(live_rows, |p| p.len()),
            Cond::Empty => live_rows - self.present().map_or(0, |p| p.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType};

    fn ns_def() -> NamespaceDef {
        NamespaceDef::new("n")
            .field(FieldDef::new("age", FieldType::Int32))
            .field(FieldDef::new("genre", FieldType::Int32))
            .field(FieldDef::new("tags", FieldType::String).array())
    }

    #[test]
    fn composite_key_requires_all_fields() {
        let def = ns_def();
        let idx = Index::build(
            IndexDef::new("age+genre", IndexKind::Hash, vec!["age", "genre"]),
            &def,
        )
        .unwrap();

        let full = Payload::from_json(&def, &serde_json::json!({"age": 3, "genre": 5})).unwrap();
        assert_eq!(
            idx.keys_for(&full),
            vec![Value::Tuple(vec![Value::Int32(3), Value::Int32(5)])]
        );

        let partial = Payload::from_json(&def, &serde_json::json!({"age": 3})).unwrap();
        assert!(idx.keys_for(&partial).is_empty());
    }

    #[test]
    fn array_field_yields_one_key_per_element() {
        let def = ns_def();
        let idx = Index::build(IndexDef::new("tags", IndexKind::Hash, vec!["tags"]), &def).unwrap();
        let p =
            Payload::from_json(&def, &serde_json::json!({"tags": ["a", "b"]})).unwrap();
        assert_eq!(idx.keys_for(&p).len(), 2);
    }

    #[test]
    fn store_index_supports_nothing() {
        let def = ns_def();
        let idx = Index::build(IndexDef::new("age", IndexKind::Store, vec!["age"]), &def).unwrap();
        assert!(!idx.is_searchable());
        assert!(!idx.supports(Cond::Eq));
    }
}
