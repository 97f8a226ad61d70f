use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use vellum_query::{Cond, Value};

use crate::error::{Error, Result};
use crate::index::{Index, IndexData};
use crate::payload::{Payload, RowId};

/// Result of evaluating one predicate against one index: a deduplicated
/// row-id set (ascending iteration) plus match scores when the index
/// ranks its results.
pub(crate) struct Selection {
    pub rows: BTreeSet<RowId>,
    pub scores: Option<HashMap<RowId, f64>>,
}

impl Selection {
    fn plain(rows: BTreeSet<RowId>) -> Selection {
        Selection { rows, scores: None }
    }
}

/// Evaluate `(index, cond, operand)` over the namespace's live set.
///
/// The planner routes only supported (index kind, cond) pairs here;
/// anything else is an engine bug.
pub(crate) fn select(
    index: &Index,
    cond: Cond,
    operand: &Value,
    rows: &BTreeMap<RowId, Payload>,
) -> Result<Selection> {
    match &index.data {
        IndexData::Hash(idx) => match cond {
            Cond::Eq => Ok(Selection::plain(idx.get(operand))),
            Cond::Set => {
                let items = set_items(operand)?;
                let mut out = BTreeSet::new();
                for item in items {
                    out.extend(idx.get(item));
                }
                Ok(Selection::plain(out))
            }
            Cond::Any => Ok(Selection::plain(idx.present().clone())),
            Cond::Empty => Ok(Selection::plain(complement(rows, idx.present()))),
            other => Err(unsupported(index, other)),
        },
        IndexData::Tree(idx) => match cond {
            Cond::Eq => Ok(Selection::plain(idx.get(operand))),
            Cond::Set => {
                let items = set_items(operand)?;
                let mut out = BTreeSet::new();
                for item in items {
                    out.extend(idx.get(item));
                }
                Ok(Selection::plain(out))
            }
            Cond::Lt => Ok(Selection::plain(
                idx.range(Bound::Unbounded, Bound::Excluded(operand)),
            )),
            Cond::Le => Ok(Selection::plain(
                idx.range(Bound::Unbounded, Bound::Included(operand)),
            )),
            Cond::Gt => Ok(Selection::plain(
                idx.range(Bound::Excluded(operand), Bound::Unbounded),
            )),
            Cond::Ge => Ok(Selection::plain(
                idx.range(Bound::Included(operand), Bound::Unbounded),
            )),
            Cond::Range => {
                let (lo, hi) = range_bounds(operand)?;
                Ok(Selection::plain(
                    idx.range(Bound::Included(lo), Bound::Included(hi)),
                ))
            }
            Cond::Any => Ok(Selection::plain(idx.present().clone())),
            Cond::Empty => Ok(Selection::plain(complement(rows, idx.present()))),
        },
        IndexData::Fulltext(idx) => match cond {
            Cond::Eq => {
                let term = match operand {
                    Value::String(s) => s,
                    other => {
                        return Err(Error::Params(format!(
                            "fulltext lookup expects a string, got {}",
                            other.type_name()
                        )))
                    }
                };
                let scores = idx.lookup(term);
                let rows = scores.keys().copied().collect();
                Ok(Selection {
                    rows,
                    scores: Some(scores),
                })
            }
            other => Err(unsupported(index, other)),
        },
        IndexData::Store => Err(Error::logic(format!(
            "store index {:?} reached the selector",
            index.def.name
        ))),
    }
}

fn unsupported(index: &Index, cond: Cond) -> Error {
    Error::logic(format!(
        "index {:?} cannot answer {}",
        index.def.name,
        cond.name()
    ))
}

fn complement(rows: &BTreeMap<RowId, Payload>, present: &BTreeSet<RowId>) -> BTreeSet<RowId> {
    rows.keys().filter(|id| !present.contains(id)).copied().collect()
}

pub(crate) fn set_items(operand: &Value) -> Result<&[Value]> {
    match operand {
        Value::Tuple(items) => Ok(items),
        other => Err(Error::Params(format!(
            "SET expects a value list, got {}",
            other.type_name()
        ))),
    }
}

pub(crate) fn range_bounds(operand: &Value) -> Result<(&Value, &Value)> {
    match operand {
        Value::Tuple(items) if items.len() == 2 => Ok((&items[0], &items[1])),
        _ => Err(Error::Params("RANGE expects exactly two bounds".into())),
    }
}

/// Any-element condition check used for residual filtering: true when some
/// scalar of the field satisfies `cond operand`.
pub(crate) fn matches_scalars(scalars: &[Value], cond: Cond, operand: &Value) -> bool {
    match cond {
        Cond::Any => !scalars.is_empty(),
        Cond::Empty => scalars.is_empty(),
        _ => scalars.iter().any(|v| matches_one(v, cond, operand)),
    }
}

pub(crate) fn matches_one(value: &Value, cond: Cond, operand: &Value) -> bool {
    match cond {
        Cond::Eq => value == operand,
        Cond::Lt => value.compare(operand) == Ordering::Less,
        Cond::Le => value.compare(operand) != Ordering::Greater,
        Cond::Gt => value.compare(operand) == Ordering::Greater,
        Cond::Ge => value.compare(operand) != Ordering::Less,
        Cond::Set => match operand {
            Value::Tuple(items) => items.contains(value),
            _ => false,
        },
        Cond::Range => match operand {
            Value::Tuple(items) if items.len() == 2 => {
                value.compare(&items[0]) != Ordering::Less
                    && value.compare(&items[1]) != Ordering::Greater
            }
            _ => false,
        },
        Cond::Any | Cond::Empty => false,
    }
}
