use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;

use vellum_query::{Cond, Value};

use crate::aggregator::{aggregate, AggResult};
use crate::error::{Error, Result};
use crate::index::{matches_text, IndexData};
use crate::namespace::NamespaceCore;
use crate::payload::{Payload, RowId};
use crate::planner::{
    Conjunction, FieldRef, Plan, PlanFilter, ResolvedCond, ResolvedNode, SortStrategy,
};
use crate::selector::{matches_one, matches_scalars, select};

/// Rows between cancellation checks while materializing.
const CHECK_INTERVAL: usize = 1024;

/// Per-query cancellation token and deadline, checked between index-merge
/// steps and between materialization batches.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    deadline: Option<Instant>,
    cancel: Option<Arc<AtomicBool>>,
}

impl QueryContext {
    pub fn new() -> QueryContext {
        QueryContext::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn check(&self) -> Result<()> {
        if let Some(cancel) = &self.cancel {
            if cancel.load(AtomicOrdering::Relaxed) {
                return Err(Error::Query("query canceled".into()));
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Query("deadline exceeded".into()));
            }
        }
        Ok(())
    }
}

/// The materialized output of one plan over one namespace snapshot.
pub(crate) struct Executed {
    pub items: Vec<(RowId, Payload)>,
    pub total: Option<usize>,
    pub aggregations: Vec<AggResult>,
}

pub(crate) fn execute(core: &NamespaceCore, plan: &Plan, ctx: &QueryContext) -> Result<Executed> {
    let mut scores: HashMap<RowId, f64> = HashMap::new();
    let matched = match &plan.filter {
        PlanFilter::All => core.rows().keys().copied().collect(),
        PlanFilter::Dnf(conjunctions) => {
            let mut result = BTreeSet::new();
            for conjunction in conjunctions {
                ctx.check()?;
                result.extend(eval_conjunction(core, conjunction, plan, ctx, &mut scores)?);
            }
            result
        }
        PlanFilter::Tree(node) => {
            let mut result = BTreeSet::new();
            for (i, (&row_id, payload)) in core.rows().iter().enumerate() {
                if i % CHECK_INTERVAL == 0 {
                    ctx.check()?;
                }
                if tree_matches(core, payload, node, &plan.equal_position) {
                    result.insert(row_id);
                }
            }
            result
        }
    };

    ctx.check()?;
    let ordered = order_rows(core, plan, matched, &scores)?;
    let deduped = apply_distinct(core, plan, ordered);

    let total = plan.req_total.then_some(deduped.len());
    let aggregations = aggregate(core, &deduped, &plan.aggregations)?;

    let offset = plan.offset.min(deduped.len());
    let end = match plan.limit {
        Some(limit) => (offset + limit).min(deduped.len()),
        None => deduped.len(),
    };

    let mut items = Vec::with_capacity(end - offset);
    for (i, &row_id) in deduped[offset..end].iter().enumerate() {
        if i % CHECK_INTERVAL == 0 {
            ctx.check()?;
        }
        let payload = core
            .rows()
            .get(&row_id)
            .ok_or_else(|| Error::logic(format!("row {row_id} vanished during execution")))?;
        items.push((row_id, payload.clone()));
    }

    Ok(Executed {
        items,
        total,
        aggregations,
    })
}

// ── Conjunction evaluation ──────────────────────────────────────

fn eval_conjunction(
    core: &NamespaceCore,
    conjunction: &Conjunction,
    plan: &Plan,
    ctx: &QueryContext,
    scores: &mut HashMap<RowId, f64>,
) -> Result<BTreeSet<RowId>> {
    let mut candidates: Option<BTreeSet<RowId>> = None;

    for step in &conjunction.steps {
        ctx.check()?;
        let index = &core.indexes()[step.index];
        let selection = select(index, step.cond, &step.operand, core.rows())?;
        if let Some(step_scores) = selection.scores {
            for (row_id, score) in step_scores {
                let best = scores.entry(row_id).or_insert(0.0);
                if score > *best {
                    *best = score;
                }
            }
        }
        candidates = Some(match candidates {
            None => selection.rows,
            Some(current) => current.intersection(&selection.rows).copied().collect(),
        });
        if candidates.as_ref().is_some_and(BTreeSet::is_empty) {
            return Ok(BTreeSet::new());
        }
    }

    // No usable index: scan the live set.
    let base = candidates.unwrap_or_else(|| core.rows().keys().copied().collect());

    // Residual pass re-checks every condition — NOT conditions complement
    // here, against the narrowed candidates only.
    let mut result = BTreeSet::new();
    for (i, row_id) in base.into_iter().enumerate() {
        if i % CHECK_INTERVAL == 0 {
            ctx.check()?;
        }
        let Some(payload) = core.rows().get(&row_id) else {
            continue;
        };
        if conjunction_matches(core, payload, conjunction, &plan.equal_position) {
            result.insert(row_id);
        }
    }
    Ok(result)
}

fn conjunction_matches(
    core: &NamespaceCore,
    payload: &Payload,
    conjunction: &Conjunction,
    equal_position: &[Vec<usize>],
) -> bool {
    for (negated, cond) in &conjunction.checks {
        let hit = cond_matches(core, payload, cond);
        if hit == *negated {
            return false;
        }
    }
    aligned_groups_match(payload, &conjunction.checks, equal_position)
}

/// Equal-position constraint: within each group some single element index
/// must satisfy every condition on every listed array field.
fn aligned_groups_match(
    payload: &Payload,
    checks: &[(bool, ResolvedCond)],
    groups: &[Vec<usize>],
) -> bool {
    'group: for group in groups {
        let mut per_field: Vec<(usize, Vec<&ResolvedCond>)> = Vec::new();
        for &pos in group {
            let conds: Vec<&ResolvedCond> = checks
                .iter()
                .filter(|(negated, c)| {
                    !*negated
                        && c.field == FieldRef::Field(pos)
                        && !matches!(c.cond, Cond::Any | Cond::Empty)
                })
                .map(|(_, c)| c)
                .collect();
            if !conds.is_empty() {
                per_field.push((pos, conds));
            }
        }
        // Alignment only binds when at least two fields are constrained.
        if per_field.len() < 2 {
            continue;
        }
        let max_len = per_field
            .iter()
            .map(|(pos, _)| payload.scalars(*pos).len())
            .max()
            .unwrap_or(0);
        for i in 0..max_len {
            let aligned = per_field.iter().all(|(pos, conds)| {
                payload
                    .scalars(*pos)
                    .get(i)
                    .is_some_and(|elem| conds.iter().all(|c| matches_one(elem, c.cond, &c.operand)))
            });
            if aligned {
                continue 'group;
            }
        }
        return false;
    }
    true
}

fn cond_matches(core: &NamespaceCore, payload: &Payload, cond: &ResolvedCond) -> bool {
    match cond.field {
        FieldRef::Field(pos) => {
            if cond.fulltext && cond.cond == Cond::Eq {
                let Value::String(term) = &cond.operand else {
                    return false;
                };
                return payload.scalars(pos).iter().any(|v| match v {
                    Value::String(text) => matches_text(text, term),
                    _ => false,
                });
            }
            matches_scalars(payload.scalars(pos), cond.cond, &cond.operand)
        }
        FieldRef::CompositeIndex(i) => {
            let index = &core.indexes()[i];
            let all_present = index
                .field_positions
                .iter()
                .all(|&pos| payload.present(pos));
            match cond.cond {
                Cond::Any => all_present,
                Cond::Empty => !all_present,
                _ => {
                    if !all_present {
                        return false;
                    }
                    let key = Value::Tuple(
                        index
                            .field_positions
                            .iter()
                            .map(|&pos| payload.get(pos).clone())
                            .collect(),
                    );
                    matches_one(&key, cond.cond, &cond.operand)
                }
            }
        }
    }
}

// ── Tree-walk fallback ──────────────────────────────────────────

fn tree_matches(
    core: &NamespaceCore,
    payload: &Payload,
    node: &ResolvedNode,
    equal_position: &[Vec<usize>],
) -> bool {
    if !node_matches(core, payload, node) {
        return false;
    }
    if equal_position.is_empty() {
        return true;
    }
    // Alignment applies to the top-level conjunction's plain conditions.
    let top: Vec<(bool, ResolvedCond)> = match node {
        ResolvedNode::And(children) => children
            .iter()
            .filter_map(|c| match c {
                ResolvedNode::Cond(rc) => Some((false, rc.clone())),
                _ => None,
            })
            .collect(),
        ResolvedNode::Cond(rc) => vec![(false, rc.clone())],
        _ => Vec::new(),
    };
    aligned_groups_match(payload, &top, equal_position)
}

fn node_matches(core: &NamespaceCore, payload: &Payload, node: &ResolvedNode) -> bool {
    match node {
        ResolvedNode::Cond(cond) => cond_matches(core, payload, cond),
        ResolvedNode::Not(inner) => !node_matches(core, payload, inner),
        ResolvedNode::And(children) => children.iter().all(|c| node_matches(core, payload, c)),
        ResolvedNode::Or(children) => children.iter().any(|c| node_matches(core, payload, c)),
    }
}

// ── Ordering ────────────────────────────────────────────────────

fn order_rows(
    core: &NamespaceCore,
    plan: &Plan,
    matched: BTreeSet<RowId>,
    scores: &HashMap<RowId, f64>,
) -> Result<Vec<RowId>> {
    match &plan.sort {
        SortStrategy::RowId => Ok(matched.into_iter().collect()),
        SortStrategy::ByScore => {
            let mut rows: Vec<RowId> = matched.into_iter().collect();
            rows.sort_by(|a, b| {
                let sa = scores.get(a).copied().unwrap_or(0.0);
                let sb = scores.get(b).copied().unwrap_or(0.0);
                sb.partial_cmp(&sa)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.cmp(b))
            });
            Ok(rows)
        }
        SortStrategy::Index { index, desc } => {
            let IndexData::Tree(tree) = &core.indexes()[*index].data else {
                return Err(Error::logic("sort plan points at a non-tree index"));
            };
            let mut seen: HashSet<RowId> = HashSet::with_capacity(matched.len());
            let mut ordered = Vec::with_capacity(matched.len());
            for (_, posting) in tree.iter_ordered(*desc) {
                for &row_id in posting {
                    if matched.contains(&row_id) && seen.insert(row_id) {
                        ordered.push(row_id);
                    }
                }
            }
            // Rows without the sort field sort as null: first ascending,
            // last descending.
            let absent: Vec<RowId> = matched
                .iter()
                .copied()
                .filter(|id| !seen.contains(id))
                .collect();
            if *desc {
                ordered.extend(absent);
                Ok(ordered)
            } else {
                let mut with_absent = absent;
                with_absent.extend(ordered);
                Ok(with_absent)
            }
        }
        SortStrategy::Materialize(keys) => {
            let mut rows: Vec<RowId> = matched.into_iter().collect();
            rows.sort_by(|a, b| {
                let pa = core.rows().get(a);
                let pb = core.rows().get(b);
                for &(pos, desc) in keys {
                    let va = pa.map(|p| p.get(pos)).unwrap_or(&Value::Null);
                    let vb = pb.map(|p| p.get(pos)).unwrap_or(&Value::Null);
                    let ord = va.compare(vb);
                    let ord = if desc { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                a.cmp(b)
            });
            Ok(rows)
        }
    }
}

fn apply_distinct(core: &NamespaceCore, plan: &Plan, ordered: Vec<RowId>) -> Vec<RowId> {
    if plan.distinct.is_empty() {
        return ordered;
    }
    let mut seen: HashSet<Value> = HashSet::new();
    let mut result = Vec::with_capacity(ordered.len());
    for row_id in ordered {
        let Some(payload) = core.rows().get(&row_id) else {
            continue;
        };
        let key = Value::Tuple(
            plan.distinct
                .iter()
                .map(|&pos| payload.get(pos).clone())
                .collect(),
        );
        if seen.insert(key) {
            result.push(row_id);
        }
    }
    result
}
