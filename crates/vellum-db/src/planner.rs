use vellum_query::{AggKind, Cond, Filter, FilterNode, LogicalOp, Query, Value};

use crate::error::{Error, Result};
use crate::index::IndexData;
use crate::namespace::NamespaceCore;
use crate::schema::{FieldType, IndexKind};

/// Upper bound on DNF conjunction count. A predicate tree whose DNF would
/// exceed this stays a tree and is evaluated by per-row walking instead.
pub(crate) const DNF_TERM_BUDGET: usize = 64;

/// A field reference resolved against the namespace: either a payload
/// position or a composite index addressed by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldRef {
    Field(usize),
    CompositeIndex(usize),
}

/// One predicate with its operand normalized and an index chosen.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedCond {
    pub field: FieldRef,
    pub cond: Cond,
    pub operand: Value,
    /// Index able to answer this condition directly, if any.
    pub index: Option<usize>,
    /// The field's equality semantics are fulltext (substring/prefix).
    pub fulltext: bool,
}

/// One index lookup inside a conjunction.
#[derive(Debug, Clone)]
pub(crate) struct Step {
    pub index: usize,
    pub cond: Cond,
    pub operand: Value,
}

/// A DNF conjunction: ordered index lookups narrowing the candidate set,
/// plus the full condition list re-checked per row (`true` marks a negated
/// condition, complemented against the current candidates).
#[derive(Debug)]
pub(crate) struct Conjunction {
    pub steps: Vec<Step>,
    pub checks: Vec<(bool, ResolvedCond)>,
}

#[derive(Debug)]
pub(crate) enum PlanFilter {
    /// No predicates: every live row matches.
    All,
    Dnf(Vec<Conjunction>),
    /// DNF exceeded the budget; evaluate the tree per row.
    Tree(ResolvedNode),
}

#[derive(Debug)]
pub(crate) enum ResolvedNode {
    Cond(ResolvedCond),
    Not(Box<ResolvedNode>),
    And(Vec<ResolvedNode>),
    Or(Vec<ResolvedNode>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SortStrategy {
    /// Natural ascending row-id order.
    RowId,
    /// Fulltext match score, descending, row-id ascending on ties.
    ByScore,
    /// Stream a tree index in key order.
    Index { index: usize, desc: bool },
    /// Materialize and stable-sort by (field, desc) keys.
    Materialize(Vec<(usize, bool)>),
}

#[derive(Debug, Clone)]
pub(crate) struct PlannedAgg {
    pub pos: usize,
    pub kind: AggKind,
    pub field: String,
}

#[derive(Debug)]
pub(crate) struct Plan {
    pub filter: PlanFilter,
    pub sort: SortStrategy,
    pub distinct: Vec<usize>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub aggregations: Vec<PlannedAgg>,
    pub req_total: bool,
    pub equal_position: Vec<Vec<usize>>,
}

/// Bind a query IR to a namespace and produce an execution plan.
///
/// All three front-ends emit the same IR, so equivalent queries plan
/// identically by construction.
pub(crate) fn plan(core: &NamespaceCore, query: &Query) -> Result<Plan> {
    let planner = Planner { core };
    planner.plan(query)
}

struct Planner<'a> {
    core: &'a NamespaceCore,
}

impl<'a> Planner<'a> {
    fn plan(&self, query: &Query) -> Result<Plan> {
        let filter = match &query.filter {
            None => PlanFilter::All,
            Some(tree) => {
                let resolved = self.resolve_node(tree)?;
                match self.to_dnf(&resolved, false) {
                    Some(terms) => PlanFilter::Dnf(
                        terms
                            .into_iter()
                            .map(|t| self.build_conjunction(t))
                            .collect(),
                    ),
                    None => PlanFilter::Tree(resolved),
                }
            }
        };

        let sort = self.plan_sort(query, &filter)?;
        let distinct = self.resolve_positions(&query.distinct)?;

        let mut aggregations = Vec::with_capacity(query.aggregations.len());
        for agg in &query.aggregations {
            let pos = self.resolve_payload_field(&agg.field)?;
            aggregations.push(PlannedAgg {
                pos,
                kind: agg.kind,
                field: self.core.def().fields[pos].name.clone(),
            });
        }

        let equal_position = self.resolve_equal_position(query)?;

        Ok(Plan {
            filter,
            sort,
            distinct,
            limit: query.limit,
            offset: query.offset.unwrap_or(0),
            aggregations,
            req_total: query.req_total,
            equal_position,
        })
    }

    // ── Field resolution ────────────────────────────────────────

    fn resolve_field(&self, name: &str) -> Result<FieldRef> {
        if let Some(pos) = self.core.def().field_pos(name) {
            return Ok(FieldRef::Field(pos));
        }
        if let Some(idx) = self
            .core
            .indexes()
            .iter()
            .position(|x| x.def.is_composite() && x.def.name.eq_ignore_ascii_case(name))
        {
            return Ok(FieldRef::CompositeIndex(idx));
        }
        Err(Error::Params(format!("unknown field {name:?}")))
    }

    fn resolve_payload_field(&self, name: &str) -> Result<usize> {
        match self.resolve_field(name)? {
            FieldRef::Field(pos) => Ok(pos),
            FieldRef::CompositeIndex(_) => Err(Error::Params(format!(
                "{name:?} is a composite index, not a field"
            ))),
        }
    }

    fn resolve_positions(&self, names: &[String]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|n| self.resolve_payload_field(n))
            .collect()
    }

    fn resolve_equal_position(&self, query: &Query) -> Result<Vec<Vec<usize>>> {
        let mut groups = Vec::with_capacity(query.equal_position.len());
        for group in &query.equal_position {
            if group.len() < 2 {
                return Err(Error::Query(
                    "equal_position needs at least two fields".into(),
                ));
            }
            let mut positions = Vec::with_capacity(group.len());
            for name in group {
                let pos = self.resolve_payload_field(name)?;
                if !self.core.def().fields[pos].array {
                    return Err(Error::Query(format!(
                        "equal_position field {name:?} is not an array"
                    )));
                }
                positions.push(pos);
            }
            groups.push(positions);
        }
        Ok(groups)
    }

    // ── Predicate resolution ────────────────────────────────────

    fn resolve_node(&self, node: &FilterNode) -> Result<ResolvedNode> {
        match node {
            FilterNode::Condition(f) => Ok(ResolvedNode::Cond(self.resolve_cond(f)?)),
            FilterNode::Not(inner) => Ok(ResolvedNode::Not(Box::new(self.resolve_node(inner)?))),
            FilterNode::Group { logical, children } => {
                let resolved: Result<Vec<ResolvedNode>> =
                    children.iter().map(|c| self.resolve_node(c)).collect();
                match logical {
                    LogicalOp::And => Ok(ResolvedNode::And(resolved?)),
                    LogicalOp::Or => Ok(ResolvedNode::Or(resolved?)),
                    LogicalOp::Not => Err(Error::logic("NOT group in normalized tree")),
                }
            }
        }
    }

    fn resolve_cond(&self, f: &Filter) -> Result<ResolvedCond> {
        let field = self.resolve_field(&f.field)?;
        let operand = self.normalize_operand(field, f.cond, &f.value)?;
        let index = self.choose_index(field, f.cond);
        let fulltext = index.is_some_and(|i| {
            matches!(self.core.indexes()[i].data, IndexData::Fulltext(_))
        });
        Ok(ResolvedCond {
            field,
            cond: f.cond,
            operand,
            index,
            fulltext,
        })
    }

    /// Pick an index able to answer `cond` on `field`. A hash or tree
    /// index wins over fulltext so strict equality keeps strict
    /// semantics; fulltext answers EQ only when it is the field's sole
    /// searchable index.
    fn choose_index(&self, field: FieldRef, cond: Cond) -> Option<usize> {
        match field {
            FieldRef::CompositeIndex(i) => {
                self.core.indexes()[i].supports(cond).then_some(i)
            }
            FieldRef::Field(pos) => {
                let mut fulltext_pick = None;
                for (i, index) in self.core.indexes().iter().enumerate() {
                    if index.def.is_composite()
                        || !index.is_searchable()
                        || index.field_positions != [pos]
                        || !index.supports(cond)
                    {
                        continue;
                    }
                    if matches!(index.data, IndexData::Fulltext(_)) {
                        fulltext_pick.get_or_insert(i);
                    } else {
                        return Some(i);
                    }
                }
                fulltext_pick
            }
        }
    }

    // ── Operand normalization ───────────────────────────────────

    fn normalize_operand(&self, field: FieldRef, cond: Cond, value: &Value) -> Result<Value> {
        match cond {
            Cond::Any | Cond::Empty => Ok(Value::Null),
            Cond::Set => {
                let items = match value {
                    Value::Tuple(items) => items,
                    other => std::slice::from_ref(other),
                };
                let coerced: Result<Vec<Value>> = items
                    .iter()
                    .map(|v| self.normalize_point(field, v))
                    .collect();
                Ok(Value::Tuple(coerced?))
            }
            Cond::Range => match value {
                Value::Tuple(items) if items.len() == 2 => {
                    let lo = self.normalize_point(field, &items[0])?;
                    let hi = self.normalize_point(field, &items[1])?;
                    Ok(Value::Tuple(vec![lo, hi]))
                }
                _ => Err(Error::Params("RANGE expects exactly two bounds".into())),
            },
            Cond::Eq | Cond::Lt | Cond::Le | Cond::Gt | Cond::Ge => {
                self.normalize_point(field, value)
            }
        }
    }

    fn normalize_point(&self, field: FieldRef, value: &Value) -> Result<Value> {
        match field {
            FieldRef::Field(pos) => {
                coerce_operand(&self.core.def().fields[pos], value)
            }
            FieldRef::CompositeIndex(i) => {
                let index = &self.core.indexes()[i];
                let items = match value {
                    Value::Tuple(items) if items.len() == index.field_positions.len() => items,
                    _ => {
                        return Err(Error::Params(format!(
                            "composite {:?} expects a {}-tuple operand",
                            index.def.name,
                            index.field_positions.len()
                        )))
                    }
                };
                let coerced: Result<Vec<Value>> = items
                    .iter()
                    .zip(&index.field_positions)
                    .map(|(v, &pos)| coerce_operand(&self.core.def().fields[pos], v))
                    .collect();
                Ok(Value::Tuple(coerced?))
            }
        }
    }

    // ── DNF ─────────────────────────────────────────────────────

    /// Rewrite to a disjunction of conjunctions, pushing NOT down to the
    /// leaves. Returns `None` once the term count would pass
    /// [`DNF_TERM_BUDGET`].
    #[allow(clippy::type_complexity)]
    fn to_dnf(
        &self,
        node: &ResolvedNode,
        negate: bool,
    ) -> Option<Vec<Vec<(bool, ResolvedCond)>>> {
        match node {
            ResolvedNode::Cond(c) => Some(vec![vec![negate_leaf(c, negate)]]),
            ResolvedNode::Not(inner) => self.to_dnf(inner, !negate),
            ResolvedNode::And(children) if !negate => self.dnf_product(children, negate),
            ResolvedNode::And(children) => self.dnf_union(children, negate),
            ResolvedNode::Or(children) if !negate => self.dnf_union(children, negate),
            ResolvedNode::Or(children) => self.dnf_product(children, negate),
        }
    }

    #[allow(clippy::type_complexity)]
    fn dnf_union(
        &self,
        children: &[ResolvedNode],
        negate: bool,
    ) -> Option<Vec<Vec<(bool, ResolvedCond)>>> {
        let mut terms = Vec::new();
        for child in children {
            terms.extend(self.to_dnf(child, negate)?);
            if terms.len() > DNF_TERM_BUDGET {
                return None;
            }
        }
        Some(terms)
    }

    #[allow(clippy::type_complexity)]
    fn dnf_product(
        &self,
        children: &[ResolvedNode],
        negate: bool,
    ) -> Option<Vec<Vec<(bool, ResolvedCond)>>> {
        let mut terms: Vec<Vec<(bool, ResolvedCond)>> = vec![Vec::new()];
        for child in children {
            let child_terms = self.to_dnf(child, negate)?;
            if terms.len().saturating_mul(child_terms.len()) > DNF_TERM_BUDGET {
                return None;
            }
            let mut next = Vec::with_capacity(terms.len() * child_terms.len());
            for term in &terms {
                for child_term in &child_terms {
                    let mut merged = term.clone();
                    merged.extend(child_term.iter().cloned());
                    next.push(merged);
                }
            }
            terms = next;
        }
        Some(terms)
    }

    // ── Conjunction assembly ────────────────────────────────────

    /// Order a conjunction's index lookups: pk EQ and a covering composite
    /// first, then ascending estimated cost, ANY/EMPTY deferred to last.
    /// Negated conditions never become lookups — they complement the
    /// candidate set in the residual check.
    fn build_conjunction(&self, checks: Vec<(bool, ResolvedCond)>) -> Conjunction {
        let live = self.core.rows().len();
        let pk_index = self.core.pk_index();

        let (composite_step, covered) = self.cover_with_composite(&checks);

        let mut ordered: Vec<(u8, u8, usize, Step)> = Vec::new();
        if let Some(step) = composite_step {
            let cost =
                self.core.indexes()[step.index].lookup_cost(step.cond, &step.operand, live);
            ordered.push((0, 0, cost, step));
        }

        for (i, (negated, cond)) in checks.iter().enumerate() {
            if *negated || covered.contains(&i) {
                continue;
            }
            let Some(index_pos) = cond.index else { continue };
            let index = &self.core.indexes()[index_pos];
            let deferred = u8::from(matches!(cond.cond, Cond::Any | Cond::Empty));
            let priority = u8::from(!(cond.cond == Cond::Eq && index_pos == pk_index));
            let cost = index.lookup_cost(cond.cond, &cond.operand, live);
            ordered.push((
                deferred,
                priority,
                cost,
                Step {
                    index: index_pos,
                    cond: cond.cond,
                    operand: cond.operand.clone(),
                },
            ));
        }

        ordered.sort_by(|a, b| (a.0, a.1, a.2).cmp(&(b.0, b.1, b.2)));

        Conjunction {
            steps: ordered.into_iter().map(|(_, _, _, s)| s).collect(),
            checks,
        }
    }

    /// If a composite index's constituents are all covered by positive EQ
    /// conditions of this conjunction, fold them into one tuple lookup.
    /// The widest cover wins.
    fn cover_with_composite(
        &self,
        checks: &[(bool, ResolvedCond)],
    ) -> (Option<Step>, Vec<usize>) {
        let mut best: Option<(Step, Vec<usize>)> = None;

        for (index_pos, index) in self.core.indexes().iter().enumerate() {
            if !index.def.is_composite()
                || !index.is_searchable()
                || !matches!(index.def.kind, IndexKind::Hash | IndexKind::Tree)
            {
                continue;
            }
            let mut operands = Vec::with_capacity(index.field_positions.len());
            let mut consumed = Vec::new();
            let mut complete = true;
            for &pos in &index.field_positions {
                let found = checks.iter().enumerate().find(|(_, (negated, c))| {
                    !negated && c.cond == Cond::Eq && !c.fulltext && c.field == FieldRef::Field(pos)
                });
                match found {
                    Some((i, (_, c))) => {
                        operands.push(c.operand.clone());
                        consumed.push(i);
                    }
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }
            let width = index.field_positions.len();
            let wider = match &best {
                None => true,
                Some((s, _)) => self.core.indexes()[s.index].field_positions.len() < width,
            };
            if wider {
                best = Some((
                    Step {
                        index: index_pos,
                        cond: Cond::Eq,
                        operand: Value::Tuple(operands),
                    },
                    consumed,
                ));
            }
        }

        match best {
            Some((step, consumed)) => (Some(step), consumed),
            None => (None, Vec::new()),
        }
    }

    // ── Sort strategy ───────────────────────────────────────────

    fn plan_sort(&self, query: &Query, filter: &PlanFilter) -> Result<SortStrategy> {
        if query.sort.is_empty() {
            if filter_has_fulltext(filter) {
                return Ok(SortStrategy::ByScore);
            }
            return Ok(SortStrategy::RowId);
        }

        let keys: Result<Vec<(usize, bool)>> = query
            .sort
            .iter()
            .map(|s| Ok((self.resolve_payload_field(&s.field)?, s.desc)))
            .collect();
        let keys = keys?;

        if keys.len() == 1 {
            let (pos, desc) = keys[0];
            let tree = self.core.indexes().iter().position(|x| {
                matches!(x.data, IndexData::Tree(_))
                    && !x.def.is_composite()
                    && x.field_positions == [pos]
            });
            if let Some(index) = tree {
                return Ok(SortStrategy::Index { index, desc });
            }
        }

        Ok(SortStrategy::Materialize(keys))
    }
}

/// NOT over ANY is EMPTY and vice versa; other conditions keep a negation
/// flag resolved against the candidate set at execution time.
fn negate_leaf(cond: &ResolvedCond, negate: bool) -> (bool, ResolvedCond) {
    if !negate {
        return (false, cond.clone());
    }
    match cond.cond {
        Cond::Any => {
            let mut c = cond.clone();
            c.cond = Cond::Empty;
            (false, c)
        }
        Cond::Empty => {
            let mut c = cond.clone();
            c.cond = Cond::Any;
            (false, c)
        }
        _ => (true, cond.clone()),
    }
}

pub(crate) fn filter_has_fulltext(filter: &PlanFilter) -> bool {
    fn node_has(node: &ResolvedNode) -> bool {
        match node {
            ResolvedNode::Cond(c) => c.fulltext,
            ResolvedNode::Not(inner) => node_has(inner),
            ResolvedNode::And(children) | ResolvedNode::Or(children) => {
                children.iter().any(node_has)
            }
        }
    }
    match filter {
        PlanFilter::All => false,
        PlanFilter::Dnf(conjunctions) => conjunctions
            .iter()
            .any(|c| c.checks.iter().any(|(_, cond)| cond.fulltext)),
        PlanFilter::Tree(node) => node_has(node),
    }
}

/// Operand coercion at the selector boundary: numeric fields accept
/// integer literals and stringified numerics; string fields never coerce
/// from numerics.
fn coerce_operand(field: &crate::schema::FieldDef, value: &Value) -> Result<Value> {
    let mismatch = || {
        Error::Params(format!(
            "field {:?} expects {:?}, got {}",
            field.name,
            field.field_type,
            value.type_name()
        ))
    };

    match field.field_type {
        FieldType::Int32 | FieldType::Int64 | FieldType::Double => match value {
            Value::Int32(_) | Value::Int64(_) | Value::Double(_) => Ok(value.clone()),
            Value::String(s) => {
                if let Ok(i) = s.parse::<i64>() {
                    Ok(Value::Int64(i))
                } else if let Ok(d) = s.parse::<f64>() {
                    Ok(Value::Double(d))
                } else {
                    Err(mismatch())
                }
            }
            _ => Err(mismatch()),
        },
        FieldType::String => match value {
            Value::String(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
        FieldType::Bool => match value {
            Value::Bool(_) => Ok(value.clone()),
            _ => Err(mismatch()),
        },
    }
}
