use std::fmt;

use serde::{Deserialize, Serialize};

use crate::aggregate::{AggKind, AggSpec};
use crate::filter::{Filter, FilterChain, FilterNode, LogicalOp};
use crate::operator::Cond;
use crate::query::{Join, Query};
use crate::sort::Sort;
use crate::value::Value;

#[derive(Debug)]
pub struct DslError(pub String);

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dsl error: {}", self.0)
    }
}

impl std::error::Error for DslError {}

// ── Serialized document shape ───────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct DslQuery {
    namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    filters: Vec<DslFilter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    sort: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    distinct: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    aggregations: Vec<DslAgg>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    req_total: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    equal_position: Vec<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    joins: Vec<DslJoin>,
}

/// One filter entry: either a leaf condition (`field`/`cond`/`value`) or a
/// nested group (`filters`). `op` joins the entry with its left sibling and
/// defaults to AND.
#[derive(Debug, Default, Serialize, Deserialize)]
struct DslFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    op: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cond: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    filters: Option<Vec<DslFilter>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct DslAgg {
    field: String,
    kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct DslJoin {
    field: String,
    on: Vec<(String, String)>,
    query: Box<DslQuery>,
}

// ── Parse ───────────────────────────────────────────────────────

/// Parse a serialized DSL query into the IR.
pub fn parse_dsl(input: &str) -> Result<Query, DslError> {
    let dsl: DslQuery = serde_json::from_str(input).map_err(|e| DslError(e.to_string()))?;
    query_from_dsl(dsl)
}

fn query_from_dsl(dsl: DslQuery) -> Result<Query, DslError> {
    let mut query = Query::new(dsl.namespace);
    let mut chain = FilterChain::new();
    for entry in dsl.filters {
        let (op, node) = parse_entry(entry)?;
        chain.push(op, node);
    }
    query.filter = chain.into_tree();
    query.sort = dsl.sort;
    query.distinct = dsl.distinct;
    query.limit = dsl.limit;
    query.offset = dsl.offset;
    query.req_total = dsl.req_total;
    query.equal_position = dsl.equal_position;
    for agg in dsl.aggregations {
        let kind = AggKind::parse(&agg.kind)
            .ok_or_else(|| DslError(format!("unknown aggregation kind {:?}", agg.kind)))?;
        query.aggregations.push(AggSpec {
            field: agg.field,
            kind,
        });
    }
    for join in dsl.joins {
        query.joins.push(Join {
            field: join.field,
            on: join.on,
            query: Box::new(query_from_dsl(*join.query)?),
        });
    }
    Ok(query)
}

fn parse_entry(entry: DslFilter) -> Result<(LogicalOp, FilterNode), DslError> {
    let op = match entry.op.as_deref() {
        None => LogicalOp::And,
        Some(s) => match s.to_ascii_uppercase().as_str() {
            "AND" => LogicalOp::And,
            "OR" => LogicalOp::Or,
            "NOT" => LogicalOp::Not,
            other => return Err(DslError(format!("unknown logical op {other:?}"))),
        },
    };

    if let Some(nested) = entry.filters {
        if entry.field.is_some() || entry.cond.is_some() {
            return Err(DslError("entry mixes condition and nested filters".into()));
        }
        let mut chain = FilterChain::new();
        for child in nested {
            let (child_op, node) = parse_entry(child)?;
            chain.push(child_op, node);
        }
        let tree = chain
            .into_tree()
            .ok_or_else(|| DslError("empty nested filter group".into()))?;
        return Ok((op, tree));
    }

    let field = entry
        .field
        .ok_or_else(|| DslError("filter entry missing field".into()))?;
    let cond_name = entry
        .cond
        .ok_or_else(|| DslError("filter entry missing cond".into()))?;
    let cond = Cond::parse(&cond_name)
        .ok_or_else(|| DslError(format!("unknown condition {cond_name:?}")))?;
    let value = match entry.value {
        Some(v) => value_from_json(v),
        None => Value::Null,
    };
    Ok((op, FilterNode::Condition(Filter { field, cond, value })))
}

/// JSON literal → engine value. Integers land as Int64; numeric promotion
/// makes them equal to stored Int32 fields.
pub fn value_from_json(v: serde_json::Value) -> Value {
    match v {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => {
            Value::Tuple(items.into_iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(_) => Value::Null,
    }
}

fn value_to_json(v: &Value) -> serde_json::Value {
    match v {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int32(i) => serde_json::json!(*i),
        Value::Int64(i) => serde_json::json!(*i),
        Value::Double(d) => serde_json::json!(*d),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Tuple(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

// ── Serialize ───────────────────────────────────────────────────

/// Render a query IR back into the serialized DSL form.
/// `parse_dsl(&to_dsl(q))` reproduces `q`.
pub fn to_dsl(query: &Query) -> String {
    let dsl = dsl_from_query(query);
    serde_json::to_string(&dsl).expect("dsl serialization is infallible")
}

fn dsl_from_query(query: &Query) -> DslQuery {
    DslQuery {
        namespace: query.namespace.clone(),
        filters: match &query.filter {
            None => Vec::new(),
            Some(tree) => entries_from_tree(tree),
        },
        sort: query.sort.clone(),
        distinct: query.distinct.clone(),
        limit: query.limit,
        offset: query.offset,
        aggregations: query
            .aggregations
            .iter()
            .map(|a| DslAgg {
                field: a.field.clone(),
                kind: a.kind.name().to_string(),
            })
            .collect(),
        req_total: query.req_total,
        equal_position: query.equal_position.clone(),
        joins: query
            .joins
            .iter()
            .map(|j| DslJoin {
                field: j.field.clone(),
                on: j.on.clone(),
                query: Box::new(dsl_from_query(&j.query)),
            })
            .collect(),
    }
}

/// Flatten a predicate tree back into sibling entries.
fn entries_from_tree(tree: &FilterNode) -> Vec<DslFilter> {
    match tree {
        FilterNode::Group {
            logical: LogicalOp::And,
            children,
        } => children.iter().map(|c| entry_from_node(c, None)).collect(),
        FilterNode::Group {
            logical: LogicalOp::Or,
            children,
        } => children
            .iter()
            .enumerate()
            .map(|(i, c)| entry_from_node(c, if i == 0 { None } else { Some("OR") }))
            .collect(),
        other => vec![entry_from_node(other, None)],
    }
}

fn entry_from_node(node: &FilterNode, op: Option<&str>) -> DslFilter {
    match node {
        FilterNode::Condition(f) => DslFilter {
            op: op.map(String::from),
            field: Some(f.field.clone()),
            cond: Some(f.cond.name().to_string()),
            value: Some(value_to_json(&f.value)),
            filters: None,
        },
        FilterNode::Not(inner) => {
            // NOT is expressible directly on a leaf entry; a composite
            // operand, or a NOT that must carry a sibling op, nests one
            // level so the joining op survives the round trip.
            let mut entry = entry_from_node(inner, None);
            if op.is_none() && entry.op.is_none() && entry.filters.is_none() {
                entry.op = Some("NOT".into());
                entry
            } else {
                let mut not_entry = entry;
                not_entry.op = Some("NOT".into());
                DslFilter {
                    op: op.map(String::from),
                    filters: Some(vec![not_entry]),
                    ..Default::default()
                }
            }
        }
        group => DslFilter {
            op: op.map(String::from),
            filters: Some(entries_from_tree(group)),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::QueryBuilder;

    #[test]
    fn parse_basic_query() {
        let q = parse_dsl(
            r#"{"namespace":"items",
                "filters":[{"field":"year","cond":"EQ","value":2002}],
                "limit":10,"req_total":true}"#,
        )
        .unwrap();
        assert_eq!(q.namespace, "items");
        assert_eq!(q.limit, Some(10));
        assert!(q.req_total);
        assert_eq!(
            q.filter,
            Some(FilterNode::condition("year", Cond::Eq, Value::Int64(2002)))
        );
    }

    #[test]
    fn parse_or_and_not_entries() {
        let q = parse_dsl(
            r#"{"namespace":"items","filters":[
                {"field":"year","cond":"EQ","value":2002},
                {"op":"OR","field":"genre","cond":"SET","value":[1,2]},
                {"op":"NOT","field":"name","cond":"EQ","value":"x"}
            ]}"#,
        )
        .unwrap();

        let equivalent = QueryBuilder::new("items")
            .where_("year", Cond::Eq, 2002i64)
            .or()
            .where_("genre", Cond::Set, vec![1i64, 2i64])
            .not()
            .where_("name", Cond::Eq, "x")
            .build();
        assert_eq!(q, equivalent);
    }

    #[test]
    fn cond_spellings_are_case_insensitive() {
        let a = parse_dsl(r#"{"namespace":"n","filters":[{"field":"f","cond":"eq","value":1}]}"#)
            .unwrap();
        let b = parse_dsl(r#"{"namespace":"n","filters":[{"field":"f","cond":"EQ","value":1}]}"#)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unknown_cond_is_an_error() {
        let err =
            parse_dsl(r#"{"namespace":"n","filters":[{"field":"f","cond":"LIKE","value":1}]}"#)
                .unwrap_err();
        assert!(err.0.contains("LIKE"));
    }

    #[test]
    fn round_trip_preserves_ir() {
        let q = QueryBuilder::new("items")
            .where_("year", Cond::Range, vec![2010i64, 2020i64])
            .or()
            .where_("genre", Cond::Eq, 5i64)
            .not()
            .where_("name", Cond::Eq, "sss")
            .sort("year", true)
            .limit(5)
            .offset(1)
            .aggregate(AggKind::Sum, "year")
            .req_total()
            .build();
        let round = parse_dsl(&to_dsl(&q)).unwrap();
        assert_eq!(q, round);
    }

    #[test]
    fn nested_group_round_trip() {
        let q = parse_dsl(
            r#"{"namespace":"n","filters":[
                {"field":"a","cond":"EQ","value":1},
                {"op":"OR","filters":[
                    {"field":"b","cond":"GT","value":2},
                    {"field":"c","cond":"LT","value":3}
                ]}
            ]}"#,
        )
        .unwrap();
        let round = parse_dsl(&to_dsl(&q)).unwrap();
        assert_eq!(q, round);
    }
}
