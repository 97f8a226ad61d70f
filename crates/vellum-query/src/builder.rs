use crate::aggregate::{AggKind, AggSpec};
use crate::filter::{FilterChain, FilterNode, LogicalOp};
use crate::operator::Cond;
use crate::query::{Join, Query};
use crate::sort::Sort;
use crate::value::Value;

/// Fluent query builder.
///
/// Conditions chain under an implicit AND in call order. [`or`](Self::or)
/// makes the surrounding `where_` calls siblings under an OR node;
/// [`not`](Self::not) negates the next `where_` call.
///
/// ```
/// use vellum_query::{QueryBuilder, Cond, Value};
///
/// let q = QueryBuilder::new("items")
///     .where_("year", Cond::Eq, Value::Int64(2002))
///     .not()
///     .where_("name", Cond::Eq, Value::from("sss"))
///     .build();
/// ```
#[derive(Debug)]
pub struct QueryBuilder {
    query: Query,
    chain: FilterChain,
    next_op: LogicalOp,
}

impl QueryBuilder {
    pub fn new(namespace: impl Into<String>) -> QueryBuilder {
        QueryBuilder {
            query: Query::new(namespace),
            chain: FilterChain::new(),
            next_op: LogicalOp::And,
        }
    }

    pub fn where_(mut self, field: impl Into<String>, cond: Cond, value: impl Into<Value>) -> Self {
        let node = FilterNode::condition(field, cond, value.into());
        let op = std::mem::replace(&mut self.next_op, LogicalOp::And);
        self.chain.push(op, node);
        self
    }

    /// Join the previous and the next condition under an OR node.
    pub fn or(mut self) -> Self {
        self.next_op = LogicalOp::Or;
        self
    }

    /// Negate the next condition.
    pub fn not(mut self) -> Self {
        self.next_op = LogicalOp::Not;
        self
    }

    pub fn sort(mut self, field: impl Into<String>, desc: bool) -> Self {
        self.query.sort.push(Sort {
            field: field.into(),
            desc,
        });
        self
    }

    pub fn distinct(mut self, field: impl Into<String>) -> Self {
        self.query.distinct.push(field.into());
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.query.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: usize) -> Self {
        self.query.offset = Some(n);
        self
    }

    pub fn aggregate(mut self, kind: AggKind, field: impl Into<String>) -> Self {
        self.query.aggregations.push(AggSpec {
            field: field.into(),
            kind,
        });
        self
    }

    pub fn req_total(mut self) -> Self {
        self.query.req_total = true;
        self
    }

    /// Require the matched array-element index to align across `fields`.
    pub fn equal_position<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query
            .equal_position
            .push(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Attach a left-outer join on `(left_field, right_field)` pairs; the
    /// matched inner rows appear under `field` on each result row.
    pub fn join(
        mut self,
        field: impl Into<String>,
        on: Vec<(String, String)>,
        sub_query: Query,
    ) -> Self {
        self.query.joins.push(Join {
            field: field.into(),
            on,
            query: Box::new(sub_query),
        });
        self
    }

    pub fn build(mut self) -> Query {
        self.query.filter = self.chain.into_tree();
        self.query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_or_where_builds_or_group() {
        let q = QueryBuilder::new("ns")
            .where_("a", Cond::Eq, 1i64)
            .or()
            .where_("b", Cond::Eq, 2i64)
            .build();
        assert_eq!(
            q.filter,
            Some(FilterNode::or(vec![
                FilterNode::condition("a", Cond::Eq, Value::Int64(1)),
                FilterNode::condition("b", Cond::Eq, Value::Int64(2)),
            ]))
        );
    }

    #[test]
    fn not_attaches_to_next_where() {
        let q = QueryBuilder::new("ns")
            .where_("a", Cond::Eq, 1i64)
            .not()
            .where_("b", Cond::Eq, 2i64)
            .build();
        assert_eq!(
            q.filter,
            Some(FilterNode::and(vec![
                FilterNode::condition("a", Cond::Eq, Value::Int64(1)),
                FilterNode::Not(Box::new(FilterNode::condition(
                    "b",
                    Cond::Eq,
                    Value::Int64(2)
                ))),
            ]))
        );
    }

    #[test]
    fn sort_limit_offset_carry_through() {
        let q = QueryBuilder::new("ns")
            .sort("year", true)
            .limit(5)
            .offset(2)
            .req_total()
            .build();
        assert_eq!(q.sort, vec![Sort::desc("year")]);
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.offset, Some(2));
        assert!(q.req_total);
    }
}
