use serde::{Deserialize, Serialize};

use crate::operator::Cond;
use crate::value::Value;

/// A single field condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub cond: Cond,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// A recursive predicate tree.
///
/// Groups are n-ary: siblings under `And`/`Or` are flattened, which is
/// semantically identical to the binary right-associative form the
/// front-ends accept. `Not` is unary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterNode {
    Condition(Filter),
    Group {
        logical: LogicalOp,
        children: Vec<FilterNode>,
    },
    Not(Box<FilterNode>),
}

impl FilterNode {
    pub fn condition(field: impl Into<String>, cond: Cond, value: Value) -> FilterNode {
        FilterNode::Condition(Filter {
            field: field.into(),
            cond,
            value,
        })
    }

    pub fn and(children: Vec<FilterNode>) -> FilterNode {
        FilterNode::Group {
            logical: LogicalOp::And,
            children,
        }
    }

    pub fn or(children: Vec<FilterNode>) -> FilterNode {
        FilterNode::Group {
            logical: LogicalOp::Or,
            children,
        }
    }
}

/// Accumulates (op, node) pairs into a predicate tree.
///
/// Shared by the fluent builder and the structured DSL so both produce the
/// same shape for the same logical query: entries chain under an implicit
/// AND, `Or` joins an entry with its left sibling, `Not` wraps the entry.
#[derive(Debug, Default)]
pub struct FilterChain {
    items: Vec<FilterNode>,
}

impl FilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: LogicalOp, node: FilterNode) {
        match op {
            LogicalOp::And => self.items.push(node),
            LogicalOp::Not => self.items.push(FilterNode::Not(Box::new(node))),
            LogicalOp::Or => match self.items.pop() {
                // Fold into the existing OR group so `a OR b OR c` stays
                // one n-ary sibling set.
                Some(FilterNode::Group {
                    logical: LogicalOp::Or,
                    mut children,
                }) => {
                    children.push(node);
                    self.items.push(FilterNode::or(children));
                }
                Some(prev) => self.items.push(FilterNode::or(vec![prev, node])),
                // OR with no left sibling degrades to AND.
                None => self.items.push(node),
            },
        }
    }

    pub fn into_tree(mut self) -> Option<FilterNode> {
        match self.items.len() {
            0 => None,
            1 => Some(self.items.remove(0)),
            _ => Some(FilterNode::and(self.items)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(field: &str, v: i64) -> FilterNode {
        FilterNode::condition(field, Cond::Eq, Value::Int64(v))
    }

    #[test]
    fn chain_of_ands() {
        let mut chain = FilterChain::new();
        chain.push(LogicalOp::And, eq("a", 1));
        chain.push(LogicalOp::And, eq("b", 2));
        assert_eq!(
            chain.into_tree(),
            Some(FilterNode::and(vec![eq("a", 1), eq("b", 2)]))
        );
    }

    #[test]
    fn or_folds_into_sibling_group() {
        let mut chain = FilterChain::new();
        chain.push(LogicalOp::And, eq("a", 1));
        chain.push(LogicalOp::Or, eq("b", 2));
        chain.push(LogicalOp::Or, eq("c", 3));
        assert_eq!(
            chain.into_tree(),
            Some(FilterNode::or(vec![eq("a", 1), eq("b", 2), eq("c", 3)]))
        );
    }

    #[test]
    fn or_binds_to_immediate_left_sibling_only() {
        let mut chain = FilterChain::new();
        chain.push(LogicalOp::And, eq("a", 1));
        chain.push(LogicalOp::And, eq("b", 2));
        chain.push(LogicalOp::Or, eq("c", 3));
        assert_eq!(
            chain.into_tree(),
            Some(FilterNode::and(vec![
                eq("a", 1),
                FilterNode::or(vec![eq("b", 2), eq("c", 3)]),
            ]))
        );
    }

    #[test]
    fn not_wraps_entry() {
        let mut chain = FilterChain::new();
        chain.push(LogicalOp::And, eq("a", 1));
        chain.push(LogicalOp::Not, eq("b", 2));
        assert_eq!(
            chain.into_tree(),
            Some(FilterNode::and(vec![
                eq("a", 1),
                FilterNode::Not(Box::new(eq("b", 2))),
            ]))
        );
    }
}
