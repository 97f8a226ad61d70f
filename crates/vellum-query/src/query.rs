use serde::{Deserialize, Serialize};

use crate::aggregate::AggSpec;
use crate::filter::FilterNode;
use crate::sort::Sort;

/// The normalized query form consumed by the planner.
///
/// All three front-ends (fluent builder, structured DSL, SQL) emit this
/// shape; equivalent queries are required to produce equal IRs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub namespace: String,
    #[serde(default)]
    pub filter: Option<FilterNode>,
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default)]
    pub distinct: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub aggregations: Vec<AggSpec>,
    #[serde(default)]
    pub req_total: bool,
    /// Groups of array fields whose matched element index must align
    /// within one conjunction.
    #[serde(default)]
    pub equal_position: Vec<Vec<String>>,
    #[serde(default)]
    pub joins: Vec<Join>,
}

impl Query {
    pub fn new(namespace: impl Into<String>) -> Query {
        Query {
            namespace: namespace.into(),
            filter: None,
            sort: Vec::new(),
            distinct: Vec::new(),
            limit: None,
            offset: None,
            aggregations: Vec::new(),
            req_total: false,
            equal_position: Vec::new(),
            joins: Vec::new(),
        }
    }
}

/// A left-outer join: for each outer row the sub-query runs with every
/// `on` pair bound as `right_field EQ outer_row[left_field]`, and the
/// matching rows attach to the outer payload under `field`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub field: String,
    /// (left outer field, right inner field) pairs.
    pub on: Vec<(String, String)>,
    pub query: Box<Query>,
}
