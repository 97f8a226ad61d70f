mod aggregate;
mod builder;
mod dsl;
mod filter;
mod operator;
mod query;
mod sort;
mod sql;
mod value;

pub use aggregate::{AggKind, AggSpec};
pub use builder::QueryBuilder;
pub use dsl::{parse_dsl, to_dsl, value_from_json, DslError};
pub use filter::{Filter, FilterChain, FilterNode, LogicalOp};
pub use operator::Cond;
pub use query::{Join, Query};
pub use sort::Sort;
pub use sql::{parse_sql, SqlError};
pub use value::Value;
