mod lexer;
mod parser;

use std::fmt;

use crate::query::Query;

#[derive(Debug)]
pub struct SqlError(pub String);

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sql error: {}", self.0)
    }
}

impl std::error::Error for SqlError {}

/// Parse a SQL statement into the query IR.
///
/// The supported subset is
/// `SELECT <cols|*|count(*)|agg(field)|distinct(field)> FROM ns
///  [WHERE expr] [ORDER BY field [ASC|DESC], …] [LIMIT n] [OFFSET n]`
/// with `=`, `<`, `<=`, `>`, `>=`, `IN (…)`, `RANGE (lo,hi)`, `AND`, `OR`,
/// `NOT` in `expr`. Keywords and identifiers are case-insensitive; quoted
/// identifiers preserve case for dotted field access.
pub fn parse_sql(input: &str) -> Result<Query, SqlError> {
    let tokens = lexer::tokenize(input).map_err(SqlError)?;
    parser::Parser::new(tokens).parse().map_err(SqlError)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::AggKind;
    use crate::builder::QueryBuilder;
    use crate::filter::FilterNode;
    use crate::operator::Cond;
    use crate::value::Value;

    #[test]
    fn select_star_with_eq() {
        let q = parse_sql("SELECT * FROM items WHERE year = 2002").unwrap();
        assert_eq!(q.namespace, "items");
        assert_eq!(
            q.filter,
            Some(FilterNode::condition("year", Cond::Eq, Value::Int64(2002)))
        );
    }

    #[test]
    fn sql_matches_builder_ir() {
        let sql = parse_sql(
            "SELECT * FROM ns WHERE year <= 2016 OR genre < 5 OR age_limit >= 40 ORDER BY year ASC",
        )
        .unwrap();
        let built = QueryBuilder::new("ns")
            .where_("year", Cond::Le, 2016i64)
            .or()
            .where_("genre", Cond::Lt, 5i64)
            .or()
            .where_("age_limit", Cond::Ge, 40i64)
            .sort("year", false)
            .build();
        assert_eq!(sql, built);
    }

    #[test]
    fn in_and_range_lists() {
        let q =
            parse_sql("SELECT * FROM ns WHERE genre IN (1, 2, 3) AND year RANGE (2010, 2020)")
                .unwrap();
        assert_eq!(
            q.filter,
            Some(FilterNode::and(vec![
                FilterNode::condition(
                    "genre",
                    Cond::Set,
                    Value::Tuple(vec![Value::Int64(1), Value::Int64(2), Value::Int64(3)]),
                ),
                FilterNode::condition(
                    "year",
                    Cond::Range,
                    Value::Tuple(vec![Value::Int64(2010), Value::Int64(2020)]),
                ),
            ]))
        );
    }

    #[test]
    fn not_and_parentheses() {
        let q = parse_sql("SELECT * FROM ns WHERE year = 2002 AND NOT name = 'sss'").unwrap();
        let built = QueryBuilder::new("ns")
            .where_("year", Cond::Eq, 2002i64)
            .not()
            .where_("name", Cond::Eq, "sss")
            .build();
        assert_eq!(q, built);

        let grouped =
            parse_sql("SELECT * FROM ns WHERE NOT (year = 2002 OR year = 2003)").unwrap();
        assert_eq!(
            grouped.filter,
            Some(FilterNode::Not(Box::new(FilterNode::or(vec![
                FilterNode::condition("year", Cond::Eq, Value::Int64(2002)),
                FilterNode::condition("year", Cond::Eq, Value::Int64(2003)),
            ]))))
        );
    }

    #[test]
    fn count_star_sets_req_total() {
        let q = parse_sql("SELECT count(*) FROM ns WHERE genre = 1").unwrap();
        assert!(q.req_total);
        assert_eq!(q.limit, Some(0));
    }

    #[test]
    fn aggregations_and_distinct() {
        let q = parse_sql("SELECT distinct(genre), sum(year), facet(age) FROM ns").unwrap();
        assert_eq!(q.distinct, vec!["genre".to_string()]);
        assert_eq!(q.aggregations.len(), 2);
        assert_eq!(q.aggregations[0].kind, AggKind::Sum);
        assert_eq!(q.aggregations[1].kind, AggKind::Facet);
    }

    #[test]
    fn limit_offset_and_order() {
        let q = parse_sql(
            "select * from ns where year range (2010,2020) order by year desc limit 5 offset 2",
        )
        .unwrap();
        assert_eq!(q.limit, Some(5));
        assert_eq!(q.offset, Some(2));
        assert_eq!(q.sort.len(), 1);
        assert!(q.sort[0].desc);
    }

    #[test]
    fn quoted_identifier_preserves_case() {
        let q = parse_sql("SELECT * FROM ns WHERE 'Actor.Name' = 'x'").unwrap();
        assert_eq!(
            q.filter,
            Some(FilterNode::condition(
                "Actor.Name",
                Cond::Eq,
                Value::from("x")
            ))
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(parse_sql("SELECT * FROM").is_err());
        assert!(parse_sql("UPDATE ns SET a = 1").is_err());
        assert!(parse_sql("SELECT * FROM ns WHERE year LIKE 2").is_err());
    }
}
