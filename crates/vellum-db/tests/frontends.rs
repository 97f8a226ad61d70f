mod common;

use common::{id_of, open_items};
use rand::Rng;
use vellum_query::{parse_dsl, to_dsl, AggKind, Cond, QueryBuilder};

/// Seed 300 rows with correlated fields for equivalence checks.
fn seed(db: &vellum_db::Database) {
    let mut rng = rand::thread_rng();
    for id in 0..300i64 {
        db.upsert(
            "items",
            &serde_json::json!({
                "id": id,
                "year": rng.gen_range(2000..=2030),
                "genre": rng.gen_range(0..8),
                "age": rng.gen_range(0..5),
            }),
        )
        .unwrap();
    }
}

#[test]
fn builder_sql_and_dsl_agree_on_rows_and_aggregations() {
    let db = open_items();
    seed(&db);

    let built = QueryBuilder::new("items")
        .where_("year", Cond::Range, vec![2005i64, 2015i64])
        .or()
        .where_("genre", Cond::Eq, 3i64)
        .sort("year", false)
        .aggregate(AggKind::Sum, "age")
        .req_total()
        .build();

    let sql = db
        .query_sql(
            "SELECT sum(age) FROM items WHERE year RANGE (2005, 2015) OR genre = 3 ORDER BY year",
        )
        .unwrap();
    let dsl = db
        .query_dsl(
            r#"{"namespace":"items",
                "filters":[
                    {"field":"year","cond":"RANGE","value":[2005,2015]},
                    {"op":"OR","field":"genre","cond":"EQ","value":3}
                ],
                "sort":[{"field":"year"}],
                "aggregations":[{"field":"age","kind":"SUM"}],
                "req_total":true}"#,
        )
        .unwrap();
    let from_builder = db.query(&built).unwrap();

    let sql_sum = sql.aggregations()[0].value;
    let dsl_sum = dsl.aggregations()[0].value;
    let builder_sum = from_builder.aggregations()[0].value;
    assert_eq!(sql_sum, builder_sum);
    assert_eq!(dsl_sum, builder_sum);

    let builder_ids: Vec<i64> = from_builder.map(|r| id_of(&r)).collect();
    let sql_ids: Vec<i64> = sql.map(|r| id_of(&r)).collect();
    let dsl_ids: Vec<i64> = dsl.map(|r| id_of(&r)).collect();
    assert!(!builder_ids.is_empty());
    assert_eq!(sql_ids, builder_ids);
    assert_eq!(dsl_ids, builder_ids);
}

#[test]
fn sql_count_star_equals_req_total() {
    let db = open_items();
    seed(&db);

    let counted = db
        .query_sql("SELECT count(*) FROM items WHERE genre = 3")
        .unwrap();
    assert_eq!(counted.len(), 0, "count(*) returns no rows");

    let q = QueryBuilder::new("items")
        .where_("genre", Cond::Eq, 3i64)
        .req_total()
        .build();
    assert_eq!(counted.total(), db.query(&q).unwrap().total());
}

#[test]
fn dsl_round_trip_executes_identically() {
    let db = open_items();
    seed(&db);

    let q = QueryBuilder::new("items")
        .where_("year", Cond::Ge, 2010i64)
        .not()
        .where_("genre", Cond::Eq, 2i64)
        .sort("year", true)
        .limit(20)
        .build();
    let round = parse_dsl(&to_dsl(&q)).unwrap();
    assert_eq!(q, round);

    let a: Vec<i64> = db.query(&q).unwrap().map(|r| id_of(&r)).collect();
    let b: Vec<i64> = db.query(&round).unwrap().map(|r| id_of(&r)).collect();
    assert_eq!(a, b);
}

#[test]
fn sql_errors_are_err_sql() {
    let db = open_items();
    assert!(matches!(
        db.query_sql("SELEC * FROM items"),
        Err(vellum_db::Error::Sql(_))
    ));
    assert!(matches!(
        db.query_sql("SELECT * FROM items WHERE year BETWEEN 1 AND 2"),
        Err(vellum_db::Error::Sql(_))
    ));
}

#[test]
fn quoted_sql_identifier_resolves_case_insensitively() {
    let db = open_items();
    db.upsert("items", &serde_json::json!({"id": 1, "year": 2005}))
        .unwrap();
    // Quoted spelling differs from the declared one; planner matching is
    // case-insensitive.
    let rows = db
        .query_sql("SELECT * FROM items WHERE 'Year' = 2005")
        .unwrap();
    assert_eq!(rows.count(), 1);
}
