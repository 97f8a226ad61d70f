mod common;

use std::collections::HashMap;

use common::open_items;
use rand::Rng;
use vellum_query::{AggKind, Cond, QueryBuilder, Value};

#[test]
fn aggregations_cover_the_full_match_set_despite_limit() {
    let db = open_items();
    let mut rng = rand::thread_rng();

    let mut expected_sum = 0i64;
    let mut expected_min = i64::MAX;
    let mut expected_max = i64::MIN;
    let mut expected_count = 0i64;
    let mut expected_facets: HashMap<i64, u64> = HashMap::new();

    for id in 0..500i64 {
        let genre = rng.gen_range(0..20);
        let year = rng.gen_range(2000..=2030) as i64;
        let age = rng.gen_range(0..5) as i64;
        db.upsert(
            "items",
            &serde_json::json!({"id": id, "genre": genre, "year": year, "age": age}),
        )
        .unwrap();
        if genre == 10 {
            expected_sum += year;
            expected_min = expected_min.min(age);
            expected_max = expected_max.max(age);
            expected_count += 1;
            *expected_facets.entry(age).or_insert(0) += 1;
        }
    }
    assert!(expected_count > 0, "unlucky seed: no genre 10 rows");

    let q = QueryBuilder::new("items")
        .where_("genre", Cond::Eq, 10i64)
        .limit(100)
        .aggregate(AggKind::Avg, "year")
        .aggregate(AggKind::Sum, "year")
        .aggregate(AggKind::Min, "age")
        .aggregate(AggKind::Max, "age")
        .aggregate(AggKind::Facet, "age")
        .req_total()
        .build();
    let it = db.query(&q).unwrap();
    assert_eq!(it.total(), Some(expected_count as usize));

    let aggs = it.aggregations().to_vec();
    let find = |kind: AggKind, field: &str| {
        aggs.iter()
            .find(|a| a.kind == kind && a.field == field)
            .unwrap()
            .clone()
    };

    // Aggregations see the full matching set, not the limited window.
    assert_eq!(find(AggKind::Sum, "year").value, expected_sum as f64);
    assert_eq!(
        find(AggKind::Avg, "year").value,
        expected_sum as f64 / expected_count as f64
    );
    assert_eq!(find(AggKind::Min, "age").value, expected_min as f64);
    assert_eq!(find(AggKind::Max, "age").value, expected_max as f64);

    let facet = find(AggKind::Facet, "age");
    assert_eq!(facet.facets.len(), expected_facets.len());
    for (value, count) in &facet.facets {
        let Value::Int32(age) = value else {
            panic!("facet bucket is not an int32");
        };
        assert_eq!(expected_facets[&(*age as i64)], *count);
    }

    // Returned rows still honor the limit.
    let rows = db.query(&q).unwrap().count();
    assert!(rows <= 100);
}

#[test]
fn avg_over_zero_rows_is_zero_not_nan() {
    let db = open_items();
    let q = QueryBuilder::new("items")
        .where_("genre", Cond::Eq, 999i64)
        .aggregate(AggKind::Avg, "year")
        .build();
    let it = db.query(&q).unwrap();
    let agg = &it.aggregations()[0];
    assert_eq!(agg.value, 0.0);
    assert_eq!(agg.count, 0);
}

#[test]
fn aggregation_field_names_are_case_insensitive() {
    let db = open_items();
    for id in 0..5i64 {
        db.upsert("items", &serde_json::json!({"id": id, "year": 2000 + id}))
            .unwrap();
    }

    let q = QueryBuilder::new("items")
        .aggregate(AggKind::Sum, "YEAR")
        .build();
    let it = db.query(&q).unwrap();
    assert_eq!(it.aggregations()[0].value, (2000 + 2001 + 2002 + 2003 + 2004) as f64);
    // Result reports the canonical spelling.
    assert_eq!(it.aggregations()[0].field, "year");
}

#[test]
fn integer_sum_saturates_instead_of_wrapping() {
    let db = open_items();
    db.upsert("items", &serde_json::json!({"id": 1, "year": i32::MAX}))
        .unwrap();
    db.upsert("items", &serde_json::json!({"id": 2, "year": i32::MAX}))
        .unwrap();

    let q = QueryBuilder::new("items")
        .aggregate(AggKind::Sum, "year")
        .build();
    let it = db.query(&q).unwrap();
    // Two i32::MAX values fit comfortably in the widened accumulator.
    assert_eq!(it.aggregations()[0].value, 2.0 * i32::MAX as f64);
}
