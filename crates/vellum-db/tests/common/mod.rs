#![allow(dead_code)]

use vellum_db::{Database, FieldDef, FieldType, IndexDef, IndexKind, NamespaceDef, ResultItem};
use vellum_query::Value;

/// Schema used across the query tests: pk `id`, tree `year`, hash `genre`,
/// composite `age+genre`.
pub fn items_def() -> NamespaceDef {
    NamespaceDef::new("items")
        .field(FieldDef::new("id", FieldType::Int64).not_null())
        .field(FieldDef::new("year", FieldType::Int32))
        .field(FieldDef::new("genre", FieldType::Int32))
        .field(FieldDef::new("age", FieldType::Int32))
        .field(FieldDef::new("age_limit", FieldType::Int32))
        .field(FieldDef::new("name", FieldType::String))
        .index(IndexDef::new("id", IndexKind::Hash, vec!["id"]).pk())
        .index(IndexDef::new("year", IndexKind::Tree, vec!["year"]))
        .index(IndexDef::new("genre", IndexKind::Hash, vec!["genre"]))
        .index(IndexDef::new("age+genre", IndexKind::Hash, vec!["age", "genre"]))
}

pub fn open_items() -> Database {
    let db = Database::new();
    db.open_namespace(items_def()).unwrap();
    db
}

pub fn id_of(item: &ResultItem) -> i64 {
    match item.payload.get(0) {
        Value::Int64(i) => *i,
        other => panic!("id is not an int64: {other:?}"),
    }
}

pub fn year_of(item: &ResultItem) -> i32 {
    match item.payload.get(1) {
        Value::Int32(i) => *i,
        other => panic!("year is not an int32: {other:?}"),
    }
}
