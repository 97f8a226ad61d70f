use serde::{Deserialize, Serialize};
use vellum_query::Value;

use crate::error::{Error, Result};
use crate::schema::{FieldDef, FieldType, NamespaceDef};

/// Engine-assigned monotonic row identifier, unique within a namespace.
pub type RowId = u64;

/// A schema-ordered record of values. Array fields hold `Value::Tuple`;
/// an absent field holds `Value::Null`. Payloads are the sole source of
/// truth — every index maps back into them by row-id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    values: Vec<Value>,
}

impl Payload {
    pub fn get(&self, pos: usize) -> &Value {
        &self.values[pos]
    }

    /// Whether the field at `pos` is present: non-null, and for arrays
    /// non-empty.
    pub fn present(&self, pos: usize) -> bool {
        match &self.values[pos] {
            Value::Null => false,
            Value::Tuple(items) => !items.is_empty(),
            _ => true,
        }
    }

    /// All scalar values of the field at `pos`: one element for scalars,
    /// each element for arrays, nothing when absent.
    pub fn scalars(&self, pos: usize) -> &[Value] {
        match &self.values[pos] {
            Value::Null => &[],
            Value::Tuple(items) => items,
            single => std::slice::from_ref(single),
        }
    }

    /// Build a payload from a JSON document, coercing literals to the
    /// declared field types. Unknown keys and type mismatches are
    /// `ErrParams`.
    pub fn from_json(def: &NamespaceDef, doc: &serde_json::Value) -> Result<Payload> {
        let obj = doc
            .as_object()
            .ok_or_else(|| Error::Params("document must be a JSON object".into()))?;

        let mut values = vec![Value::Null; def.fields.len()];
        for (key, raw) in obj {
            let pos = def
                .field_pos(key)
                .ok_or_else(|| Error::Params(format!("unknown field {key:?}")))?;
            values[pos] = coerce_field(&def.fields[pos], raw)?;
        }

        for (pos, field) in def.fields.iter().enumerate() {
            if !field.nullable && values[pos] == Value::Null {
                return Err(Error::Params(format!(
                    "field {:?} must not be null",
                    field.name
                )));
            }
        }

        Ok(Payload { values })
    }

    /// Render the payload back into a JSON document, canonically spelled
    /// field names, absent fields omitted.
    pub fn to_json(&self, def: &NamespaceDef) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        for (pos, field) in def.fields.iter().enumerate() {
            let value = &self.values[pos];
            if *value == Value::Null {
                continue;
            }
            obj.insert(field.name.clone(), value_to_json(value));
        }
        serde_json::Value::Object(obj)
    }
}

fn coerce_field(field: &FieldDef, raw: &serde_json::Value) -> Result<Value> {
    if raw.is_null() {
        return Ok(Value::Null);
    }

    if field.array {
        let items = raw.as_array().ok_or_else(|| {
            Error::Params(format!("field {:?} expects an array", field.name))
        })?;
        let coerced: Result<Vec<Value>> = items
            .iter()
            .map(|item| coerce_scalar(field, item))
            .collect();
        return Ok(Value::Tuple(coerced?));
    }

    coerce_scalar(field, raw)
}

fn coerce_scalar(field: &FieldDef, raw: &serde_json::Value) -> Result<Value> {
    let mismatch = || {
        Error::Params(format!(
            "field {:?} expects {:?}, got {raw}",
            field.name, field.field_type
        ))
    };

    match field.field_type {
        FieldType::Int32 => {
            let i = raw.as_i64().ok_or_else(mismatch)?;
            let i32_val = i32::try_from(i).map_err(|_| {
                Error::Params(format!("field {:?}: {i} out of int32 range", field.name))
            })?;
            Ok(Value::Int32(i32_val))
        }
        FieldType::Int64 => Ok(Value::Int64(raw.as_i64().ok_or_else(mismatch)?)),
        FieldType::Double => Ok(Value::Double(raw.as_f64().ok_or_else(mismatch)?)),
        FieldType::Bool => Ok(Value::Bool(raw.as_bool().ok_or_else(mismatch)?)),
        FieldType::String => Ok(Value::String(
            raw.as_str().ok_or_else(mismatch)?.to_string(),
        )),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::json!(*b),
        Value::Int32(i) => serde_json::json!(*i),
        Value::Int64(i) => serde_json::json!(*i),
        Value::Double(d) => serde_json::json!(*d),
        Value::String(s) => serde_json::json!(s),
        Value::Tuple(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, IndexDef, IndexKind};

    fn def() -> NamespaceDef {
        NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int64).not_null())
            .field(FieldDef::new("year", FieldType::Int32))
            .field(FieldDef::new("name", FieldType::String))
            .field(FieldDef::new("tags", FieldType::String).array())
            .index(IndexDef::new("id", IndexKind::Hash, vec!["id"]).pk())
    }

    #[test]
    fn from_json_coerces_types() {
        let p = Payload::from_json(
            &def(),
            &serde_json::json!({"id": 1, "year": 2001, "name": "blabla", "tags": ["a", "b"]}),
        )
        .unwrap();
        assert_eq!(p.get(0), &Value::Int64(1));
        assert_eq!(p.get(1), &Value::Int32(2001));
        assert_eq!(p.scalars(3).len(), 2);
    }

    #[test]
    fn field_names_match_case_insensitively() {
        let p = Payload::from_json(&def(), &serde_json::json!({"id": 1, "YEAR": 2001})).unwrap();
        assert_eq!(p.get(1), &Value::Int32(2001));
    }

    #[test]
    fn unknown_field_is_params_error() {
        let err = Payload::from_json(&def(), &serde_json::json!({"id": 1, "nope": 2}));
        assert!(matches!(err, Err(Error::Params(_))));
    }

    #[test]
    fn type_mismatch_is_params_error() {
        let err = Payload::from_json(&def(), &serde_json::json!({"id": 1, "year": "2001"}));
        assert!(matches!(err, Err(Error::Params(_))));
    }

    #[test]
    fn int32_overflow_rejected() {
        let err = Payload::from_json(&def(), &serde_json::json!({"id": 1, "year": 5_000_000_000i64}));
        assert!(matches!(err, Err(Error::Params(_))));
    }

    #[test]
    fn not_null_field_required() {
        let err = Payload::from_json(&def(), &serde_json::json!({"year": 2001}));
        assert!(matches!(err, Err(Error::Params(_))));
    }

    #[test]
    fn to_json_omits_absent_fields() {
        let p = Payload::from_json(&def(), &serde_json::json!({"id": 7})).unwrap();
        assert_eq!(p.to_json(&def()), serde_json::json!({"id": 7}));
    }
}
