use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Scalar type of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Int32,
    Int64,
    Double,
    Bool,
    String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub array: bool,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub sparse: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> FieldDef {
        FieldDef {
            name: name.into(),
            field_type,
            array: false,
            nullable: true,
            sparse: false,
        }
    }

    pub fn array(mut self) -> Self {
        self.array = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.sparse = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// Index kind. A `hash` or `tree` index over two or more fields is a
/// composite index keyed by the field tuple. `Store` ("-") only
/// materializes; it never answers lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Hash,
    Tree,
    #[serde(rename = "-")]
    Store,
    Fulltext,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexOpts {
    #[serde(default)]
    pub pk: bool,
    #[serde(default)]
    pub sparse: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub kind: IndexKind,
    pub fields: Vec<String>,
    #[serde(default)]
    pub opts: IndexOpts,
}

impl IndexDef {
    pub fn new(name: impl Into<String>, kind: IndexKind, fields: Vec<&str>) -> IndexDef {
        IndexDef {
            name: name.into(),
            kind,
            fields: fields.into_iter().map(String::from).collect(),
            opts: IndexOpts::default(),
        }
    }

    pub fn pk(mut self) -> Self {
        self.opts.pk = true;
        self
    }

    pub fn sparse(mut self) -> Self {
        self.opts.sparse = true;
        self
    }

    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }
}

/// The namespace definition document submitted at open time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl NamespaceDef {
    pub fn new(name: impl Into<String>) -> NamespaceDef {
        NamespaceDef {
            name: name.into(),
            fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    /// Position of a field, matched case-insensitively.
    pub fn field_pos(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Params("namespace name is empty".into()));
        }

        for (i, field) in self.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::Params("field name is empty".into()));
            }
            if self.fields[..i]
                .iter()
                .any(|f| f.name.eq_ignore_ascii_case(&field.name))
            {
                return Err(Error::Params(format!(
                    "duplicate field {:?}",
                    field.name
                )));
            }
        }

        let mut pk_seen = false;
        for (i, index) in self.indexes.iter().enumerate() {
            if index.fields.is_empty() {
                return Err(Error::Params(format!(
                    "index {:?} has no fields",
                    index.name
                )));
            }
            if self.indexes[..i]
                .iter()
                .any(|x| x.name.eq_ignore_ascii_case(&index.name))
            {
                return Err(Error::Params(format!(
                    "duplicate index {:?}",
                    index.name
                )));
            }
            self.validate_index(index, &mut pk_seen)?;
        }

        Ok(())
    }

    pub(crate) fn validate_index(&self, index: &IndexDef, pk_seen: &mut bool) -> Result<()> {
        for field_name in &index.fields {
            let pos = self.field_pos(field_name).ok_or_else(|| {
                Error::Params(format!(
                    "index {:?} references unknown field {:?}",
                    index.name, field_name
                ))
            })?;
            if index.is_composite() && self.fields[pos].array {
                return Err(Error::Params(format!(
                    "composite index {:?} cannot include array field {:?}",
                    index.name, field_name
                )));
            }
        }

        if index.is_composite() && !matches!(index.kind, IndexKind::Hash | IndexKind::Tree) {
            return Err(Error::Params(format!(
                "composite index {:?} must be hash or tree",
                index.name
            )));
        }

        if index.kind == IndexKind::Fulltext {
            for field_name in &index.fields {
                let pos = self.field_pos(field_name).expect("checked above");
                if self.fields[pos].field_type != FieldType::String {
                    return Err(Error::Params(format!(
                        "fulltext index {:?} requires string field {:?}",
                        index.name, field_name
                    )));
                }
            }
        }

        if index.opts.pk {
            if *pk_seen {
                return Err(Error::Params("namespace declares more than one pk".into()));
            }
            *pk_seen = true;
            if !matches!(index.kind, IndexKind::Hash | IndexKind::Tree) {
                return Err(Error::Params("pk index must be hash or tree".into()));
            }
            if index.opts.sparse {
                return Err(Error::Params("pk index cannot be sparse".into()));
            }
            for field_name in &index.fields {
                let pos = self.field_pos(field_name).expect("checked above");
                if self.fields[pos].array {
                    return Err(Error::Params("pk field cannot be an array".into()));
                }
            }
        }

        Ok(())
    }

    /// Reopen compatibility: same fields and indexes, names compared
    /// case-insensitively, everything else exact.
    pub(crate) fn compatible_with(&self, other: &NamespaceDef) -> bool {
        fn norm(def: &NamespaceDef) -> NamespaceDef {
            let mut d = def.clone();
            d.name.make_ascii_lowercase();
            for f in &mut d.fields {
                f.name.make_ascii_lowercase();
            }
            for x in &mut d.indexes {
                x.name.make_ascii_lowercase();
                for f in &mut x.fields {
                    f.make_ascii_lowercase();
                }
            }
            d
        }
        norm(self) == norm(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movies() -> NamespaceDef {
        NamespaceDef::new("movies")
            .field(FieldDef::new("id", FieldType::Int64).not_null())
            .field(FieldDef::new("year", FieldType::Int32))
            .field(FieldDef::new("name", FieldType::String))
            .index(IndexDef::new("id", IndexKind::Hash, vec!["id"]).pk())
            .index(IndexDef::new("year", IndexKind::Tree, vec!["year"]))
    }

    #[test]
    fn valid_definition_passes() {
        movies().validate().unwrap();
    }

    #[test]
    fn duplicate_field_rejected() {
        let def = movies().field(FieldDef::new("YEAR", FieldType::Int32));
        assert!(matches!(def.validate(), Err(Error::Params(_))));
    }

    #[test]
    fn two_pks_rejected() {
        let def = movies().index(IndexDef::new("year2", IndexKind::Tree, vec!["year"]).pk());
        assert!(matches!(def.validate(), Err(Error::Params(_))));
    }

    #[test]
    fn index_on_unknown_field_rejected() {
        let def = movies().index(IndexDef::new("x", IndexKind::Hash, vec!["nope"]));
        assert!(matches!(def.validate(), Err(Error::Params(_))));
    }

    #[test]
    fn compatibility_ignores_name_case() {
        let a = movies();
        let mut b = movies();
        b.fields[1].name = "YEAR".into();
        assert!(a.compatible_with(&b));
        b.fields[1].field_type = FieldType::Int64;
        assert!(!a.compatible_with(&b));
    }

    #[test]
    fn definition_document_round_trips() {
        let def = movies();
        let json = serde_json::to_string(&def).unwrap();
        let back: NamespaceDef = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
