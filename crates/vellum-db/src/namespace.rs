use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use vellum_query::Value;
use vellum_store::{BatchOp, Store};

use crate::error::{Error, Result};
use crate::index::Index;
use crate::payload::{Payload, RowId};
use crate::persist;
use crate::schema::{IndexDef, NamespaceDef};

/// The guarded state of one namespace: row store, index set, pk map and
/// metadata. Everything behind [`Namespace`]'s reader-writer lock.
pub(crate) struct NamespaceCore {
    def: NamespaceDef,
    indexes: Vec<Index>,
    rows: BTreeMap<RowId, Payload>,
    pk_map: HashMap<Value, RowId>,
    pk_index: usize,
    next_row_id: RowId,
    meta: BTreeMap<String, Vec<u8>>,
    journal_seq: u64,
}

impl NamespaceCore {
    fn build(def: NamespaceDef) -> Result<NamespaceCore> {
        def.validate()?;

        let pk_index = def
            .indexes
            .iter()
            .position(|x| x.opts.pk)
            .ok_or_else(|| Error::Params(format!("namespace {:?} declares no pk", def.name)))?;

        let indexes: Result<Vec<Index>> = def
            .indexes
            .iter()
            .map(|x| Index::build(x.clone(), &def))
            .collect();

        Ok(NamespaceCore {
            indexes: indexes?,
            pk_index,
            def,
            rows: BTreeMap::new(),
            pk_map: HashMap::new(),
            next_row_id: 1,
            meta: BTreeMap::new(),
            journal_seq: 0,
        })
    }

    pub fn def(&self) -> &NamespaceDef {
        &self.def
    }

    pub fn indexes(&self) -> &[Index] {
        &self.indexes
    }

    pub fn rows(&self) -> &BTreeMap<RowId, Payload> {
        &self.rows
    }

    pub fn pk_index(&self) -> usize {
        self.pk_index
    }

    /// Pk key of a payload: the scalar for a single-field pk, the field
    /// tuple for a composite pk. Every pk field must be present.
    pub fn pk_key(&self, payload: &Payload) -> Result<Value> {
        let index = &self.indexes[self.pk_index];
        let mut keys = index.keys_for(payload);
        if keys.is_empty() {
            return Err(Error::Params(format!(
                "payload is missing pk {:?}",
                index.def.name
            )));
        }
        if keys.len() > 1 {
            return Err(Error::logic("pk produced more than one key"));
        }
        Ok(keys.remove(0))
    }

    pub fn row_by_pk(&self, key: &Value) -> Option<(RowId, &Payload)> {
        let row_id = *self.pk_map.get(key)?;
        self.rows.get(&row_id).map(|p| (row_id, p))
    }

    /// Insert or replace by pk. All indexes update before the new payload
    /// is visible, which the caller guarantees by holding the write lock.
    /// Returns the row-id and the replaced payload, if any.
    pub fn upsert(&mut self, payload: Payload) -> Result<(RowId, Option<Payload>)> {
        let key = self.pk_key(&payload)?;

        match self.pk_map.get(&key).copied() {
            Some(row_id) => {
                let old = self
                    .rows
                    .remove(&row_id)
                    .ok_or_else(|| Error::logic("pk map points at a missing row"))?;
                for index in &mut self.indexes {
                    index.erase(row_id, &old);
                    index.insert(row_id, &payload);
                }
                self.rows.insert(row_id, payload);
                Ok((row_id, Some(old)))
            }
            None => {
                let row_id = self.next_row_id;
                self.next_row_id += 1;
                for index in &mut self.indexes {
                    index.insert(row_id, &payload);
                }
                self.pk_map.insert(key, row_id);
                self.rows.insert(row_id, payload);
                Ok((row_id, None))
            }
        }
    }

    /// Delete by pk; fields beyond the pk are ignored. Returns the removed
    /// row-id, or `None` when the pk did not match (idempotent).
    pub fn delete_by_pk(&mut self, payload: &Payload) -> Result<Option<RowId>> {
        let key = self.pk_key(payload)?;
        match self.pk_map.remove(&key) {
            Some(row_id) => {
                self.remove_row(row_id)?;
                Ok(Some(row_id))
            }
            None => Ok(None),
        }
    }

    /// Remove a row by id, erasing its index entries. The pk map entry
    /// must already be gone or is removed here.
    pub fn remove_row(&mut self, row_id: RowId) -> Result<Payload> {
        let payload = self
            .rows
            .remove(&row_id)
            .ok_or_else(|| Error::logic(format!("row {row_id} missing from store")))?;
        for index in &mut self.indexes {
            index.erase(row_id, &payload);
        }
        let key = self.pk_key(&payload)?;
        self.pk_map.remove(&key);
        Ok(payload)
    }

    pub fn truncate(&mut self) {
        self.rows.clear();
        self.pk_map.clear();
        let defs: Vec<IndexDef> = self.indexes.iter().map(|x| x.def.clone()).collect();
        self.indexes = defs
            .into_iter()
            .map(|d| Index::build(d, &self.def).expect("existing index defs are valid"))
            .collect();
    }

    // ── Index management ────────────────────────────────────────

    /// Build an index over the current row store. Pk indexes verify
    /// uniqueness before anything becomes visible.
    fn rebuild_index(&self, def: IndexDef) -> Result<Index> {
        let mut index = Index::build(def, &self.def)?;
        let mut seen_keys: HashMap<Value, RowId> = HashMap::new();
        for (&row_id, payload) in &self.rows {
            if index.def.opts.pk {
                for key in index.keys_for(payload) {
                    if let Some(&other) = seen_keys.get(&key) {
                        return Err(Error::Conflict(format!(
                            "pk {:?} duplicated by rows {other} and {row_id}",
                            index.def.name
                        )));
                    }
                    seen_keys.insert(key, row_id);
                }
            }
            index.insert(row_id, payload);
        }
        Ok(index)
    }

    pub fn add_index(&mut self, def: IndexDef) -> Result<()> {
        if self
            .indexes
            .iter()
            .any(|x| x.def.name.eq_ignore_ascii_case(&def.name))
        {
            return Err(Error::Conflict(format!(
                "index {:?} already exists",
                def.name
            )));
        }
        let mut pk_seen = self.indexes.iter().any(|x| x.def.opts.pk);
        self.def.validate_index(&def, &mut pk_seen)?;

        tracing::debug!(target: "vellum", namespace = %self.def.name, index = %def.name, "rebuilding index");
        let index = self.rebuild_index(def.clone())?;
        self.indexes.push(index);
        self.def.indexes.push(def);
        Ok(())
    }

    pub fn update_index(&mut self, def: IndexDef) -> Result<()> {
        let pos = self
            .indexes
            .iter()
            .position(|x| x.def.name.eq_ignore_ascii_case(&def.name))
            .ok_or_else(|| Error::NotFound(format!("index {:?}", def.name)))?;

        let mut pk_seen = self
            .indexes
            .iter()
            .enumerate()
            .any(|(i, x)| i != pos && x.def.opts.pk);
        self.def.validate_index(&def, &mut pk_seen)?;
        if self.indexes[pos].def.opts.pk && !def.opts.pk {
            return Err(Error::Params("cannot demote the pk index".into()));
        }

        tracing::debug!(target: "vellum", namespace = %self.def.name, index = %def.name, "rebuilding index");
        let index = self.rebuild_index(def.clone())?;
        self.indexes[pos] = index;
        self.def.indexes[pos] = def;
        Ok(())
    }

    pub fn drop_index(&mut self, name: &str) -> Result<IndexDef> {
        let pos = self
            .indexes
            .iter()
            .position(|x| x.def.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::NotFound(format!("index {name:?}")))?;
        if self.indexes[pos].def.opts.pk {
            return Err(Error::Params("cannot drop the pk index".into()));
        }
        let dropped = self.indexes.remove(pos).def;
        self.def.indexes.remove(pos);
        Ok(dropped)
    }

    // ── Metadata KV ─────────────────────────────────────────────

    pub fn put_meta(&mut self, key: &str, value: Vec<u8>) {
        self.meta.insert(key.to_string(), value);
    }

    pub fn get_meta(&self, key: &str) -> Option<Vec<u8>> {
        self.meta.get(key).cloned()
    }

    pub fn enum_meta(&self) -> Vec<String> {
        self.meta.keys().cloned().collect()
    }

    fn next_journal_seq(&mut self) -> u64 {
        self.journal_seq += 1;
        self.journal_seq
    }
}

/// A named collection of rows sharing one schema and one index set,
/// guarded by a single reader-writer lock. Optionally mirrored into a
/// persistence collaborator.
pub struct Namespace {
    name: String,
    core: RwLock<NamespaceCore>,
    storage: Option<Arc<dyn Store>>,
}

impl Namespace {
    /// Open a namespace from its definition, reloading rows and metadata
    /// from the backing store when one is attached. A stored definition
    /// with differing fields fails with `ErrConflict`.
    pub(crate) fn open(def: NamespaceDef, storage: Option<Arc<dyn Store>>) -> Result<Namespace> {
        let name = def.name.clone();

        let effective = match &storage {
            Some(store) => match store.get(&persist::def_key(&name))? {
                Some(bytes) => {
                    let stored = persist::decode_def(&bytes)?;
                    if !fields_compatible(&stored, &def) {
                        return Err(Error::Conflict(format!(
                            "namespace {name:?} is stored with a different schema"
                        )));
                    }
                    // Index changes made at runtime survive reopen.
                    stored
                }
                None => {
                    store.put(&persist::def_key(&name), &persist::encode_def(&def)?)?;
                    def
                }
            },
            None => def,
        };

        let mut core = NamespaceCore::build(effective)?;

        if let Some(store) = &storage {
            for (key, bytes) in store.range(&persist::row_prefix(&name))? {
                let row_id = persist::row_id_from_key(&name, &key)?;
                let payload = persist::decode_payload(&bytes)?;
                let pk = core.pk_key(&payload)?;
                if core.pk_map.insert(pk, row_id).is_some() {
                    return Err(Error::Conflict(format!(
                        "stored namespace {name:?} has duplicate pk"
                    )));
                }
                for index in &mut core.indexes {
                    index.insert(row_id, &payload);
                }
                core.rows.insert(row_id, payload);
                core.next_row_id = core.next_row_id.max(row_id + 1);
            }

            let meta_prefix = persist::meta_prefix(&name);
            for (key, value) in store.range(&meta_prefix)? {
                let meta_key = String::from_utf8_lossy(&key[meta_prefix.len()..]).into_owned();
                core.meta.insert(meta_key, value);
            }

            core.journal_seq = store.range(&persist::journal_prefix(&name))?.len() as u64;
        }

        Ok(Namespace {
            name,
            core: RwLock::new(core),
            storage,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn def(&self) -> NamespaceDef {
        self.core.read().def.clone()
    }

    pub fn row_count(&self) -> usize {
        self.core.read().rows.len()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, NamespaceCore> {
        self.core.read()
    }

    pub(crate) fn storage(&self) -> Option<&Arc<dyn Store>> {
        self.storage.as_ref()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, NamespaceCore> {
        self.core.write()
    }

    // ── Writes ──────────────────────────────────────────────────

    pub fn upsert(&self, doc: &serde_json::Value) -> Result<RowId> {
        let core = self.core.read();
        let payload = Payload::from_json(core.def(), doc)?;
        drop(core);

        let mut core = self.core.write();
        let (row_id, _old) = core.upsert(payload.clone())?;
        drop(core);

        if let Some(store) = &self.storage {
            store.batch_commit(vec![BatchOp::Put {
                key: persist::row_key(&self.name, row_id),
                value: persist::encode_payload(&payload)?,
            }])?;
        }
        Ok(row_id)
    }

    /// Delete by pk; the payload's non-pk fields are ignored. Returns
    /// whether a row was removed; a redelete is a no-op, never an error.
    pub fn delete(&self, doc: &serde_json::Value) -> Result<bool> {
        let core = self.core.read();
        let payload = Payload::from_json(core.def(), doc)?;
        drop(core);

        let mut core = self.core.write();
        let removed = core.delete_by_pk(&payload)?;
        drop(core);

        if let Some(row_id) = removed {
            if let Some(store) = &self.storage {
                store.batch_commit(vec![BatchOp::Delete {
                    key: persist::row_key(&self.name, row_id),
                }])?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Point read by pk value. `ErrNotFound` on a miss.
    pub fn get_by_pk(&self, key: &Value) -> Result<Payload> {
        let core = self.core.read();
        core.row_by_pk(key)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| Error::NotFound(format!("{}[{key}]", self.name)))
    }

    pub fn truncate(&self) -> Result<()> {
        let mut core = self.core.write();
        let row_ids: Vec<RowId> = core.rows.keys().copied().collect();
        core.truncate();
        drop(core);

        if let Some(store) = &self.storage {
            let ops = row_ids
                .into_iter()
                .map(|row_id| BatchOp::Delete {
                    key: persist::row_key(&self.name, row_id),
                })
                .collect();
            store.batch_commit(ops)?;
        }
        Ok(())
    }

    // ── Index management ────────────────────────────────────────

    pub fn add_index(&self, def: IndexDef) -> Result<()> {
        let mut core = self.core.write();
        core.add_index(def.clone())?;
        self.persist_index_change(&mut core, persist::JournalAction::Add, def)
    }

    pub fn update_index(&self, def: IndexDef) -> Result<()> {
        let mut core = self.core.write();
        core.update_index(def.clone())?;
        self.persist_index_change(&mut core, persist::JournalAction::Update, def)
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut core = self.core.write();
        let dropped = core.drop_index(name)?;
        self.persist_index_change(&mut core, persist::JournalAction::Drop, dropped)
    }

    fn persist_index_change(
        &self,
        core: &mut NamespaceCore,
        action: persist::JournalAction,
        index: IndexDef,
    ) -> Result<()> {
        let Some(store) = &self.storage else {
            return Ok(());
        };
        let seq = core.next_journal_seq();
        let entry = persist::JournalEntry { seq, action, index };
        store.batch_commit(vec![
            BatchOp::Put {
                key: persist::journal_key(&self.name, seq),
                value: persist::encode_journal(&entry)?,
            },
            BatchOp::Put {
                key: persist::def_key(&self.name),
                value: persist::encode_def(core.def())?,
            },
        ])?;
        Ok(())
    }

    // ── Metadata KV ─────────────────────────────────────────────

    pub fn put_meta(&self, key: &str, value: &[u8]) -> Result<()> {
        self.core.write().put_meta(key, value.to_vec());
        if let Some(store) = &self.storage {
            store.put(&persist::meta_key(&self.name, key), value)?;
        }
        Ok(())
    }

    pub fn get_meta(&self, key: &str) -> Option<Vec<u8>> {
        self.core.read().get_meta(key)
    }

    pub fn enum_meta(&self) -> Vec<String> {
        self.core.read().enum_meta()
    }

    /// Purge every stored record of this namespace from the backing store.
    pub(crate) fn purge_storage(&self) -> Result<()> {
        let Some(store) = &self.storage else {
            return Ok(());
        };
        let mut ops = vec![BatchOp::Delete {
            key: persist::def_key(&self.name),
        }];
        for prefix in [
            persist::row_prefix(&self.name),
            persist::meta_prefix(&self.name),
            persist::journal_prefix(&self.name),
        ] {
            for (key, _) in store.range(&prefix)? {
                ops.push(BatchOp::Delete { key });
            }
        }
        store.batch_commit(ops)?;
        Ok(())
    }

    /// Apply a staged transaction: every op in order, under one write-lock
    /// acquisition, then one atomic storage batch.
    pub(crate) fn apply_batch(&self, ops: Vec<crate::txn::TxOp>) -> Result<usize> {
        let mut core = self.core.write();
        let mut storage_ops = Vec::new();
        let mut applied = 0usize;

        for op in ops {
            match op {
                crate::txn::TxOp::Upsert(payload) => {
                    let (row_id, _old) = core.upsert(payload.clone())?;
                    storage_ops.push(BatchOp::Put {
                        key: persist::row_key(&self.name, row_id),
                        value: persist::encode_payload(&payload)?,
                    });
                    applied += 1;
                }
                crate::txn::TxOp::Delete(payload) => {
                    if let Some(row_id) = core.delete_by_pk(&payload)? {
                        storage_ops.push(BatchOp::Delete {
                            key: persist::row_key(&self.name, row_id),
                        });
                        applied += 1;
                    }
                }
            }
        }
        drop(core);

        if let Some(store) = &self.storage {
            store.batch_commit(storage_ops)?;
        }
        tracing::debug!(target: "vellum", namespace = %self.name, ops = applied, "transaction committed");
        Ok(applied)
    }
}

/// Field lists must agree (case-insensitive names, exact types) for a
/// reopen to succeed; index sets may differ because runtime index changes
/// are stored.
fn fields_compatible(stored: &NamespaceDef, requested: &NamespaceDef) -> bool {
    let mut a = stored.clone();
    let mut b = requested.clone();
    a.indexes.clear();
    b.indexes.clear();
    a.compatible_with(&b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, FieldType, IndexKind};

    fn def() -> NamespaceDef {
        NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::Int64).not_null())
            .field(FieldDef::new("year", FieldType::Int32))
            .field(FieldDef::new("name", FieldType::String))
            .index(IndexDef::new("id", IndexKind::Hash, vec!["id"]).pk())
            .index(IndexDef::new("year", IndexKind::Tree, vec!["year"]))
    }

    fn ns() -> Namespace {
        Namespace::open(def(), None).unwrap()
    }

    #[test]
    fn upsert_assigns_monotonic_row_ids() {
        let ns = ns();
        let a = ns.upsert(&serde_json::json!({"id": 1, "year": 2001})).unwrap();
        let b = ns.upsert(&serde_json::json!({"id": 2, "year": 2002})).unwrap();
        assert!(b > a);
        assert_eq!(ns.row_count(), 2);
    }

    #[test]
    fn upsert_replaces_on_pk_collision() {
        let ns = ns();
        let a = ns.upsert(&serde_json::json!({"id": 1, "year": 2001})).unwrap();
        let b = ns.upsert(&serde_json::json!({"id": 1, "year": 2002})).unwrap();
        assert_eq!(a, b);
        assert_eq!(ns.row_count(), 1);
        let p = ns.get_by_pk(&Value::Int64(1)).unwrap();
        assert_eq!(p.get(1), &Value::Int32(2002));
    }

    #[test]
    fn delete_ignores_non_pk_fields_and_is_idempotent() {
        let ns = ns();
        ns.upsert(&serde_json::json!({"id": 1, "year": 2001, "name": "x"}))
            .unwrap();
        // Wrong year, right pk: still deletes.
        assert!(ns
            .delete(&serde_json::json!({"id": 1, "year": 9999, "name": "zzz"}))
            .unwrap());
        assert!(!ns.delete(&serde_json::json!({"id": 1})).unwrap());
        assert!(matches!(
            ns.get_by_pk(&Value::Int64(1)),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn missing_pk_is_params_error() {
        let ns = ns();
        let err = ns.upsert(&serde_json::json!({"year": 2001}));
        assert!(matches!(err, Err(Error::Params(_))));
    }

    #[test]
    fn add_index_rejects_duplicate_and_unknown_field() {
        let ns = ns();
        assert!(matches!(
            ns.add_index(IndexDef::new("year", IndexKind::Hash, vec!["year"])),
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            ns.add_index(IndexDef::new("x", IndexKind::Hash, vec!["nope"])),
            Err(Error::Params(_))
        ));
    }

    #[test]
    fn update_pk_index_checks_uniqueness() {
        let ns = ns();
        ns.upsert(&serde_json::json!({"id": 1, "year": 2001})).unwrap();
        ns.upsert(&serde_json::json!({"id": 2, "year": 2001})).unwrap();
        // Moving the pk onto "year" would collide.
        let err = ns.update_index(IndexDef::new("id", IndexKind::Hash, vec!["year"]).pk());
        assert!(matches!(err, Err(Error::Conflict(_))));
        // State unchanged.
        assert!(ns.get_by_pk(&Value::Int64(2)).is_ok());
    }

    #[test]
    fn truncate_keeps_schema_and_indexes() {
        let ns = ns();
        ns.upsert(&serde_json::json!({"id": 1, "year": 2001})).unwrap();
        ns.truncate().unwrap();
        assert_eq!(ns.row_count(), 0);
        assert_eq!(ns.def().indexes.len(), 2);
        ns.upsert(&serde_json::json!({"id": 1, "year": 2002})).unwrap();
        assert_eq!(ns.row_count(), 1);
    }

    #[test]
    fn meta_kv_round_trips() {
        let ns = ns();
        ns.put_meta("cursor", b"42").unwrap();
        assert_eq!(ns.get_meta("cursor"), Some(b"42".to_vec()));
        assert_eq!(ns.enum_meta(), vec!["cursor".to_string()]);
        assert_eq!(ns.get_meta("missing"), None);
    }

    #[test]
    fn reopen_with_storage_restores_rows() {
        let store: Arc<dyn Store> = Arc::new(vellum_store::MemoryStore::new());
        {
            let ns = Namespace::open(def(), Some(store.clone())).unwrap();
            ns.upsert(&serde_json::json!({"id": 1, "year": 2001, "name": "a"}))
                .unwrap();
            ns.upsert(&serde_json::json!({"id": 2, "year": 2002, "name": "b"}))
                .unwrap();
            ns.put_meta("k", b"v").unwrap();
        }
        let ns = Namespace::open(def(), Some(store)).unwrap();
        assert_eq!(ns.row_count(), 2);
        assert_eq!(ns.get_meta("k"), Some(b"v".to_vec()));
        let p = ns.get_by_pk(&Value::Int64(2)).unwrap();
        assert_eq!(p.get(1), &Value::Int32(2002));
    }

    #[test]
    fn reopen_with_different_fields_conflicts() {
        let store: Arc<dyn Store> = Arc::new(vellum_store::MemoryStore::new());
        Namespace::open(def(), Some(store.clone())).unwrap();

        let changed = NamespaceDef::new("items")
            .field(FieldDef::new("id", FieldType::String).not_null())
            .index(IndexDef::new("id", IndexKind::Hash, vec!["id"]).pk());
        assert!(matches!(
            Namespace::open(changed, Some(store)),
            Err(Error::Conflict(_))
        ));
    }
}
