use std::sync::Arc;

use crate::error::Result;
use crate::namespace::Namespace;
use crate::payload::Payload;

#[derive(Debug)]
pub(crate) enum TxOp {
    Upsert(Payload),
    Delete(Payload),
}

/// A batched sequence of upserts and deletes against one namespace.
///
/// Operations validate and stage locally; nothing touches the namespace
/// until [`commit`](Transaction::commit), which acquires the write lock
/// once and applies the whole batch in order. Rolling back, or just
/// dropping the transaction, discards the staged buffer.
pub struct Transaction {
    ns: Arc<Namespace>,
    ops: Vec<TxOp>,
}

impl Transaction {
    pub(crate) fn new(ns: Arc<Namespace>) -> Transaction {
        Transaction {
            ns,
            ops: Vec::new(),
        }
    }

    /// Stage an upsert. The document is validated against the schema now,
    /// so a malformed document fails before anything is applied.
    pub fn upsert(&mut self, doc: &serde_json::Value) -> Result<()> {
        let core = self.ns.read();
        let payload = Payload::from_json(core.def(), doc)?;
        core.pk_key(&payload)?;
        drop(core);
        self.ops.push(TxOp::Upsert(payload));
        Ok(())
    }

    /// Stage a delete by pk; non-pk fields of the document are ignored.
    pub fn delete(&mut self, doc: &serde_json::Value) -> Result<()> {
        let core = self.ns.read();
        let payload = Payload::from_json(core.def(), doc)?;
        core.pk_key(&payload)?;
        drop(core);
        self.ops.push(TxOp::Delete(payload));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Apply every staged op under one write-lock acquisition. Returns the
    /// number of rows touched.
    pub fn commit(self) -> Result<usize> {
        self.ns.apply_batch(self.ops)
    }

    /// Discard the staged buffer.
    pub fn rollback(self) {
        drop(self);
    }
}
