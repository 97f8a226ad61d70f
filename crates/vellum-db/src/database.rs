use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use vellum_query::{Cond, FilterNode, Query, Value};
use vellum_store::{BatchOp, Store};

use crate::aggregator::AggResult;
use crate::error::{Error, Result};
use crate::executor::{execute, QueryContext};
use crate::namespace::Namespace;
use crate::payload::{Payload, RowId};
use crate::persist;
use crate::planner::plan;
use crate::schema::{IndexDef, NamespaceDef};
use crate::txn::Transaction;

pub const DEFAULT_BUFFER_LIMIT: usize = 64;

/// The database facade: a registry of open namespaces, the query entry
/// points for all three front-ends, and result-buffer accounting.
pub struct Database {
    namespaces: RwLock<HashMap<String, Arc<Namespace>>>,
    storage: Option<Arc<dyn Store>>,
    buffers: Arc<BufferPool>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    /// Purely in-memory database.
    pub fn new() -> Database {
        Database {
            namespaces: RwLock::new(HashMap::new()),
            storage: None,
            buffers: Arc::new(BufferPool::new(DEFAULT_BUFFER_LIMIT)),
        }
    }

    /// Database mirrored into a persistence collaborator. Namespaces
    /// reload their rows and metadata from it on open.
    pub fn with_storage(storage: Arc<dyn Store>) -> Database {
        Database {
            namespaces: RwLock::new(HashMap::new()),
            storage: Some(storage),
            buffers: Arc::new(BufferPool::new(DEFAULT_BUFFER_LIMIT)),
        }
    }

    /// Cap on concurrently open result iterators.
    pub fn set_buffer_limit(&self, limit: usize) {
        self.buffers.limit.store(limit, AtomicOrdering::SeqCst);
    }

    // ── Namespace lifecycle ─────────────────────────────────────

    /// Open a namespace. Reopening with a compatible schema is a no-op;
    /// an incompatible one fails with `ErrConflict`.
    pub fn open_namespace(&self, def: NamespaceDef) -> Result<()> {
        def.validate()?;
        let key = def.name.to_ascii_lowercase();

        let mut namespaces = self.namespaces.write();
        if let Some(existing) = namespaces.get(&key) {
            if existing.def().compatible_with(&def) {
                return Ok(());
            }
            return Err(Error::Conflict(format!(
                "namespace {:?} is already open with a different schema",
                def.name
            )));
        }

        let ns = Namespace::open(def, self.storage.clone())?;
        namespaces.insert(key, Arc::new(ns));
        Ok(())
    }

    /// Close a namespace: drop it from the registry, keep stored data.
    pub fn close_namespace(&self, name: &str) -> Result<()> {
        self.namespaces
            .write()
            .remove(&name.to_ascii_lowercase())
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("namespace {name:?}")))
    }

    /// Drop a namespace: close it and purge its stored records.
    pub fn drop_namespace(&self, name: &str) -> Result<()> {
        let ns = self
            .namespaces
            .write()
            .remove(&name.to_ascii_lowercase())
            .ok_or_else(|| Error::NotFound(format!("namespace {name:?}")))?;
        ns.purge_storage()
    }

    pub fn truncate_namespace(&self, name: &str) -> Result<()> {
        self.ns(name)?.truncate()
    }

    pub fn namespace_def(&self, name: &str) -> Result<NamespaceDef> {
        Ok(self.ns(name)?.def())
    }

    fn ns(&self, name: &str) -> Result<Arc<Namespace>> {
        self.namespaces
            .read()
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("namespace {name:?}")))
    }

    // ── Index management ────────────────────────────────────────

    pub fn add_index(&self, ns: &str, def: IndexDef) -> Result<()> {
        self.ns(ns)?.add_index(def)
    }

    pub fn update_index(&self, ns: &str, def: IndexDef) -> Result<()> {
        self.ns(ns)?.update_index(def)
    }

    pub fn drop_index(&self, ns: &str, name: &str) -> Result<()> {
        self.ns(ns)?.drop_index(name)
    }

    // ── Writes ──────────────────────────────────────────────────

    pub fn upsert(&self, ns: &str, doc: &serde_json::Value) -> Result<RowId> {
        self.ns(ns)?.upsert(doc)
    }

    /// Delete by pk; non-pk fields of `doc` are ignored. Returns whether a
    /// row was removed — redeleting is a successful no-op.
    pub fn delete(&self, ns: &str, doc: &serde_json::Value) -> Result<bool> {
        self.ns(ns)?.delete(doc)
    }

    pub fn get_by_pk(&self, ns: &str, key: &Value) -> Result<Payload> {
        self.ns(ns)?.get_by_pk(key)
    }

    pub fn begin_tx(&self, ns: &str) -> Result<Transaction> {
        Ok(Transaction::new(self.ns(ns)?))
    }

    /// Execute a query and delete every returned row, atomically under
    /// the namespace's write lock. Returns the number of rows removed.
    pub fn delete_query(&self, query: &Query) -> Result<usize> {
        let ctx = QueryContext::new();
        let ns = self.ns(&query.namespace)?;

        let mut core = ns.write();
        let planned = plan(&core, query)?;
        let executed = execute(&core, &planned, &ctx)?;
        let row_ids: Vec<RowId> = executed.items.iter().map(|(id, _)| *id).collect();
        for &row_id in &row_ids {
            core.remove_row(row_id)?;
        }
        drop(core);

        if let Some(store) = ns.storage() {
            let ops = row_ids
                .iter()
                .map(|&row_id| BatchOp::Delete {
                    key: persist::row_key(ns.name(), row_id),
                })
                .collect();
            store.batch_commit(ops)?;
        }
        Ok(row_ids.len())
    }

    // ── Metadata KV ─────────────────────────────────────────────

    pub fn put_meta(&self, ns: &str, key: &str, value: &[u8]) -> Result<()> {
        self.ns(ns)?.put_meta(key, value)
    }

    pub fn get_meta(&self, ns: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.ns(ns)?.get_meta(key))
    }

    pub fn enum_meta(&self, ns: &str) -> Result<Vec<String>> {
        Ok(self.ns(ns)?.enum_meta())
    }

    // ── Queries ─────────────────────────────────────────────────

    pub fn query(&self, query: &Query) -> Result<QueryIterator> {
        self.query_ctx(query, QueryContext::new())
    }

    pub fn query_ctx(&self, query: &Query, ctx: QueryContext) -> Result<QueryIterator> {
        let ticket = self.buffers.acquire()?;
        let ns = self.ns(&query.namespace)?;

        let core = ns.read();
        let planned = plan(&core, query)?;
        let executed = execute(&core, &planned, &ctx)?;
        drop(core);

        let mut items: Vec<ResultItem> = executed
            .items
            .into_iter()
            .map(|(row_id, payload)| ResultItem {
                row_id,
                payload,
                joined: Vec::new(),
            })
            .collect();

        if !query.joins.is_empty() {
            self.attach_joins(&ns, query, &ctx, &mut items)?;
        }

        Ok(QueryIterator {
            items: items.into_iter(),
            total: executed.total,
            aggregations: executed.aggregations,
            _ticket: ticket,
        })
    }

    /// Parse and run a SQL statement.
    pub fn query_sql(&self, sql: &str) -> Result<QueryIterator> {
        let query = vellum_query::parse_sql(sql)?;
        self.query(&query)
    }

    /// Parse and run a serialized DSL query.
    pub fn query_dsl(&self, dsl: &str) -> Result<QueryIterator> {
        let query = vellum_query::parse_dsl(dsl)?;
        self.query(&query)
    }

    /// Left-outer joins: per outer row, run the sub-query with each `on`
    /// pair bound as an inner-field condition on the outer row's value,
    /// and attach the matches under the join field name.
    fn attach_joins(
        &self,
        outer: &Namespace,
        query: &Query,
        ctx: &QueryContext,
        items: &mut [ResultItem],
    ) -> Result<()> {
        let outer_def = outer.def();

        for join in &query.joins {
            let inner = self.ns(&join.query.namespace)?;
            let on_positions: Result<Vec<(usize, &str)>> = join
                .on
                .iter()
                .map(|(l, r)| {
                    let pos = outer_def.field_pos(l).ok_or_else(|| {
                        Error::Params(format!("unknown join field {l:?}"))
                    })?;
                    Ok((pos, r.as_str()))
                })
                .collect();
            let on_positions = on_positions?;

            for item in items.iter_mut() {
                ctx.check()?;
                let bound = bind_join_query(&join.query, &on_positions, &item.payload);
                let rows = match bound {
                    // An absent join key matches nothing; the outer row
                    // survives with an empty attachment.
                    None => Vec::new(),
                    Some(sub_query) => {
                        let core = inner.read();
                        let planned = plan(&core, &sub_query)?;
                        let executed = execute(&core, &planned, ctx)?;
                        executed.items.into_iter().map(|(_, p)| p).collect()
                    }
                };
                item.joined.push((join.field.clone(), rows));
            }
        }
        Ok(())
    }

    pub fn namespace_names(&self) -> Vec<String> {
        self.namespaces
            .read()
            .values()
            .map(|ns| ns.name().to_string())
            .collect()
    }
}

/// Clone the join sub-query with the `on` conditions bound to one outer
/// row. Returns `None` when any join key is absent on the outer row.
fn bind_join_query(
    sub_query: &Query,
    on_positions: &[(usize, &str)],
    outer_payload: &Payload,
) -> Option<Query> {
    let mut bound = sub_query.clone();
    for &(pos, right) in on_positions {
        if !outer_payload.present(pos) {
            return None;
        }
        let value = outer_payload.get(pos).clone();
        // Array join keys bind as SET, scalars as EQ.
        let cond = match &value {
            Value::Tuple(_) => Cond::Set,
            _ => Cond::Eq,
        };
        let node = FilterNode::condition(right, cond, value);
        bound.filter = Some(match bound.filter.take() {
            None => node,
            Some(existing) => FilterNode::and(vec![existing, node]),
        });
    }
    Some(bound)
}

// ── Result iteration ────────────────────────────────────────────

/// One result row: the payload plus any joined attachments.
#[derive(Debug, Clone)]
pub struct ResultItem {
    pub row_id: RowId,
    pub payload: Payload,
    pub joined: Vec<(String, Vec<Payload>)>,
}

/// Owns the materialized result buffer. The buffer counts against the
/// database's outstanding-buffer cap until the iterator is closed or
/// dropped.
#[derive(Debug)]
pub struct QueryIterator {
    items: std::vec::IntoIter<ResultItem>,
    total: Option<usize>,
    aggregations: Vec<AggResult>,
    _ticket: BufferTicket,
}

impl QueryIterator {
    /// Pre-limit match count, present when the query set `req_total`.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    pub fn aggregations(&self) -> &[AggResult] {
        &self.aggregations
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    /// Release the buffer explicitly. Dropping does the same.
    pub fn close(self) {}
}

impl Iterator for QueryIterator {
    type Item = ResultItem;

    fn next(&mut self) -> Option<ResultItem> {
        self.items.next()
    }
}

// ── Buffer accounting ───────────────────────────────────────────

#[derive(Debug)]
struct BufferPool {
    outstanding: AtomicUsize,
    limit: AtomicUsize,
}

impl BufferPool {
    fn new(limit: usize) -> BufferPool {
        BufferPool {
            outstanding: AtomicUsize::new(0),
            limit: AtomicUsize::new(limit),
        }
    }

    fn acquire(self: &Arc<Self>) -> Result<BufferTicket> {
        let limit = self.limit.load(AtomicOrdering::SeqCst);
        let prev = self.outstanding.fetch_add(1, AtomicOrdering::SeqCst);
        if prev >= limit {
            self.outstanding.fetch_sub(1, AtomicOrdering::SeqCst);
            return Err(Error::BufferLimit(format!(
                "{prev} result buffers already open (limit {limit})"
            )));
        }
        Ok(BufferTicket { pool: self.clone() })
    }
}

#[derive(Debug)]
struct BufferTicket {
    pool: Arc<BufferPool>,
}

impl Drop for BufferTicket {
    fn drop(&mut self) {
        self.pool.outstanding.fetch_sub(1, AtomicOrdering::SeqCst);
    }
}
