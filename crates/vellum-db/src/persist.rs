use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::payload::{Payload, RowId};
use crate::schema::{IndexDef, NamespaceDef};

// Key layout in the backing store, one tag byte per record family:
//   d\x00{ns}             → namespace definition
//   r\x00{ns}\x00{row_id} → row payload
//   m\x00{ns}\x00{key}    → metadata KV
//   j\x00{ns}\x00{seq}    → index-rebuild journal entry
const DEF_TAG: u8 = b'd';
const ROW_TAG: u8 = b'r';
const META_TAG: u8 = b'm';
const JOURNAL_TAG: u8 = b'j';
const SEP: u8 = 0x00;

fn tagged_prefix(tag: u8, ns: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + ns.len());
    buf.push(tag);
    buf.push(SEP);
    buf.extend_from_slice(ns.as_bytes());
    buf.push(SEP);
    buf
}

pub(crate) fn def_key(ns: &str) -> Vec<u8> {
    let mut buf = vec![DEF_TAG, SEP];
    buf.extend_from_slice(ns.as_bytes());
    buf
}

pub(crate) fn row_prefix(ns: &str) -> Vec<u8> {
    tagged_prefix(ROW_TAG, ns)
}

/// Row keys carry the row-id big-endian so store order equals row-id order.
pub(crate) fn row_key(ns: &str, row_id: RowId) -> Vec<u8> {
    let mut buf = row_prefix(ns);
    buf.extend_from_slice(&row_id.to_be_bytes());
    buf
}

pub(crate) fn row_id_from_key(ns: &str, key: &[u8]) -> Result<RowId> {
    let prefix_len = row_prefix(ns).len();
    let tail: [u8; 8] = key
        .get(prefix_len..)
        .and_then(|t| t.try_into().ok())
        .ok_or_else(|| Error::Io(format!("malformed row key in namespace {ns:?}")))?;
    Ok(RowId::from_be_bytes(tail))
}

pub(crate) fn meta_prefix(ns: &str) -> Vec<u8> {
    tagged_prefix(META_TAG, ns)
}

pub(crate) fn meta_key(ns: &str, key: &str) -> Vec<u8> {
    let mut buf = meta_prefix(ns);
    buf.extend_from_slice(key.as_bytes());
    buf
}

pub(crate) fn journal_prefix(ns: &str) -> Vec<u8> {
    tagged_prefix(JOURNAL_TAG, ns)
}

pub(crate) fn journal_key(ns: &str, seq: u64) -> Vec<u8> {
    let mut buf = journal_prefix(ns);
    buf.extend_from_slice(&seq.to_be_bytes());
    buf
}

// ── Record encoding ─────────────────────────────────────────────

pub(crate) fn encode_payload(payload: &Payload) -> Result<Vec<u8>> {
    serde_json::to_vec(payload).map_err(|e| Error::Io(e.to_string()))
}

pub(crate) fn decode_payload(bytes: &[u8]) -> Result<Payload> {
    serde_json::from_slice(bytes).map_err(|e| Error::Io(e.to_string()))
}

pub(crate) fn encode_def(def: &NamespaceDef) -> Result<Vec<u8>> {
    serde_json::to_vec(def).map_err(|e| Error::Io(e.to_string()))
}

pub(crate) fn decode_def(bytes: &[u8]) -> Result<NamespaceDef> {
    serde_json::from_slice(bytes).map_err(|e| Error::Io(e.to_string()))
}

/// One index-rebuild journal record.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JournalEntry {
    pub seq: u64,
    pub action: JournalAction,
    pub index: IndexDef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum JournalAction {
    Add,
    Update,
    Drop,
}

pub(crate) fn encode_journal(entry: &JournalEntry) -> Result<Vec<u8>> {
    serde_json::to_vec(entry).map_err(|e| Error::Io(e.to_string()))
}
