use crate::error::StoreError;

/// One staged write inside a [`Store::batch_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Persistence collaborator.
///
/// The engine writes row snapshots, an index-rebuild journal and namespace
/// metadata through this interface and assumes nothing beyond crash-atomic
/// [`batch_commit`](Store::batch_commit): either every op in a batch is
/// durable or none is.
pub trait Store: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    /// Iterate every key/value pair whose key starts with `prefix`,
    /// in ascending key order.
    fn range(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;

    /// Apply a batch of writes atomically.
    fn batch_commit(&self, ops: Vec<BatchOp>) -> Result<(), StoreError>;
}
