//! Ordered byte-keyed store
//!
//! The key-value backend needs point reads and writes, atomic batches and
//! an ordered prefix scan. [`MemoryStore`] is the in-process implementation:
//!
//! - `BTreeMap<Vec<u8>, Vec<u8>>` for ordered key storage
//! - `parking_lot::RwLock` for thread-safe access
//! - batches applied under one write lock, so readers never observe half of
//!   a batch

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use chainql_core::Result;

/// One write of an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Set `key` to `value`
    Put {
        /// Key
        key: Vec<u8>,
        /// Value
        value: Vec<u8>,
    },
    /// Remove `key`
    Del {
        /// Key
        key: Vec<u8>,
    },
}

/// Ordered byte-keyed storage consumed by the key-value backend
///
/// Implementations report failures as `Error::Storage`.
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Read one key
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write one key
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Remove one key
    async fn del(&self, key: &[u8]) -> Result<()>;

    /// Apply every operation atomically, in order
    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;

    /// Every entry whose key starts with `prefix`, in key order
    async fn read_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory ordered store
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store holds no keys
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl OrderedStore for MemoryStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn del(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        // One lock for the entire batch
        let mut data = self.data.write();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Del { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn read_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
