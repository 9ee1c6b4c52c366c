//! Revisioned key-value buckets.
//!
//! Buckets behave like compare-and-swap registers per key: every write bumps
//! a monotonically increasing revision, `update` fails when the caller's
//! revision is stale, and a bounded history of past revisions is retained
//! for observability. The production implementation is a replicated KV
//! store; `MemoryKvStore` is the in-process one.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Revisions kept per key, matching the replicated store's bucket settings.
pub const HISTORY_DEPTH: usize = 10;

#[derive(Error, Debug)]
pub enum KvError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("wrong last revision for {key}: expected {expected}, found {found}")]
    WrongLastRevision {
        key: String,
        expected: u64,
        found: u64,
    },

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("kv store error: {0}")]
    Store(String),
}

/// A single value revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Vec<u8>,
    pub revision: u64,
}

/// One named bucket of revisioned keys.
#[async_trait]
pub trait KvBucket: Send + Sync {
    /// Latest entry for a key, or `None` if absent (or deleted).
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError>;

    /// Unconditional write. Returns the new revision.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError>;

    /// Write that fails with `KeyExists` when the key is already present.
    async fn create(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError>;

    /// Compare-and-swap write: succeeds only when `revision` is the key's
    /// current revision. Returns the new revision.
    async fn update(&self, key: &str, value: Vec<u8>, revision: u64) -> Result<u64, KvError>;

    /// Removes a key. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Retained revisions for a key, oldest first.
    async fn history(&self, key: &str) -> Result<Vec<KvEntry>, KvError>;

    /// All live keys in the bucket.
    async fn keys(&self) -> Result<Vec<String>, KvError>;
}

/// Factory for named buckets.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn bucket(&self, name: &str) -> Result<Arc<dyn KvBucket>, KvError>;
}

#[derive(Default)]
struct KeyHistory {
    entries: Vec<KvEntry>,
    // A delete leaves the history in place but marks the key dead so a
    // subsequent create succeeds.
    deleted: bool,
}

#[derive(Default)]
struct BucketState {
    keys: HashMap<String, KeyHistory>,
    revision: u64,
}

/// In-memory revisioned bucket.
#[derive(Default)]
pub struct MemoryKvBucket {
    state: RwLock<BucketState>,
}

impl MemoryKvBucket {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(state: &mut BucketState, key: &str, value: Vec<u8>) -> u64 {
        state.revision += 1;
        let revision = state.revision;
        let history = state.keys.entry(key.to_string()).or_default();
        history.deleted = false;
        history.entries.push(KvEntry { value, revision });
        if history.entries.len() > HISTORY_DEPTH {
            let excess = history.entries.len() - HISTORY_DEPTH;
            history.entries.drain(..excess);
        }
        revision
    }
}

#[async_trait]
impl KvBucket for MemoryKvBucket {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>, KvError> {
        let state = self.state.read();
        Ok(state
            .keys
            .get(key)
            .filter(|h| !h.deleted)
            .and_then(|h| h.entries.last().cloned()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError> {
        let mut state = self.state.write();
        Ok(Self::push(&mut state, key, value))
    }

    async fn create(&self, key: &str, value: Vec<u8>) -> Result<u64, KvError> {
        let mut state = self.state.write();
        if state.keys.get(key).is_some_and(|h| !h.deleted) {
            return Err(KvError::KeyExists(key.to_string()));
        }
        Ok(Self::push(&mut state, key, value))
    }

    async fn update(&self, key: &str, value: Vec<u8>, revision: u64) -> Result<u64, KvError> {
        let mut state = self.state.write();
        let current = state
            .keys
            .get(key)
            .filter(|h| !h.deleted)
            .and_then(|h| h.entries.last())
            .map(|e| e.revision)
            .ok_or_else(|| KvError::KeyNotFound(key.to_string()))?;
        if current != revision {
            return Err(KvError::WrongLastRevision {
                key: key.to_string(),
                expected: revision,
                found: current,
            });
        }
        Ok(Self::push(&mut state, key, value))
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut state = self.state.write();
        if let Some(history) = state.keys.get_mut(key) {
            history.deleted = true;
        }
        Ok(())
    }

    async fn history(&self, key: &str) -> Result<Vec<KvEntry>, KvError> {
        let state = self.state.read();
        Ok(state
            .keys
            .get(key)
            .map(|h| h.entries.clone())
            .unwrap_or_default())
    }

    async fn keys(&self) -> Result<Vec<String>, KvError> {
        let state = self.state.read();
        let mut keys: Vec<String> = state
            .keys
            .iter()
            .filter(|(_, h)| !h.deleted)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory store handing out named `MemoryKvBucket`s.
#[derive(Default)]
pub struct MemoryKvStore {
    buckets: RwLock<HashMap<String, Arc<MemoryKvBucket>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn bucket(&self, name: &str) -> Result<Arc<dyn KvBucket>, KvError> {
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryKvBucket::new()));
        Ok(bucket.clone())
    }
}
