//! Blob-store interface for per-resource config documents.
//!
//! Resource documents live under stable prefixes in a single bucket,
//! e.g. `vol-abc123/config.json` or `keys/123456789012/key-1a2b.json`.
//! The store is last-writer-wins per key; callers that must preserve
//! fields written by other components read-modify-write.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlobError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("blob store error: {0}")]
    Store(String),
}

/// Object-store operations the services depend on. The production
/// implementation is an S3-compatible client; `MemoryBlobStore` below is the
/// in-process implementation used for embedding and tests.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetches an object, or `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError>;

    /// Writes an object, replacing any previous value.
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError>;

    /// Removes an object. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;

    /// Lists all object keys under a prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError>;

    /// Lists the top-level "directories" under a prefix, S3
    /// delimiter-style: `list_prefixes("vol-")` yields `vol-abc123/`,
    /// `vol-def456/`, one entry per resource.
    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, BlobError>;
}

/// In-memory blob store backed by an ordered map.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), BlobError> {
        self.objects.write().insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn list_prefixes(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let objects = self.objects.read();
        let mut prefixes: Vec<String> = Vec::new();
        for key in objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k)
        {
            if let Some(slash) = key.find('/') {
                let dir = &key[..=slash];
                if prefixes.last().map(String::as_str) != Some(dir) {
                    prefixes.push(dir.to_string());
                }
            }
        }
        Ok(prefixes)
    }
}
