//! Volume→snapshots back-reference index.
//!
//! One KV key per volume, holding the JSON array of snapshot ids created
//! from it, in creation order. Snapshot create/copy append, snapshot
//! delete removes, volume delete is gated on the entry being absent or
//! empty. All writes are compare-and-swap read-modify-write so two
//! concurrent snapshot creates against one volume both land in the list.

use crate::error::Ec2Error;
use crate::store::kv::{KvBucket, KvError};
use log::{debug, warn};
use std::sync::Arc;

/// Bucket name in the replicated KV store.
pub const VOLUME_SNAPSHOTS_BUCKET: &str = "hive-volume-snapshots";

/// CAS attempts before giving up on a contended key.
const MAX_CAS_RETRIES: usize = 8;

pub struct SnapshotIndex {
    bucket: Arc<dyn KvBucket>,
}

impl SnapshotIndex {
    pub fn new(bucket: Arc<dyn KvBucket>) -> Self {
        Self { bucket }
    }

    /// Snapshot ids referencing a volume, oldest first. A missing key is
    /// an empty list.
    pub async fn get(&self, volume_id: &str) -> Result<Vec<String>, Ec2Error> {
        match self.bucket.get(volume_id).await {
            Ok(Some(entry)) => serde_json::from_slice(&entry.value).map_err(|e| {
                Ec2Error::server_internal(format!(
                    "corrupt snapshot index entry for {volume_id}: {e}"
                ))
            }),
            Ok(None) => Ok(Vec::new()),
            Err(err) => Err(store_error(volume_id, err)),
        }
    }

    /// True when no live snapshot references the volume.
    pub async fn is_empty(&self, volume_id: &str) -> Result<bool, Ec2Error> {
        Ok(self.get(volume_id).await?.is_empty())
    }

    /// Appends a snapshot id to a volume's entry. Appending an id already
    /// present is a no-op, keeping each reference in the list exactly once.
    pub async fn append(&self, volume_id: &str, snapshot_id: &str) -> Result<(), Ec2Error> {
        for _ in 0..MAX_CAS_RETRIES {
            match self.bucket.get(volume_id).await {
                Ok(Some(entry)) => {
                    let mut ids: Vec<String> =
                        serde_json::from_slice(&entry.value).unwrap_or_default();
                    if ids.iter().any(|id| id == snapshot_id) {
                        return Ok(());
                    }
                    ids.push(snapshot_id.to_string());
                    match self.bucket.update(volume_id, encode(&ids), entry.revision).await {
                        Ok(_) => return Ok(()),
                        Err(KvError::WrongLastRevision { .. }) | Err(KvError::KeyNotFound(_)) => {
                            debug!("snapshot index contention on {volume_id}, retrying");
                            continue;
                        }
                        Err(err) => return Err(store_error(volume_id, err)),
                    }
                }
                Ok(None) => {
                    let ids = vec![snapshot_id.to_string()];
                    match self.bucket.create(volume_id, encode(&ids)).await {
                        Ok(_) => return Ok(()),
                        Err(KvError::KeyExists(_)) => {
                            debug!("snapshot index contention on {volume_id}, retrying");
                            continue;
                        }
                        Err(err) => return Err(store_error(volume_id, err)),
                    }
                }
                Err(err) => return Err(store_error(volume_id, err)),
            }
        }
        Err(Ec2Error::server_internal(format!(
            "snapshot index update for {volume_id} kept conflicting"
        )))
    }

    /// Removes a snapshot id from a volume's entry; deletes the key once
    /// the entry drains. Missing keys and already-removed ids are fine.
    pub async fn remove(&self, volume_id: &str, snapshot_id: &str) -> Result<(), Ec2Error> {
        for _ in 0..MAX_CAS_RETRIES {
            let entry = match self.bucket.get(volume_id).await {
                Ok(Some(entry)) => entry,
                Ok(None) => return Ok(()),
                Err(err) => return Err(store_error(volume_id, err)),
            };
            let mut ids: Vec<String> = serde_json::from_slice(&entry.value).unwrap_or_default();
            let before = ids.len();
            ids.retain(|id| id != snapshot_id);
            if ids.len() == before {
                return Ok(());
            }

            let result = if ids.is_empty() {
                self.bucket.delete(volume_id).await.map(|_| 0)
            } else {
                self.bucket.update(volume_id, encode(&ids), entry.revision).await
            };
            match result {
                Ok(_) => return Ok(()),
                Err(KvError::WrongLastRevision { .. }) | Err(KvError::KeyNotFound(_)) => {
                    debug!("snapshot index contention on {volume_id}, retrying");
                    continue;
                }
                Err(err) => return Err(store_error(volume_id, err)),
            }
        }
        Err(Ec2Error::server_internal(format!(
            "snapshot index update for {volume_id} kept conflicting"
        )))
    }
}

fn encode(ids: &[String]) -> Vec<u8> {
    serde_json::to_vec(ids).unwrap_or_else(|_| b"[]".to_vec())
}

fn store_error(volume_id: &str, err: KvError) -> Ec2Error {
    warn!("snapshot index access for {volume_id} failed: {err}");
    Ec2Error::server_internal(format!("snapshot index unavailable: {err}"))
}
