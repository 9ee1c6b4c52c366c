//! Seam to the block-device engine.
//!
//! The engine owns volume data; this daemon only drives it through two
//! doors. A volume attached to a running instance is captured over the bus
//! (`ebs.snapshot.<volumeId>`) by the daemon that already holds it open. A
//! detached volume is captured offline through this trait: open its state,
//! replay the write-ahead log, cut the snapshot, release the local files.
//! Opening a volume that another daemon holds open would race its WAL, so
//! callers pick the door based on the instance's run state.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockError {
    #[error("volume {0} not present in block store")]
    VolumeNotFound(String),

    #[error("write-ahead log replay failed: {0}")]
    WalReplay(String),

    #[error("snapshot failed: {0}")]
    Snapshot(String),

    #[error("block backend error: {0}")]
    Backend(String),
}

/// An offline handle on one volume's block state.
#[async_trait]
pub trait BlockVolume: Send + Sync {
    /// Replays the write-ahead log so the snapshot sees every durable
    /// write. Must be called before [`create_snapshot`].
    ///
    /// [`create_snapshot`]: BlockVolume::create_snapshot
    async fn load_wal(&mut self) -> Result<(), BlockError>;

    /// Cuts a content-addressed snapshot under the given id.
    async fn create_snapshot(&mut self, snapshot_id: &str) -> Result<(), BlockError>;

    /// Releases local files and caches held by the handle.
    async fn release(self: Box<Self>) -> Result<(), BlockError>;
}

/// Factory for offline volume handles.
#[async_trait]
pub trait BlockBackend: Send + Sync {
    /// Loads the volume's config and initialises the engine for it.
    async fn open(&self, volume_id: &str) -> Result<Box<dyn BlockVolume>, BlockError>;
}

/// In-memory engine used when the daemon is embedded for tests: records
/// which snapshots were cut from which volumes.
#[derive(Default)]
pub struct MemoryBlockBackend {
    volumes: Arc<RwLock<HashMap<String, Vec<String>>>>,
}

impl MemoryBlockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a volume so `open` succeeds for it.
    pub fn add_volume(&self, volume_id: &str) {
        self.volumes
            .write()
            .insert(volume_id.to_string(), Vec::new());
    }

    /// Snapshot ids cut from a volume, in order.
    pub fn snapshots_of(&self, volume_id: &str) -> Vec<String> {
        self.volumes
            .read()
            .get(volume_id)
            .cloned()
            .unwrap_or_default()
    }
}

struct MemoryBlockVolume {
    volume_id: String,
    volumes: Arc<RwLock<HashMap<String, Vec<String>>>>,
    wal_loaded: bool,
}

#[async_trait]
impl BlockVolume for MemoryBlockVolume {
    async fn load_wal(&mut self) -> Result<(), BlockError> {
        self.wal_loaded = true;
        Ok(())
    }

    async fn create_snapshot(&mut self, snapshot_id: &str) -> Result<(), BlockError> {
        if !self.wal_loaded {
            return Err(BlockError::Snapshot(
                "write-ahead log not loaded".to_string(),
            ));
        }
        let mut volumes = self.volumes.write();
        let snapshots = volumes
            .get_mut(&self.volume_id)
            .ok_or_else(|| BlockError::VolumeNotFound(self.volume_id.clone()))?;
        snapshots.push(snapshot_id.to_string());
        Ok(())
    }

    async fn release(self: Box<Self>) -> Result<(), BlockError> {
        Ok(())
    }
}

#[async_trait]
impl BlockBackend for MemoryBlockBackend {
    async fn open(&self, volume_id: &str) -> Result<Box<dyn BlockVolume>, BlockError> {
        if !self.volumes.read().contains_key(volume_id) {
            return Err(BlockError::VolumeNotFound(volume_id.to_string()));
        }
        Ok(Box::new(MemoryBlockVolume {
            volume_id: volume_id.to_string(),
            volumes: self.volumes.clone(),
            wal_loaded: false,
        }))
    }
}
