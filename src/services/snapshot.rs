//! Snapshot service: owns the `snap-*` namespace in the blob store and
//! keeps the volume→snapshots back-reference index current.
//!
//! Snapshots complete synchronously at this level: the block layer does
//! content-addressed capture, so once the metadata document is written the
//! snapshot reports `completed`/`100%`.

use crate::config::DaemonConfig;
use crate::error::{Ec2Error, Ec2ErrorCode};
use crate::services::index::SnapshotIndex;
use crate::services::volume::fetch_document;
use crate::store::blob::BlobStore;
use crate::types::snapshot::{
    CopySnapshotInput, CopySnapshotOutput, CreateSnapshotInput, DeleteSnapshotInput,
    DeleteSnapshotOutput, DescribeSnapshotsInput, DescribeSnapshotsOutput, Snapshot,
    SnapshotConfig, SnapshotState,
};
use crate::types::{
    is_well_formed_id, new_resource_id, tag_list, tags_for_resource, SNAPSHOT_PREFIX,
    VOLUME_PREFIX,
};
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

fn config_key(snapshot_id: &str) -> String {
    format!("{snapshot_id}/config.json")
}

fn metadata_key(snapshot_id: &str) -> String {
    format!("{snapshot_id}/metadata.json")
}

fn not_found(snapshot_id: &str) -> Ec2Error {
    Ec2Error::new(
        Ec2ErrorCode::InvalidSnapshotNotFound,
        format!("The snapshot '{snapshot_id}' does not exist"),
    )
}

/// Reads a snapshot document, trying the canonical `config.json` first
/// and falling back to the `metadata.json` form written by the image
/// path. `None` when neither exists.
pub(crate) async fn load_snapshot_config(
    blob: &dyn BlobStore,
    snapshot_id: &str,
) -> Result<Option<SnapshotConfig>, Ec2Error> {
    for key in [config_key(snapshot_id), metadata_key(snapshot_id)] {
        let bytes = blob
            .get(&key)
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to read {key}: {e}")))?;
        if let Some(bytes) = bytes {
            return serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                Ec2Error::server_internal(format!("corrupt snapshot document {key}: {e}"))
            });
        }
    }
    Ok(None)
}

pub struct SnapshotService {
    blob: Arc<dyn BlobStore>,
    index: Option<Arc<SnapshotIndex>>,
    config: Arc<DaemonConfig>,
}

impl SnapshotService {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        index: Option<Arc<SnapshotIndex>>,
        config: Arc<DaemonConfig>,
    ) -> Self {
        Self {
            blob,
            index,
            config,
        }
    }

    async fn persist(&self, cfg: &SnapshotConfig) -> Result<(), Ec2Error> {
        let bytes = serde_json::to_vec(cfg).map_err(|e| {
            Ec2Error::server_internal(format!(
                "failed to encode snapshot {}: {e}",
                cfg.snapshot_id
            ))
        })?;
        self.blob
            .put(&config_key(&cfg.snapshot_id), bytes)
            .await
            .map_err(|e| {
                Ec2Error::server_internal(format!("failed to write {}: {e}", cfg.snapshot_id))
            })
    }

    /// Records the snapshot against its source volume. The document is
    /// already durable at this point, so index trouble is logged rather
    /// than failing the call; the gap heals on snapshot delete.
    async fn index_append(&self, volume_id: &str, snapshot_id: &str) {
        if let Some(index) = &self.index {
            if let Err(err) = index.append(volume_id, snapshot_id).await {
                warn!("failed to index {snapshot_id} against {volume_id}: {err}");
            }
        }
    }

    pub async fn create_snapshot(&self, input: CreateSnapshotInput) -> Result<Snapshot, Ec2Error> {
        if !is_well_formed_id(&input.volume_id, VOLUME_PREFIX) {
            return Err(Ec2Error::new(
                Ec2ErrorCode::InvalidVolumeIdMalformed,
                format!("Invalid volume id: '{}'", input.volume_id),
            ));
        }

        let source = fetch_document(self.blob.as_ref(), &input.volume_id)
            .await?
            .ok_or_else(|| {
                Ec2Error::new(
                    Ec2ErrorCode::InvalidVolumeNotFound,
                    format!("The volume '{}' does not exist", input.volume_id),
                )
            })?
            .volume_config;
        if source.size == 0 {
            return Err(Ec2Error::server_internal(format!(
                "volume {} has no recorded size",
                input.volume_id
            )));
        }

        let mut cfg = SnapshotConfig {
            snapshot_id: new_resource_id(SNAPSHOT_PREFIX),
            volume_id: input.volume_id.clone(),
            volume_size: source.size,
            state: SnapshotState::Pending,
            progress: "0%".to_string(),
            start_time: Some(Utc::now()),
            description: input.description.unwrap_or_default(),
            encrypted: source.encrypted,
            owner_id: self.config.account_id.clone(),
            availability_zone: source.availability_zone.clone(),
            tags: tags_for_resource(input.tag_specifications.as_deref(), "snapshot"),
        };

        // The block layer captures content-addressed state, so the
        // metadata transition to completed happens in the same call.
        cfg.state = SnapshotState::Completed;
        cfg.progress = "100%".to_string();
        self.persist(&cfg).await?;
        info!(
            "created snapshot {} from {} ({} GiB)",
            cfg.snapshot_id, cfg.volume_id, cfg.volume_size
        );

        self.index_append(&input.volume_id, &cfg.snapshot_id).await;
        Ok(cfg.to_snapshot())
    }

    pub async fn describe_snapshots(
        &self,
        input: DescribeSnapshotsInput,
    ) -> Result<DescribeSnapshotsOutput, Ec2Error> {
        let mut snapshots = Vec::new();
        match input.snapshot_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => {
                // Requested ids that no longer exist simply drop out of
                // the result.
                for id in ids {
                    if let Some(cfg) = load_snapshot_config(self.blob.as_ref(), &id).await? {
                        snapshots.push(cfg.to_snapshot());
                    }
                }
            }
            None => {
                let prefixes = self.blob.list_prefixes("snap-").await.map_err(|e| {
                    Ec2Error::server_internal(format!("failed to list snapshots: {e}"))
                })?;
                for prefix in prefixes {
                    let snapshot_id = prefix.trim_end_matches('/');
                    match load_snapshot_config(self.blob.as_ref(), snapshot_id).await {
                        Ok(Some(cfg)) => snapshots.push(cfg.to_snapshot()),
                        Ok(None) => {}
                        Err(err) => warn!("skipping {snapshot_id} while listing: {err}"),
                    }
                }
            }
        }
        Ok(DescribeSnapshotsOutput { snapshots })
    }

    pub async fn delete_snapshot(
        &self,
        input: DeleteSnapshotInput,
    ) -> Result<DeleteSnapshotOutput, Ec2Error> {
        if !is_well_formed_id(&input.snapshot_id, SNAPSHOT_PREFIX) {
            return Err(Ec2Error::new(
                Ec2ErrorCode::InvalidSnapshotIdMalformed,
                format!("Invalid snapshot id: '{}'", input.snapshot_id),
            ));
        }

        let cfg = load_snapshot_config(self.blob.as_ref(), &input.snapshot_id)
            .await?
            .ok_or_else(|| not_found(&input.snapshot_id))?;

        // A volume restored from this snapshot pins it.
        let prefixes = self
            .blob
            .list_prefixes("vol-")
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to list volumes: {e}")))?;
        for prefix in prefixes {
            let volume_id = prefix.trim_end_matches('/');
            let parent = match fetch_document(self.blob.as_ref(), volume_id).await {
                Ok(Some(doc)) => doc.volume_config.snapshot_id,
                Ok(None) => None,
                Err(err) => {
                    warn!("skipping {volume_id} while scanning for clones: {err}");
                    None
                }
            };
            if parent.as_deref() == Some(input.snapshot_id.as_str()) {
                return Err(Ec2Error::new(
                    Ec2ErrorCode::InvalidSnapshotInUse,
                    format!(
                        "The snapshot '{}' is in use by volume '{volume_id}'",
                        input.snapshot_id
                    ),
                ));
            }
        }

        let keys = self
            .blob
            .list(&format!("{}/", input.snapshot_id))
            .await
            .map_err(|e| {
                Ec2Error::server_internal(format!("failed to list {}: {e}", input.snapshot_id))
            })?;
        for key in keys {
            self.blob
                .delete(&key)
                .await
                .map_err(|e| Ec2Error::server_internal(format!("failed to delete {key}: {e}")))?;
        }
        info!("deleted snapshot {}", input.snapshot_id);

        if let Some(index) = &self.index {
            if let Err(err) = index.remove(&cfg.volume_id, &input.snapshot_id).await {
                warn!(
                    "failed to unindex {} from {}: {err}",
                    input.snapshot_id, cfg.volume_id
                );
            }
        }
        Ok(DeleteSnapshotOutput { success: true })
    }

    pub async fn copy_snapshot(
        &self,
        input: CopySnapshotInput,
    ) -> Result<CopySnapshotOutput, Ec2Error> {
        if !is_well_formed_id(&input.source_snapshot_id, SNAPSHOT_PREFIX) {
            return Err(Ec2Error::new(
                Ec2ErrorCode::InvalidSnapshotIdMalformed,
                format!("Invalid snapshot id: '{}'", input.source_snapshot_id),
            ));
        }
        if input.source_region.is_empty() {
            return Err(Ec2Error::missing_parameter("SourceRegion"));
        }

        let source = load_snapshot_config(self.blob.as_ref(), &input.source_snapshot_id)
            .await?
            .ok_or_else(|| not_found(&input.source_snapshot_id))?;

        let mut tags = source.tags.clone();
        tags.append(&mut tags_for_resource(
            input.tag_specifications.as_deref(),
            "snapshot",
        ));

        let cfg = SnapshotConfig {
            snapshot_id: new_resource_id(SNAPSHOT_PREFIX),
            volume_id: source.volume_id.clone(),
            volume_size: source.volume_size,
            state: SnapshotState::Completed,
            progress: "100%".to_string(),
            start_time: Some(Utc::now()),
            description: input.description.unwrap_or_else(|| source.description.clone()),
            encrypted: source.encrypted,
            owner_id: self.config.account_id.clone(),
            availability_zone: source.availability_zone.clone(),
            tags,
        };
        self.persist(&cfg).await?;
        info!(
            "copied snapshot {} -> {}",
            input.source_snapshot_id, cfg.snapshot_id
        );

        self.index_append(&cfg.volume_id, &cfg.snapshot_id).await;
        Ok(CopySnapshotOutput {
            snapshot_id: cfg.snapshot_id.clone(),
            tags: tag_list(&cfg.tags),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::index::SnapshotIndex;
    use crate::store::blob::MemoryBlobStore;
    use crate::store::kv::MemoryKvBucket;
    use crate::types::volume::{VolumeConfig, VolumeConfigWrapper, VolumeState};

    struct Fixture {
        service: SnapshotService,
        blob: Arc<MemoryBlobStore>,
        index: Arc<SnapshotIndex>,
    }

    fn fixture() -> Fixture {
        let blob = Arc::new(MemoryBlobStore::new());
        let index = Arc::new(SnapshotIndex::new(Arc::new(MemoryKvBucket::new())));
        let service = SnapshotService::new(
            blob.clone(),
            Some(index.clone()),
            Arc::new(DaemonConfig::default()),
        );
        Fixture {
            service,
            blob,
            index,
        }
    }

    async fn seed_volume(fx: &Fixture, volume_id: &str, size: i64, parent: Option<&str>) {
        let wrapper = VolumeConfigWrapper {
            volume_config: VolumeConfig {
                volume_id: volume_id.to_string(),
                size,
                availability_zone: "ap-southeast-2a".to_string(),
                volume_type: "gp3".to_string(),
                snapshot_id: parent.map(str::to_string),
                state: VolumeState::Available,
                ..Default::default()
            },
        };
        fx.blob
            .put(
                &format!("{volume_id}/config.json"),
                serde_json::to_vec(&wrapper).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_describe_delete_round_trip() {
        let fx = fixture();
        seed_volume(&fx, "vol-test123", 100, None).await;

        let snapshot = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "vol-test123".to_string(),
                description: Some("nightly".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(snapshot.snapshot_id.starts_with("snap-"));
        assert_eq!(snapshot.state, SnapshotState::Completed);
        assert_eq!(snapshot.progress, "100%");
        assert_eq!(snapshot.volume_size, 100);
        assert_eq!(snapshot.owner_id, "123456789012");
        assert_eq!(
            fx.index.get("vol-test123").await.unwrap(),
            [snapshot.snapshot_id.clone()]
        );

        let described = fx
            .service
            .describe_snapshots(DescribeSnapshotsInput {
                snapshot_ids: Some(vec![snapshot.snapshot_id.clone()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(described.snapshots.len(), 1);

        fx.service
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: snapshot.snapshot_id.clone(),
            })
            .await
            .unwrap();

        let described = fx
            .service
            .describe_snapshots(DescribeSnapshotsInput {
                snapshot_ids: Some(vec![snapshot.snapshot_id.clone()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(described.snapshots.is_empty());
        assert!(fx.index.is_empty("vol-test123").await.unwrap());
    }

    #[tokio::test]
    async fn create_rejects_malformed_missing_and_zero_size_sources() {
        let fx = fixture();

        let err = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "volume-1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidVolumeIdMalformed);

        let err = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "vol-missing1".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidVolumeNotFound);

        seed_volume(&fx, "vol-empty01", 0, None).await;
        let err = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "vol-empty01".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::ServerInternal);
    }

    #[tokio::test]
    async fn snapshot_tags_come_from_matching_specifications_only() {
        let fx = fixture();
        seed_volume(&fx, "vol-tagme1", 10, None).await;

        let snapshot = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "vol-tagme1".to_string(),
                tag_specifications: Some(vec![
                    crate::types::TagSpecification {
                        resource_type: "snapshot".to_string(),
                        tags: vec![crate::types::Tag {
                            key: "Name".to_string(),
                            value: "backup".to_string(),
                        }],
                    },
                    crate::types::TagSpecification {
                        resource_type: "volume".to_string(),
                        tags: vec![crate::types::Tag {
                            key: "Ignored".to_string(),
                            value: "yes".to_string(),
                        }],
                    },
                ]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(snapshot.tags.len(), 1);
        assert_eq!(snapshot.tags[0].key, "Name");
    }

    #[tokio::test]
    async fn a_cloned_volume_pins_its_parent_snapshot() {
        let fx = fixture();
        seed_volume(&fx, "vol-src001", 10, None).await;
        let snapshot = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "vol-src001".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        seed_volume(&fx, "vol-clone1", 10, Some(&snapshot.snapshot_id)).await;

        let err = fx
            .service
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: snapshot.snapshot_id.clone(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidSnapshotInUse);

        // The snapshot is still there.
        assert!(
            load_snapshot_config(fx.blob.as_ref(), &snapshot.snapshot_id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn delete_validates_id_and_existence() {
        let fx = fixture();

        let err = fx
            .service
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: "snap-".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidSnapshotIdMalformed);

        let err = fx
            .service
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: "snap-missing1".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidSnapshotNotFound);
    }

    #[tokio::test]
    async fn copy_clones_metadata_and_indexes_the_copy() {
        let fx = fixture();
        seed_volume(&fx, "vol-src002", 20, None).await;
        let original = fx
            .service
            .create_snapshot(CreateSnapshotInput {
                volume_id: "vol-src002".to_string(),
                description: Some("gold".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        let copy = fx
            .service
            .copy_snapshot(CopySnapshotInput {
                source_snapshot_id: original.snapshot_id.clone(),
                source_region: "ap-southeast-2".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_ne!(copy.snapshot_id, original.snapshot_id);

        let cfg = load_snapshot_config(fx.blob.as_ref(), &copy.snapshot_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cfg.volume_size, 20);
        assert_eq!(cfg.description, "gold");
        assert_eq!(cfg.volume_id, "vol-src002");

        let ids = fx.index.get("vol-src002").await.unwrap();
        assert_eq!(ids, [original.snapshot_id, copy.snapshot_id]);
    }

    #[tokio::test]
    async fn copy_requires_a_source_region() {
        let fx = fixture();
        let err = fx
            .service
            .copy_snapshot(CopySnapshotInput {
                source_snapshot_id: "snap-abc12".to_string(),
                source_region: String::new(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::MissingParameter);
    }

    #[tokio::test]
    async fn describe_lists_the_whole_namespace_without_ids() {
        let fx = fixture();
        seed_volume(&fx, "vol-src003", 10, None).await;
        for _ in 0..3 {
            fx.service
                .create_snapshot(CreateSnapshotInput {
                    volume_id: "vol-src003".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }

        let described = fx
            .service
            .describe_snapshots(DescribeSnapshotsInput::default())
            .await
            .unwrap();
        assert_eq!(described.snapshots.len(), 3);
    }

    #[tokio::test]
    async fn metadata_json_form_is_readable() {
        let fx = fixture();
        let cfg = SnapshotConfig {
            snapshot_id: "snap-img001".to_string(),
            volume_id: "vol-src004".to_string(),
            volume_size: 8,
            state: SnapshotState::Completed,
            progress: "100%".to_string(),
            ..Default::default()
        };
        fx.blob
            .put(
                "snap-img001/metadata.json",
                serde_json::to_vec(&cfg).unwrap(),
            )
            .await
            .unwrap();

        let loaded = load_snapshot_config(fx.blob.as_ref(), "snap-img001")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.volume_size, 8);
    }
}
