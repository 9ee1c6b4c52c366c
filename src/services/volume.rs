//! Volume service: owns the `vol-*` namespace in the blob store and the
//! attachment side of the volume lifecycle.
//!
//! The on-disk config document has two shapes. A brand-new volume is a thin
//! `{"VolumeConfig": …}` wrapper; once the block backend opens the volume it
//! rewrites the document as its full state (block geometry, sequence
//! counters, WAL markers). Every write here goes through [`save_config`],
//! which re-reads the document and preserves backend fields when present;
//! writing the thin shape over live backend state corrupts the volume.
//!
//! [`save_config`]: VolumeService::save_config

use crate::bus::rpc::{subject, timeouts};
use crate::bus::{BusError, MessageBus};
use crate::config::DaemonConfig;
use crate::error::{Ec2Error, Ec2ErrorCode};
use crate::services::index::SnapshotIndex;
use crate::services::snapshot::load_snapshot_config;
use crate::store::blob::BlobStore;
use crate::types::volume::{
    AttachmentRecord, BackendState, CreateVolumeInput, DeleteVolumeInput, DeleteVolumeOutput,
    DescribeVolumeStatusInput, DescribeVolumeStatusOutput, DescribeVolumesInput,
    DescribeVolumesOutput, ModifyVolumeInput, ModifyVolumeOutput, Volume, VolumeConfig,
    VolumeConfigWrapper, VolumeModification, VolumeState, VolumeStatusDetail, VolumeStatusInfo,
    VolumeStatusItem,
};
use crate::types::instance::{EbsDeleteRequest, EbsDeleteResponse};
use crate::types::{new_resource_id, tags_for_resource, VOLUME_PREFIX};
use chrono::Utc;
use futures::future::join_all;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Accepted volume size range in GiB.
pub const MIN_VOLUME_SIZE: i64 = 1;
pub const MAX_VOLUME_SIZE: i64 = 16384;

/// The only volume type this platform provisions.
pub const DEFAULT_VOLUME_TYPE: &str = "gp3";

pub struct VolumeService {
    blob: Arc<dyn BlobStore>,
    bus: Arc<dyn MessageBus>,
    index: Option<Arc<SnapshotIndex>>,
    config: Arc<DaemonConfig>,
}

fn config_key(volume_id: &str) -> String {
    format!("{volume_id}/config.json")
}

/// Reads and parses a volume document. `None` when the volume does not
/// exist; parse failures are surfaced, the document is the source of truth.
pub(crate) async fn fetch_document(
    blob: &dyn BlobStore,
    volume_id: &str,
) -> Result<Option<BackendState>, Ec2Error> {
    let bytes = blob
        .get(&config_key(volume_id))
        .await
        .map_err(|e| Ec2Error::server_internal(format!("failed to read {volume_id}: {e}")))?;
    match bytes {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| Ec2Error::server_internal(format!("corrupt config for {volume_id}: {e}"))),
        None => Ok(None),
    }
}

fn not_found(volume_id: &str) -> Ec2Error {
    Ec2Error::new(
        Ec2ErrorCode::InvalidVolumeNotFound,
        format!("The volume '{volume_id}' does not exist"),
    )
}

impl VolumeService {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        bus: Arc<dyn MessageBus>,
        index: Option<Arc<SnapshotIndex>>,
        config: Arc<DaemonConfig>,
    ) -> Self {
        Self {
            blob,
            bus,
            index,
            config,
        }
    }

    async fn load_config(&self, volume_id: &str) -> Result<Option<VolumeConfig>, Ec2Error> {
        Ok(fetch_document(self.blob.as_ref(), volume_id)
            .await?
            .map(|doc| doc.volume_config))
    }

    /// Persists a volume config through the merge path: re-read the
    /// current document, and when the block backend has state there
    /// (`BlockSize > 0`) update the config inside it and write the whole
    /// document back with its byte size reconciled. Otherwise write the
    /// thin wrapper.
    async fn save_config(&self, cfg: &VolumeConfig) -> Result<(), Ec2Error> {
        let existing = fetch_document(self.blob.as_ref(), &cfg.volume_id).await?;
        let bytes = match existing {
            Some(mut doc) if doc.has_backend_state() => {
                doc.volume_config = cfg.clone();
                doc.reconcile_size();
                serde_json::to_vec(&doc)
            }
            _ => serde_json::to_vec(&VolumeConfigWrapper {
                volume_config: cfg.clone(),
            }),
        }
        .map_err(|e| {
            Ec2Error::server_internal(format!("failed to encode config for {}: {e}", cfg.volume_id))
        })?;

        self.blob
            .put(&config_key(&cfg.volume_id), bytes)
            .await
            .map_err(|e| {
                Ec2Error::server_internal(format!("failed to write {}: {e}", cfg.volume_id))
            })
    }

    pub async fn create_volume(&self, input: CreateVolumeInput) -> Result<Volume, Ec2Error> {
        if input.availability_zone.is_empty() {
            return Err(Ec2Error::missing_parameter("AvailabilityZone"));
        }
        if input.availability_zone != self.config.availability_zone {
            return Err(Ec2Error::new(
                Ec2ErrorCode::InvalidAvailabilityZone,
                format!(
                    "Availability zone '{}' is not served here",
                    input.availability_zone
                ),
            ));
        }

        let volume_type = match input.volume_type.as_deref() {
            None | Some("") => DEFAULT_VOLUME_TYPE.to_string(),
            Some(DEFAULT_VOLUME_TYPE) => DEFAULT_VOLUME_TYPE.to_string(),
            Some(other) => {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Volume type '{other}' is not supported"
                )));
            }
        };

        if let Some(iops) = input.iops {
            if iops <= 0 {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Iops must be positive, got {iops}"
                )));
            }
        }

        // Sizing is explicit, inherited from the source snapshot, or both;
        // an explicit size must cover the snapshot it restores.
        let mut encrypted = input.encrypted.unwrap_or(false);
        let mut size = input.size;
        if let Some(snapshot_id) = input.snapshot_id.as_deref().filter(|s| !s.is_empty()) {
            let snapshot = load_snapshot_config(self.blob.as_ref(), snapshot_id)
                .await?
                .ok_or_else(|| {
                    Ec2Error::new(
                        Ec2ErrorCode::InvalidSnapshotNotFound,
                        format!("The snapshot '{snapshot_id}' does not exist"),
                    )
                })?;
            match size {
                None => size = Some(snapshot.volume_size),
                Some(requested) if requested < snapshot.volume_size => {
                    return Err(Ec2Error::invalid_parameter(format!(
                        "Volume size {requested} GiB is smaller than snapshot size {} GiB",
                        snapshot.volume_size
                    )));
                }
                Some(_) => {}
            }
            if input.encrypted.is_none() {
                encrypted = snapshot.encrypted;
            }
        }

        let size = size.ok_or_else(|| Ec2Error::missing_parameter("Size"))?;
        if !(MIN_VOLUME_SIZE..=MAX_VOLUME_SIZE).contains(&size) {
            return Err(Ec2Error::invalid_parameter(format!(
                "Volume size must be between {MIN_VOLUME_SIZE} and {MAX_VOLUME_SIZE} GiB, got {size}"
            )));
        }

        let cfg = VolumeConfig {
            volume_id: new_resource_id(VOLUME_PREFIX),
            size,
            availability_zone: input.availability_zone.clone(),
            volume_type,
            iops: input.iops,
            snapshot_id: input.snapshot_id.clone().filter(|s| !s.is_empty()),
            encrypted,
            state: VolumeState::Available,
            create_time: Some(Utc::now()),
            attachment: None,
            tags: tags_for_resource(input.tag_specifications.as_deref(), "volume"),
        };
        self.save_config(&cfg).await?;
        info!("created volume {} ({} GiB)", cfg.volume_id, cfg.size);
        Ok(cfg.to_volume())
    }

    pub async fn describe_volumes(
        &self,
        input: DescribeVolumesInput,
    ) -> Result<DescribeVolumesOutput, Ec2Error> {
        let volumes = match input.volume_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => self.fetch_requested(&ids).await?,
            None => self.fetch_all().await?,
        };
        Ok(DescribeVolumesOutput { volumes })
    }

    /// Fetches each requested id concurrently; the result order is
    /// whatever the fetches produce. Any missing id fails the whole call.
    async fn fetch_requested(&self, ids: &[String]) -> Result<Vec<Volume>, Ec2Error> {
        let results = Arc::new(Mutex::new(Vec::with_capacity(ids.len())));
        let fetches = ids.iter().map(|id| {
            let blob = self.blob.clone();
            let results = results.clone();
            let id = id.clone();
            async move {
                match fetch_document(blob.as_ref(), &id).await? {
                    Some(doc) => {
                        results.lock().await.push(doc.volume_config.to_volume());
                        Ok(())
                    }
                    None => Err(not_found(&id)),
                }
            }
        });
        for outcome in join_all(fetches).await {
            outcome?;
        }
        let mut results = results.lock().await;
        Ok(std::mem::take(&mut *results))
    }

    /// Lists every volume under the `vol-` namespace. Documents that fail
    /// to parse or never received a size are skipped rather than failing
    /// the listing.
    async fn fetch_all(&self) -> Result<Vec<Volume>, Ec2Error> {
        let prefixes = self
            .blob
            .list_prefixes("vol-")
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to list volumes: {e}")))?;

        let mut volumes = Vec::new();
        for prefix in prefixes {
            let volume_id = prefix.trim_end_matches('/');
            let bytes = match self.blob.get(&config_key(volume_id)).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => continue,
                Err(e) => {
                    warn!("skipping {volume_id} while listing: {e}");
                    continue;
                }
            };
            let doc: BackendState = match serde_json::from_slice(&bytes) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("skipping {volume_id} while listing: {e}");
                    continue;
                }
            };
            if doc.volume_config.size == 0 {
                continue;
            }
            volumes.push(doc.volume_config.to_volume());
        }
        Ok(volumes)
    }

    pub async fn modify_volume(
        &self,
        input: ModifyVolumeInput,
    ) -> Result<ModifyVolumeOutput, Ec2Error> {
        let mut cfg = self
            .load_config(&input.volume_id)
            .await?
            .ok_or_else(|| not_found(&input.volume_id))?;

        if cfg.state == VolumeState::InUse && cfg.attachment.is_some() {
            return Err(Ec2Error::new(
                Ec2ErrorCode::IncorrectState,
                format!(
                    "Volume '{}' is attached and cannot be modified",
                    input.volume_id
                ),
            ));
        }

        let original_size = cfg.size;
        let original_type = cfg.volume_type.clone();
        let original_iops = cfg.iops;

        if let Some(size) = input.size {
            if size <= cfg.size {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Target size {size} GiB must be greater than current size {} GiB",
                    cfg.size
                )));
            }
            if size > MAX_VOLUME_SIZE {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Target size {size} GiB exceeds the {MAX_VOLUME_SIZE} GiB maximum"
                )));
            }
            cfg.size = size;
        }
        if let Some(volume_type) = input.volume_type.as_deref().filter(|t| !t.is_empty()) {
            if volume_type != DEFAULT_VOLUME_TYPE {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Volume type '{volume_type}' is not supported"
                )));
            }
            cfg.volume_type = volume_type.to_string();
        }
        if let Some(iops) = input.iops {
            if iops <= 0 {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Iops must be positive, got {iops}"
                )));
            }
            cfg.iops = Some(iops);
        }

        self.save_config(&cfg).await?;
        info!(
            "modified volume {}: {} -> {} GiB",
            cfg.volume_id, original_size, cfg.size
        );

        let now = Utc::now();
        Ok(ModifyVolumeOutput {
            volume_modification: VolumeModification {
                volume_id: cfg.volume_id.clone(),
                modification_state: "completed".to_string(),
                progress: 100,
                original_size,
                target_size: cfg.size,
                original_volume_type: original_type,
                target_volume_type: cfg.volume_type.clone(),
                original_iops,
                target_iops: cfg.iops,
                start_time: Some(now),
                end_time: Some(now),
            },
        })
    }

    pub async fn delete_volume(
        &self,
        input: DeleteVolumeInput,
    ) -> Result<DeleteVolumeOutput, Ec2Error> {
        let index = self.index.as_ref().ok_or_else(|| {
            Ec2Error::server_internal("snapshot index is not configured; cannot gate volume delete")
        })?;

        let cfg = self
            .load_config(&input.volume_id)
            .await?
            .ok_or_else(|| not_found(&input.volume_id))?;

        // Attachment and state are checked independently: a document with
        // a stale attachment but `available` state is still busy.
        if let Some(attachment) = &cfg.attachment {
            return Err(Ec2Error::new(
                Ec2ErrorCode::VolumeInUse,
                format!(
                    "Volume '{}' is attached to instance '{}'",
                    input.volume_id, attachment.instance_id
                ),
            ));
        }
        if cfg.state != VolumeState::Available {
            return Err(Ec2Error::new(
                Ec2ErrorCode::VolumeInUse,
                format!("Volume '{}' is currently in use", input.volume_id),
            ));
        }

        let snapshots = index.get(&input.volume_id).await?;
        if !snapshots.is_empty() {
            return Err(Ec2Error::new(
                Ec2ErrorCode::VolumeInUse,
                format!(
                    "Volume '{}' has {} snapshot(s) and cannot be deleted",
                    input.volume_id,
                    snapshots.len()
                ),
            ));
        }

        let keys = self
            .blob
            .list(&format!("{}/", input.volume_id))
            .await
            .map_err(|e| {
                Ec2Error::server_internal(format!("failed to list {}: {e}", input.volume_id))
            })?;
        for key in keys {
            self.blob.delete(&key).await.map_err(|e| {
                Ec2Error::server_internal(format!("failed to delete {key}: {e}"))
            })?;
        }
        info!("deleted volume {}", input.volume_id);

        self.notify_block_daemon(&input.volume_id).await?;
        Ok(DeleteVolumeOutput { success: true })
    }

    /// Tells the block daemon to release the deleted volume's data. The
    /// delete is already durable: an unanswered or timed-out notification
    /// is logged and swallowed, but a daemon that answers with a failure
    /// is surfaced.
    async fn notify_block_daemon(&self, volume_id: &str) -> Result<(), Ec2Error> {
        let request = EbsDeleteRequest {
            volume: volume_id.to_string(),
        };
        let payload = serde_json::to_vec(&request).map_err(|e| {
            Ec2Error::server_internal(format!("failed to encode release request: {e}"))
        })?;

        let reply = match self
            .bus
            .request(subject::EBS_DELETE, payload, timeouts::DEFAULT)
            .await
        {
            Ok(reply) => reply,
            Err(BusError::Timeout(..)) | Err(BusError::NoResponders(_)) => {
                warn!("block daemon did not acknowledge release of {volume_id}");
                return Ok(());
            }
            Err(err) => {
                return Err(Ec2Error::server_internal(format!(
                    "release notification for {volume_id} failed: {err}"
                )));
            }
        };

        let response: EbsDeleteResponse = serde_json::from_slice(&reply).map_err(|e| {
            Ec2Error::server_internal(format!("failed to decode release reply: {e}"))
        })?;
        if !response.success {
            return Err(Ec2Error::server_internal(format!(
                "block daemon failed to release {volume_id}: {}",
                response.error.unwrap_or_default()
            )));
        }
        Ok(())
    }

    pub async fn describe_volume_status(
        &self,
        input: DescribeVolumeStatusInput,
    ) -> Result<DescribeVolumeStatusOutput, Ec2Error> {
        let volumes = match input.volume_ids.filter(|ids| !ids.is_empty()) {
            Some(ids) => self.fetch_requested(&ids).await?,
            None => self.fetch_all().await?,
        };

        let volume_statuses = volumes
            .into_iter()
            .map(|volume| VolumeStatusItem {
                volume_id: volume.volume_id,
                availability_zone: volume.availability_zone,
                volume_status: VolumeStatusInfo {
                    status: "ok".to_string(),
                    details: vec![
                        VolumeStatusDetail {
                            name: "io-enabled".to_string(),
                            status: "passed".to_string(),
                        },
                        VolumeStatusDetail {
                            name: "io-performance".to_string(),
                            status: "normal".to_string(),
                        },
                    ],
                },
            })
            .collect();
        Ok(DescribeVolumeStatusOutput { volume_statuses })
    }

    /// The single entry point that writes attachment fields. Invoked by
    /// the instance-lifecycle daemon after it has actually attached or
    /// detached the device.
    pub async fn update_volume_state(
        &self,
        volume_id: &str,
        state: VolumeState,
        instance_id: Option<String>,
        device: Option<String>,
    ) -> Result<(), Ec2Error> {
        let mut cfg = self
            .load_config(volume_id)
            .await?
            .ok_or_else(|| not_found(volume_id))?;

        cfg.state = state;
        cfg.attachment = match state {
            VolumeState::InUse => {
                let instance_id = instance_id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| Ec2Error::missing_parameter("InstanceId"))?;
                Some(AttachmentRecord {
                    instance_id,
                    device: device.unwrap_or_default(),
                    attach_time: Some(Utc::now()),
                    delete_on_termination: false,
                })
            }
            VolumeState::Available => None,
        };

        self.save_config(&cfg).await?;
        info!("volume {} is now {}", volume_id, state.as_str());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use crate::store::blob::MemoryBlobStore;
    use crate::store::kv::MemoryKvBucket;
    use crate::types::snapshot::{SnapshotConfig, SnapshotState};
    use crate::types::TagSpecification;

    struct Fixture {
        service: VolumeService,
        blob: Arc<MemoryBlobStore>,
        bus: Arc<MemoryBus>,
        index: Arc<SnapshotIndex>,
    }

    fn fixture() -> Fixture {
        let blob = Arc::new(MemoryBlobStore::new());
        let bus = Arc::new(MemoryBus::new());
        let index = Arc::new(SnapshotIndex::new(Arc::new(MemoryKvBucket::new())));
        let service = VolumeService::new(
            blob.clone(),
            bus.clone(),
            Some(index.clone()),
            Arc::new(DaemonConfig::default()),
        );
        Fixture {
            service,
            blob,
            bus,
            index,
        }
    }

    fn create_input(size: i64) -> CreateVolumeInput {
        CreateVolumeInput {
            availability_zone: "ap-southeast-2a".to_string(),
            size: Some(size),
            ..Default::default()
        }
    }

    async fn seed_volume(fx: &Fixture, volume_id: &str, size: i64) {
        let cfg = VolumeConfig {
            volume_id: volume_id.to_string(),
            size,
            availability_zone: "ap-southeast-2a".to_string(),
            volume_type: "gp3".to_string(),
            state: VolumeState::Available,
            ..Default::default()
        };
        fx.service.save_config(&cfg).await.unwrap();
    }

    #[tokio::test]
    async fn create_volume_happy_path() {
        let fx = fixture();
        let mut input = create_input(100);
        input.tag_specifications = Some(vec![TagSpecification {
            resource_type: "volume".to_string(),
            tags: vec![crate::types::Tag {
                key: "Name".to_string(),
                value: "data".to_string(),
            }],
        }]);

        let volume = fx.service.create_volume(input).await.unwrap();
        assert!(volume.volume_id.starts_with("vol-"));
        assert_eq!(volume.size, 100);
        assert_eq!(volume.state, VolumeState::Available);
        assert_eq!(volume.volume_type, "gp3");
        assert_eq!(volume.tags.len(), 1);

        // Fresh volumes land on disk as the thin wrapper.
        let bytes = fx
            .blob
            .get(&config_key(&volume.volume_id))
            .await
            .unwrap()
            .unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert!(raw.get("VolumeConfig").is_some());
        assert!(raw.get("BlockSize").is_none());
    }

    #[tokio::test]
    async fn create_volume_size_bounds() {
        let fx = fixture();
        assert_eq!(
            fx.service.create_volume(create_input(0)).await.unwrap_err().code,
            Ec2ErrorCode::InvalidParameterValue
        );
        assert!(fx.service.create_volume(create_input(1)).await.is_ok());
        assert!(fx.service.create_volume(create_input(16384)).await.is_ok());
        assert_eq!(
            fx.service
                .create_volume(create_input(16385))
                .await
                .unwrap_err()
                .code,
            Ec2ErrorCode::InvalidParameterValue
        );
    }

    #[tokio::test]
    async fn create_volume_rejects_foreign_zone_and_type() {
        let fx = fixture();

        let mut input = create_input(10);
        input.availability_zone = "us-east-1a".to_string();
        assert_eq!(
            fx.service.create_volume(input).await.unwrap_err().code,
            Ec2ErrorCode::InvalidAvailabilityZone
        );

        let mut input = create_input(10);
        input.availability_zone = String::new();
        assert_eq!(
            fx.service.create_volume(input).await.unwrap_err().code,
            Ec2ErrorCode::MissingParameter
        );

        let mut input = create_input(10);
        input.volume_type = Some("io1".to_string());
        assert_eq!(
            fx.service.create_volume(input).await.unwrap_err().code,
            Ec2ErrorCode::InvalidParameterValue
        );
    }

    async fn seed_snapshot(fx: &Fixture, snapshot_id: &str, volume_size: i64, encrypted: bool) {
        let cfg = SnapshotConfig {
            snapshot_id: snapshot_id.to_string(),
            volume_id: "vol-source1".to_string(),
            volume_size,
            state: SnapshotState::Completed,
            progress: "100%".to_string(),
            encrypted,
            ..Default::default()
        };
        fx.blob
            .put(
                &format!("{snapshot_id}/config.json"),
                serde_json::to_vec(&cfg).unwrap(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_volume_from_snapshot_inherits_size_and_encryption() {
        let fx = fixture();
        seed_snapshot(&fx, "snap-seed1", 50, true).await;

        let input = CreateVolumeInput {
            availability_zone: "ap-southeast-2a".to_string(),
            snapshot_id: Some("snap-seed1".to_string()),
            ..Default::default()
        };
        let volume = fx.service.create_volume(input).await.unwrap();
        assert_eq!(volume.size, 50);
        assert!(volume.encrypted);
        assert_eq!(volume.snapshot_id.as_deref(), Some("snap-seed1"));
    }

    #[tokio::test]
    async fn create_volume_from_snapshot_must_cover_it() {
        let fx = fixture();
        seed_snapshot(&fx, "snap-seed1", 50, false).await;

        let mut input = create_input(49);
        input.snapshot_id = Some("snap-seed1".to_string());
        assert_eq!(
            fx.service.create_volume(input).await.unwrap_err().code,
            Ec2ErrorCode::InvalidParameterValue
        );

        let mut input = create_input(60);
        input.snapshot_id = Some("snap-seed1".to_string());
        assert_eq!(fx.service.create_volume(input).await.unwrap().size, 60);

        let mut input = create_input(10);
        input.snapshot_id = Some("snap-missing1".to_string());
        assert_eq!(
            fx.service.create_volume(input).await.unwrap_err().code,
            Ec2ErrorCode::InvalidSnapshotNotFound
        );
    }

    #[tokio::test]
    async fn describe_with_a_missing_id_fails_whole_call() {
        let fx = fixture();
        seed_volume(&fx, "vol-live1", 10).await;

        let output = fx
            .service
            .describe_volumes(DescribeVolumesInput {
                volume_ids: Some(vec!["vol-live1".to_string()]),
            })
            .await
            .unwrap();
        assert_eq!(output.volumes.len(), 1);

        let err = fx
            .service
            .describe_volumes(DescribeVolumesInput {
                volume_ids: Some(vec!["vol-live1".to_string(), "vol-gone1".to_string()]),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidVolumeNotFound);
    }

    #[tokio::test]
    async fn listing_skips_broken_and_empty_documents() {
        let fx = fixture();
        seed_volume(&fx, "vol-good1", 10).await;
        seed_volume(&fx, "vol-zero1", 0).await;
        fx.blob
            .put("vol-junk1/config.json", b"not json".to_vec())
            .await
            .unwrap();

        let output = fx
            .service
            .describe_volumes(DescribeVolumesInput::default())
            .await
            .unwrap();
        assert_eq!(output.volumes.len(), 1);
        assert_eq!(output.volumes[0].volume_id, "vol-good1");
    }

    #[tokio::test]
    async fn modify_is_grow_only() {
        let fx = fixture();
        seed_volume(&fx, "vol-b0001", 10).await;

        for target in [5, 10] {
            let err = fx
                .service
                .modify_volume(ModifyVolumeInput {
                    volume_id: "vol-b0001".to_string(),
                    size: Some(target),
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert_eq!(err.code, Ec2ErrorCode::InvalidParameterValue);
        }

        let output = fx
            .service
            .modify_volume(ModifyVolumeInput {
                volume_id: "vol-b0001".to_string(),
                size: Some(20),
                ..Default::default()
            })
            .await
            .unwrap();
        let record = output.volume_modification;
        assert_eq!(record.modification_state, "completed");
        assert_eq!(record.progress, 100);
        assert_eq!(record.original_size, 10);
        assert_eq!(record.target_size, 20);
        assert_eq!(record.start_time, record.end_time);

        let cfg = fx.service.load_config("vol-b0001").await.unwrap().unwrap();
        assert_eq!(cfg.size, 20);
    }

    #[tokio::test]
    async fn modify_rejects_attached_volume() {
        let fx = fixture();
        seed_volume(&fx, "vol-att01", 10).await;
        fx.service
            .update_volume_state(
                "vol-att01",
                VolumeState::InUse,
                Some("i-12345678".to_string()),
                Some("/dev/sdf".to_string()),
            )
            .await
            .unwrap();

        let err = fx
            .service
            .modify_volume(ModifyVolumeInput {
                volume_id: "vol-att01".to_string(),
                size: Some(20),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::IncorrectState);
    }

    #[tokio::test]
    async fn modify_preserves_backend_state_and_reconciles_bytes() {
        let fx = fixture();
        let full = r#"{"VolumeConfig":{"VolumeId":"vol-wal01","Size":10,"AvailabilityZone":"ap-southeast-2a","VolumeType":"gp3","State":"available"},"BlockSize":4096,"VolumeSize":10737418240,"SeqNum":42,"WALSeqNum":7,"WALFile":"wal.0000042"}"#;
        fx.blob
            .put("vol-wal01/config.json", full.as_bytes().to_vec())
            .await
            .unwrap();

        fx.service
            .modify_volume(ModifyVolumeInput {
                volume_id: "vol-wal01".to_string(),
                size: Some(20),
                ..Default::default()
            })
            .await
            .unwrap();

        let bytes = fx
            .blob
            .get("vol-wal01/config.json")
            .await
            .unwrap()
            .unwrap();
        let doc: BackendState = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc.volume_config.size, 20);
        assert_eq!(doc.block_size, 4096);
        assert_eq!(doc.seq_num, 42);
        assert_eq!(doc.wal_seq_num, 7);
        assert_eq!(doc.extra.get("WALFile").unwrap(), "wal.0000042");
        assert_eq!(doc.volume_size, 20u64 << 30);
    }

    #[tokio::test]
    async fn delete_requires_the_index_to_be_configured() {
        let fx = fixture();
        let service = VolumeService::new(
            fx.blob.clone(),
            fx.bus.clone(),
            None,
            Arc::new(DaemonConfig::default()),
        );
        seed_volume(&fx, "vol-del01", 10).await;

        let err = service
            .delete_volume(DeleteVolumeInput {
                volume_id: "vol-del01".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::ServerInternal);
    }

    #[tokio::test]
    async fn delete_rejects_attached_even_when_state_says_available() {
        let fx = fixture();
        let cfg = VolumeConfig {
            volume_id: "vol-del02".to_string(),
            size: 10,
            state: VolumeState::Available,
            attachment: Some(AttachmentRecord {
                instance_id: "i-12345678".to_string(),
                device: "/dev/sdf".to_string(),
                attach_time: None,
                delete_on_termination: false,
            }),
            ..Default::default()
        };
        fx.service.save_config(&cfg).await.unwrap();

        let err = fx
            .service
            .delete_volume(DeleteVolumeInput {
                volume_id: "vol-del02".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::VolumeInUse);
    }

    #[tokio::test]
    async fn delete_is_gated_on_the_snapshot_index() {
        let fx = fixture();
        seed_volume(&fx, "vol-del03", 10).await;
        fx.index.append("vol-del03", "snap-live1").await.unwrap();

        let err = fx
            .service
            .delete_volume(DeleteVolumeInput {
                volume_id: "vol-del03".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::VolumeInUse);

        fx.index.remove("vol-del03", "snap-live1").await.unwrap();
        let output = fx
            .service
            .delete_volume(DeleteVolumeInput {
                volume_id: "vol-del03".to_string(),
            })
            .await
            .unwrap();
        assert!(output.success);
        assert!(fx
            .blob
            .get("vol-del03/config.json")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_survives_a_silent_block_daemon_but_not_a_failing_one() {
        let fx = fixture();

        // No responder on ebs.delete: the delete still succeeds.
        seed_volume(&fx, "vol-del04", 10).await;
        assert!(fx
            .service
            .delete_volume(DeleteVolumeInput {
                volume_id: "vol-del04".to_string(),
            })
            .await
            .is_ok());

        // A responder that reports failure is surfaced.
        fx.bus
            .subscribe(
                subject::EBS_DELETE,
                crate::bus::rpc::handler(|request: EbsDeleteRequest| async move {
                    Ok::<_, Ec2Error>(EbsDeleteResponse {
                        volume: request.volume,
                        success: false,
                        error: Some("device busy".to_string()),
                    })
                }),
            )
            .await
            .unwrap();
        seed_volume(&fx, "vol-del05", 10).await;
        let err = fx
            .service
            .delete_volume(DeleteVolumeInput {
                volume_id: "vol-del05".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::ServerInternal);
    }

    #[tokio::test]
    async fn volume_status_reports_two_checks_per_volume() {
        let fx = fixture();
        seed_volume(&fx, "vol-st001", 10).await;

        let output = fx
            .service
            .describe_volume_status(DescribeVolumeStatusInput {
                volume_ids: Some(vec!["vol-st001".to_string()]),
            })
            .await
            .unwrap();
        assert_eq!(output.volume_statuses.len(), 1);
        let item = &output.volume_statuses[0];
        assert_eq!(item.volume_status.status, "ok");
        let names: Vec<&str> = item
            .volume_status
            .details
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, ["io-enabled", "io-performance"]);
    }

    #[tokio::test]
    async fn attach_detach_cycle_through_update_volume_state() {
        let fx = fixture();
        seed_volume(&fx, "vol-cyc01", 10).await;

        fx.service
            .update_volume_state(
                "vol-cyc01",
                VolumeState::InUse,
                Some("i-12345678".to_string()),
                Some("/dev/sdf".to_string()),
            )
            .await
            .unwrap();
        let cfg = fx.service.load_config("vol-cyc01").await.unwrap().unwrap();
        assert_eq!(cfg.state, VolumeState::InUse);
        let attachment = cfg.attachment.unwrap();
        assert_eq!(attachment.instance_id, "i-12345678");
        assert_eq!(attachment.device, "/dev/sdf");

        fx.service
            .update_volume_state("vol-cyc01", VolumeState::Available, None, None)
            .await
            .unwrap();
        let cfg = fx.service.load_config("vol-cyc01").await.unwrap().unwrap();
        assert_eq!(cfg.state, VolumeState::Available);
        assert!(cfg.attachment.is_none());
    }
}
