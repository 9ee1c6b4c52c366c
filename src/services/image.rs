//! Image (AMI) service: owns the `ami-*` namespace and orchestrates
//! block-device capture when an image is cut from an instance.
//!
//! A running instance's root volume is held open by the daemon that runs
//! it, so the capture is delegated over `ebs.snapshot.<volumeId>`. A
//! stopped instance's volume is opened offline through the block-backend
//! seam. The caller resolves which case applies; opening a live volume
//! offline would race the owner's write-ahead log.

use crate::bus::rpc::{self, subject, timeouts};
use crate::bus::MessageBus;
use crate::backend::BlockBackend;
use crate::config::DaemonConfig;
use crate::error::{Ec2Error, Ec2ErrorCode};
use crate::services::volume::fetch_document;
use crate::store::blob::BlobStore;
use crate::types::image::{
    BlockDeviceMapping, CreateImageInput, CreateImageOutput, CreateImageParams,
    DescribeImagesInput, DescribeImagesOutput, EbsBlockDevice, Image, ImageConfig,
};
use crate::types::instance::{EbsSnapshotRequest, EbsSnapshotResponse};
use crate::types::snapshot::{SnapshotConfig, SnapshotState};
use crate::types::{
    is_well_formed_id, new_resource_id, IMAGE_PREFIX, INSTANCE_PREFIX, SNAPSHOT_PREFIX,
};
use async_trait::async_trait;
use chrono::Utc;
use log::{info, warn};
use std::sync::Arc;

const DEFAULT_ARCHITECTURE: &str = "x86_64";
const DEFAULT_PLATFORM: &str = "Linux/UNIX";
const DEFAULT_VIRTUALIZATION: &str = "hvm";
const ROOT_DEVICE_NAME: &str = "/dev/sda1";

/// Root-volume facts for an instance, resolved by the instance-lifecycle
/// component before image creation runs.
#[derive(Debug, Clone, Default)]
pub struct InstanceFacts {
    pub root_volume_id: String,
    pub source_image_id: Option<String>,
    pub running: bool,
}

/// Seam to the instance-lifecycle component.
#[async_trait]
pub trait InstanceResolver: Send + Sync {
    /// Looks up an instance's root-volume facts; `None` for an unknown
    /// instance.
    async fn resolve(&self, instance_id: &str) -> Result<Option<InstanceFacts>, Ec2Error>;
}

fn config_key(image_id: &str) -> String {
    format!("{image_id}/config.json")
}

pub struct ImageService {
    blob: Arc<dyn BlobStore>,
    bus: Arc<dyn MessageBus>,
    backend: Arc<dyn BlockBackend>,
    resolver: Arc<dyn InstanceResolver>,
    config: Arc<DaemonConfig>,
}

impl ImageService {
    pub fn new(
        blob: Arc<dyn BlobStore>,
        bus: Arc<dyn MessageBus>,
        backend: Arc<dyn BlockBackend>,
        resolver: Arc<dyn InstanceResolver>,
        config: Arc<DaemonConfig>,
    ) -> Self {
        Self {
            blob,
            bus,
            backend,
            resolver,
            config,
        }
    }

    async fn load_config(&self, image_id: &str) -> Result<Option<ImageConfig>, Ec2Error> {
        let bytes = self
            .blob
            .get(&config_key(image_id))
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to read {image_id}: {e}")))?;
        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| Ec2Error::server_internal(format!("corrupt image {image_id}: {e}"))),
            None => Ok(None),
        }
    }

    fn owner_matches(&self, cfg: &ImageConfig, owners: Option<&[String]>) -> bool {
        let Some(owners) = owners.filter(|o| !o.is_empty()) else {
            return true;
        };
        owners.iter().any(|owner| {
            owner == "self" || owner == &self.config.account_id || owner == &cfg.image_owner_alias
        })
    }

    fn synthesize(&self, cfg: ImageConfig) -> Image {
        let creation_date = cfg
            .creation_date
            .map(|t| t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_default();
        let architecture = if cfg.architecture.is_empty() {
            DEFAULT_ARCHITECTURE.to_string()
        } else {
            cfg.architecture
        };
        Image {
            image_id: cfg.image_id,
            name: cfg.name,
            description: cfg.description,
            state: "available".to_string(),
            owner_id: self.config.account_id.clone(),
            architecture,
            creation_date,
            platform_details: cfg.platform_details,
            virtualization_type: cfg.virtualization_type,
            root_device_type: cfg.root_device_type,
            root_device_name: ROOT_DEVICE_NAME.to_string(),
            image_owner_alias: cfg.image_owner_alias,
            block_device_mappings: vec![BlockDeviceMapping {
                device_name: ROOT_DEVICE_NAME.to_string(),
                ebs: EbsBlockDevice {
                    snapshot_id: cfg.snapshot_id,
                    volume_size: cfg.root_volume_size,
                    volume_type: "gp3".to_string(),
                    delete_on_termination: true,
                    encrypted: false,
                },
            }],
            tags: Vec::new(),
        }
    }

    pub async fn describe_images(
        &self,
        input: DescribeImagesInput,
    ) -> Result<DescribeImagesOutput, Ec2Error> {
        let prefixes = self
            .blob
            .list_prefixes("ami-")
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to list images: {e}")))?;

        let mut images = Vec::new();
        for prefix in prefixes {
            let image_id = prefix.trim_end_matches('/');
            let cfg = match self.load_config(image_id).await {
                Ok(Some(cfg)) => cfg,
                Ok(None) => continue,
                Err(err) => {
                    warn!("skipping {image_id} while listing: {err}");
                    continue;
                }
            };
            if let Some(ids) = input.image_ids.as_ref().filter(|ids| !ids.is_empty()) {
                if !ids.iter().any(|id| id == &cfg.image_id) {
                    continue;
                }
            }
            if !self.owner_matches(&cfg, input.owners.as_deref()) {
                continue;
            }
            images.push(self.synthesize(cfg));
        }
        Ok(DescribeImagesOutput { images })
    }

    pub async fn create_image(&self, input: CreateImageInput) -> Result<CreateImageOutput, Ec2Error> {
        if input.name.is_empty() {
            return Err(Ec2Error::missing_parameter("Name"));
        }
        if !is_well_formed_id(&input.instance_id, INSTANCE_PREFIX) {
            return Err(Ec2Error::new(
                Ec2ErrorCode::InvalidInstanceIdMalformed,
                format!("Invalid instance id: '{}'", input.instance_id),
            ));
        }

        let facts = self
            .resolver
            .resolve(&input.instance_id)
            .await?
            .ok_or_else(|| {
                Ec2Error::new(
                    Ec2ErrorCode::InvalidInstanceIdNotFound,
                    format!("The instance ID '{}' does not exist", input.instance_id),
                )
            })?;

        self.create_image_from_instance(CreateImageParams {
            instance_id: input.instance_id,
            name: input.name,
            description: input.description.unwrap_or_default(),
            root_volume_id: facts.root_volume_id,
            source_image_id: facts.source_image_id,
            running: facts.running,
        })
        .await
    }

    /// Cuts a snapshot of the instance's root volume, live over the bus
    /// or offline through the block backend, then writes the snapshot
    /// metadata and the new AMI document.
    pub async fn create_image_from_instance(
        &self,
        params: CreateImageParams,
    ) -> Result<CreateImageOutput, Ec2Error> {
        let snapshot_id = new_resource_id(SNAPSHOT_PREFIX);
        let image_id = new_resource_id(IMAGE_PREFIX);

        if params.running {
            self.capture_live(&params, &snapshot_id).await?;
        } else {
            self.capture_offline(&params, &snapshot_id).await?;
        }

        let volume = fetch_document(self.blob.as_ref(), &params.root_volume_id)
            .await?
            .ok_or_else(|| {
                Ec2Error::server_internal(format!(
                    "root volume {} has no config document",
                    params.root_volume_id
                ))
            })?
            .volume_config;

        // Architecture and platform come from the AMI the instance booted
        // from, with platform defaults when it is gone.
        let (architecture, platform_details, virtualization_type) =
            match &params.source_image_id {
                Some(source_id) => match self.load_config(source_id).await? {
                    Some(source) => (
                        source.architecture,
                        source.platform_details,
                        source.virtualization_type,
                    ),
                    None => (
                        DEFAULT_ARCHITECTURE.to_string(),
                        DEFAULT_PLATFORM.to_string(),
                        DEFAULT_VIRTUALIZATION.to_string(),
                    ),
                },
                None => (
                    DEFAULT_ARCHITECTURE.to_string(),
                    DEFAULT_PLATFORM.to_string(),
                    DEFAULT_VIRTUALIZATION.to_string(),
                ),
            };

        let snapshot = SnapshotConfig {
            snapshot_id: snapshot_id.clone(),
            volume_id: params.root_volume_id.clone(),
            volume_size: volume.size,
            state: SnapshotState::Completed,
            progress: "100%".to_string(),
            start_time: Some(Utc::now()),
            description: format!("Created by CreateImage({}) for {image_id}", params.instance_id),
            encrypted: volume.encrypted,
            owner_id: self.config.account_id.clone(),
            availability_zone: volume.availability_zone.clone(),
            tags: Default::default(),
        };
        let bytes = serde_json::to_vec(&snapshot).map_err(|e| {
            Ec2Error::server_internal(format!("failed to encode snapshot {snapshot_id}: {e}"))
        })?;
        self.blob
            .put(&format!("{snapshot_id}/metadata.json"), bytes)
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to write {snapshot_id}: {e}")))?;

        let image = ImageConfig {
            image_id: image_id.clone(),
            name: params.name.clone(),
            description: params.description.clone(),
            snapshot_id,
            architecture,
            platform_details,
            virtualization_type,
            root_volume_size: volume.size,
            creation_date: Some(Utc::now()),
            root_device_type: "ebs".to_string(),
            image_owner_alias: "self".to_string(),
        };
        let bytes = serde_json::to_vec(&image).map_err(|e| {
            Ec2Error::server_internal(format!("failed to encode image {image_id}: {e}"))
        })?;
        self.blob
            .put(&config_key(&image_id), bytes)
            .await
            .map_err(|e| Ec2Error::server_internal(format!("failed to write {image_id}: {e}")))?;

        info!(
            "created image {image_id} from instance {} (volume {})",
            params.instance_id, params.root_volume_id
        );
        Ok(CreateImageOutput { image_id })
    }

    /// Asks the daemon holding the volume open to cut the snapshot.
    async fn capture_live(
        &self,
        params: &CreateImageParams,
        snapshot_id: &str,
    ) -> Result<(), Ec2Error> {
        let request = EbsSnapshotRequest {
            volume: params.root_volume_id.clone(),
            snapshot_id: snapshot_id.to_string(),
        };
        let response: EbsSnapshotResponse = rpc::call_instance(
            self.bus.as_ref(),
            &subject::ebs_snapshot(&params.root_volume_id),
            &params.instance_id,
            &request,
            timeouts::INSTANCE_COMMAND,
        )
        .await?;

        if !response.success || response.error.as_deref().is_some_and(|e| !e.is_empty()) {
            return Err(Ec2Error::server_internal(format!(
                "live snapshot of {} failed: {}",
                params.root_volume_id,
                response.error.unwrap_or_default()
            )));
        }
        Ok(())
    }

    /// Opens the detached volume's block state offline and cuts the
    /// snapshot locally.
    async fn capture_offline(
        &self,
        params: &CreateImageParams,
        snapshot_id: &str,
    ) -> Result<(), Ec2Error> {
        let volume_id = &params.root_volume_id;
        let mut handle = self.backend.open(volume_id).await.map_err(|e| {
            Ec2Error::server_internal(format!("failed to open {volume_id} offline: {e}"))
        })?;
        handle.load_wal().await.map_err(|e| {
            Ec2Error::server_internal(format!("failed to replay log of {volume_id}: {e}"))
        })?;
        handle.create_snapshot(snapshot_id).await.map_err(|e| {
            Ec2Error::server_internal(format!("offline snapshot of {volume_id} failed: {e}"))
        })?;
        handle.release().await.map_err(|e| {
            Ec2Error::server_internal(format!("failed to release {volume_id}: {e}"))
        })?;
        Ok(())
    }
}

/// Image operations declared on the surface but not implemented in this
/// release.
pub fn not_implemented(operation: &str) -> Ec2Error {
    Ec2Error::new(
        Ec2ErrorCode::InternalError,
        format!("{operation} is not implemented"),
    )
}
