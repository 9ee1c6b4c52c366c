//! Volume shapes: operation payloads, the stored config document, and the
//! full block-backend state document that wraps it on disk.

use super::{tag_list, Tag, TagSpecification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle states a volume reports through the EC2 surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeState {
    #[default]
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "in-use")]
    InUse,
}

impl VolumeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeState::Available => "available",
            VolumeState::InUse => "in-use",
        }
    }
}

/// Attachment fields recorded on the volume document while it is in use.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AttachmentRecord {
    pub instance_id: String,
    pub device: String,
    pub attach_time: Option<DateTime<Utc>>,
    pub delete_on_termination: bool,
}

/// The volume config document. On disk this is either wrapped thin
/// (`{"VolumeConfig": …}`, brand-new volumes) or embedded in the full
/// [`BackendState`] once the block backend has initialised the volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeConfig {
    pub volume_id: String,
    /// Size in GiB.
    pub size: i64,
    pub availability_zone: String,
    pub volume_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub encrypted: bool,
    pub state: VolumeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<AttachmentRecord>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl VolumeConfig {
    /// Projects the stored document into the EC2 response shape.
    pub fn to_volume(&self) -> Volume {
        let attachments = self
            .attachment
            .as_ref()
            .map(|a| {
                vec![VolumeAttachment {
                    volume_id: self.volume_id.clone(),
                    instance_id: a.instance_id.clone(),
                    device: a.device.clone(),
                    state: "attached".to_string(),
                    attach_time: a.attach_time,
                    delete_on_termination: a.delete_on_termination,
                }]
            })
            .unwrap_or_default();

        Volume {
            volume_id: self.volume_id.clone(),
            size: self.size,
            availability_zone: self.availability_zone.clone(),
            state: self.state,
            volume_type: self.volume_type.clone(),
            iops: self.iops,
            snapshot_id: self.snapshot_id.clone(),
            encrypted: self.encrypted,
            create_time: self.create_time,
            attachments,
            tags: tag_list(&self.tags),
        }
    }
}

/// Thin on-disk wrapper used until the block backend first opens the
/// volume and replaces it with its full state document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VolumeConfigWrapper {
    #[serde(rename = "VolumeConfig")]
    pub volume_config: VolumeConfig,
}

/// The block backend's full state document: the volume config plus block
/// geometry, sequence counters, and write-ahead-log markers. `BlockSize`
/// doubles as the shape discriminator: a document with `BlockSize > 0`
/// was written by the backend and must be written back whole. Fields this daemon does not model are carried through `extra`
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendState {
    #[serde(rename = "VolumeConfig")]
    pub volume_config: VolumeConfig,
    #[serde(rename = "BlockSize")]
    pub block_size: u64,
    /// Provisioned size in bytes; must cover `volume_config.size` GiB.
    #[serde(rename = "VolumeSize")]
    pub volume_size: u64,
    #[serde(rename = "SeqNum")]
    pub seq_num: u64,
    #[serde(rename = "WALSeqNum")]
    pub wal_seq_num: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl BackendState {
    /// True when the document was written by the block backend and carries
    /// live state beyond the volume config.
    pub fn has_backend_state(&self) -> bool {
        self.block_size > 0
    }

    /// Grows `volume_size` to cover the configured GiB size. Never
    /// shrinks: the backend may have provisioned slack past the nominal
    /// size.
    pub fn reconcile_size(&mut self) {
        let wanted = (self.volume_config.size as u64) << 30;
        if self.volume_size < wanted {
            self.volume_size = wanted;
        }
    }
}

/// EC2 response shape for a volume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Volume {
    pub volume_id: String,
    pub size: i64,
    pub availability_zone: String,
    pub state: VolumeState,
    pub volume_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    pub attachments: Vec<VolumeAttachment>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

/// EC2 response shape for a volume attachment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeAttachment {
    pub volume_id: String,
    pub instance_id: String,
    pub device: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attach_time: Option<DateTime<Utc>>,
    pub delete_on_termination: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateVolumeInput {
    pub availability_zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_specifications: Option<Vec<TagSpecification>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeVolumesInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeVolumesOutput {
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModifyVolumeInput {
    pub volume_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iops: Option<i64>,
}

/// Completed-modification record returned by ModifyVolume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeModification {
    pub volume_id: String,
    pub modification_state: String,
    pub progress: i64,
    pub original_size: i64,
    pub target_size: i64,
    pub original_volume_type: String,
    pub target_volume_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_iops: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_iops: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ModifyVolumeOutput {
    pub volume_modification: VolumeModification,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteVolumeInput {
    pub volume_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteVolumeOutput {
    #[serde(rename = "Return")]
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeVolumeStatusInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeStatusDetail {
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeStatusInfo {
    pub status: String,
    pub details: Vec<VolumeStatusDetail>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VolumeStatusItem {
    pub volume_id: String,
    pub availability_zone: String,
    pub volume_status: VolumeStatusInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeVolumeStatusOutput {
    pub volume_statuses: Vec<VolumeStatusItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AttachVolumeInput {
    pub volume_id: String,
    pub instance_id: String,
    pub device: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DetachVolumeInput {
    pub volume_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub force: Option<bool>,
}
