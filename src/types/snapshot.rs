//! Snapshot shapes. The stored document is written to
//! `<snapshotId>/config.json` by the snapshot service and to
//! `<snapshotId>/metadata.json` by the image-creation path; both carry the
//! same shape.

use super::{tag_list, Tag, TagSpecification};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotState {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "completed")]
    Completed,
}

impl SnapshotState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotState::Pending => "pending",
            SnapshotState::Completed => "completed",
        }
    }
}

/// The stored snapshot document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnapshotConfig {
    pub snapshot_id: String,
    pub volume_id: String,
    /// Size of the source volume in GiB.
    pub volume_size: i64,
    pub state: SnapshotState,
    /// Percentage string, `"100%"` once complete.
    pub progress: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub description: String,
    pub encrypted: bool,
    pub owner_id: String,
    pub availability_zone: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl SnapshotConfig {
    pub fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            snapshot_id: self.snapshot_id.clone(),
            volume_id: self.volume_id.clone(),
            volume_size: self.volume_size,
            state: self.state,
            progress: self.progress.clone(),
            start_time: self.start_time,
            description: self.description.clone(),
            encrypted: self.encrypted,
            owner_id: self.owner_id.clone(),
            tags: tag_list(&self.tags),
        }
    }
}

/// EC2 response shape for a snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub volume_id: String,
    pub volume_size: i64,
    pub state: SnapshotState,
    pub progress: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    pub description: String,
    pub encrypted: bool,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateSnapshotInput {
    pub volume_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_specifications: Option<Vec<TagSpecification>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeSnapshotsInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeSnapshotsOutput {
    pub snapshots: Vec<Snapshot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteSnapshotInput {
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteSnapshotOutput {
    #[serde(rename = "Return")]
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CopySnapshotInput {
    pub source_snapshot_id: String,
    pub source_region: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_specifications: Option<Vec<TagSpecification>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CopySnapshotOutput {
    pub snapshot_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}
