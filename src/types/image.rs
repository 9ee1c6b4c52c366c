//! AMI shapes: the stored config document and the describe/create payloads.

use super::Tag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The stored AMI document at `<imageId>/config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageConfig {
    pub image_id: String,
    pub name: String,
    pub description: String,
    /// Snapshot the root device is restored from.
    pub snapshot_id: String,
    pub architecture: String,
    pub platform_details: String,
    pub virtualization_type: String,
    /// Root volume size in GiB.
    pub root_volume_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<DateTime<Utc>>,
    pub root_device_type: String,
    pub image_owner_alias: String,
}

/// EC2 response shape for an image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Image {
    pub image_id: String,
    pub name: String,
    pub description: String,
    pub state: String,
    pub owner_id: String,
    pub architecture: String,
    /// `YYYY-MM-DDThh:mm:ss.sssZ`.
    pub creation_date: String,
    pub platform_details: String,
    pub virtualization_type: String,
    pub root_device_type: String,
    pub root_device_name: String,
    pub image_owner_alias: String,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    pub ebs: EbsBlockDevice,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EbsBlockDevice {
    pub snapshot_id: String,
    pub volume_size: i64,
    pub volume_type: String,
    pub delete_on_termination: bool,
    pub encrypted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeImagesInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owners: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeImagesOutput {
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateImageInput {
    pub instance_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateImageOutput {
    pub image_id: String,
}

/// Facts about the source instance, resolved by the daemon-side caller
/// before the image service runs: which volume backs the root device,
/// which image the instance booted from, and whether it is running.
#[derive(Debug, Clone, Default)]
pub struct CreateImageParams {
    pub instance_id: String,
    pub name: String,
    pub description: String,
    pub root_volume_id: String,
    pub source_image_id: Option<String>,
    pub running: bool,
}
