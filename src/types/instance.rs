//! Payloads for the per-instance command channels. These travel between
//! Hive daemons, not to EC2 clients, and keep the platform's camelCase
//! field names.

use super::volume::{AttachVolumeInput, DetachVolumeInput};
use serde::{Deserialize, Serialize};

/// Flags selecting the action an instance daemon should perform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceCommandAttributes {
    #[serde(rename = "attachVolume", skip_serializing_if = "std::ops::Not::not")]
    pub attach_volume: bool,
    #[serde(rename = "detachVolume", skip_serializing_if = "std::ops::Not::not")]
    pub detach_volume: bool,
}

/// Command sent on `ec2.cmd.<instanceId>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceCommand {
    pub id: String,
    pub attributes: InstanceCommandAttributes,
    #[serde(rename = "attachVolumeData", skip_serializing_if = "Option::is_none")]
    pub attach_volume_data: Option<AttachVolumeInput>,
    #[serde(rename = "detachVolumeData", skip_serializing_if = "Option::is_none")]
    pub detach_volume_data: Option<DetachVolumeInput>,
}

impl InstanceCommand {
    pub fn attach(instance_id: &str, data: AttachVolumeInput) -> Self {
        InstanceCommand {
            id: instance_id.to_string(),
            attributes: InstanceCommandAttributes {
                attach_volume: true,
                detach_volume: false,
            },
            attach_volume_data: Some(data),
            detach_volume_data: None,
        }
    }

    pub fn detach(instance_id: &str, data: DetachVolumeInput) -> Self {
        InstanceCommand {
            id: instance_id.to_string(),
            attributes: InstanceCommandAttributes {
                attach_volume: false,
                detach_volume: true,
            },
            attach_volume_data: None,
            detach_volume_data: Some(data),
        }
    }
}

/// Request on `ebs.snapshot.<volumeId>`: ask the daemon serving a live
/// volume to capture it under the given snapshot id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EbsSnapshotRequest {
    pub volume: String,
    #[serde(rename = "snapshotId")]
    pub snapshot_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EbsSnapshotResponse {
    pub volume: String,
    #[serde(rename = "snapshotId")]
    pub snapshot_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Post-delete notification on `ebs.delete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EbsDeleteRequest {
    pub volume: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EbsDeleteResponse {
    pub volume: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_command_uses_camel_case_wire_names() {
        let cmd = InstanceCommand::attach(
            "i-0abc",
            AttachVolumeInput {
                volume_id: "vol-1".to_string(),
                instance_id: "i-0abc".to_string(),
                device: "/dev/sdf".to_string(),
            },
        );
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["attributes"]["attachVolume"], true);
        assert_eq!(json["attachVolumeData"]["VolumeId"], "vol-1");
        assert!(json["attributes"].get("detachVolume").is_none());
    }
}
