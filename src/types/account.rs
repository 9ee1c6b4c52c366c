//! Account-settings shapes: the persisted record and the toggle payloads.

use serde::{Deserialize, Serialize};

/// The single persisted account-settings record, stored under the
/// `default` key of the settings bucket. Only these two toggles persist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSettingsRecord {
    #[serde(rename = "ebsEncryptionByDefault")]
    pub ebs_encryption_by_default: bool,
    #[serde(rename = "serialConsoleAccess")]
    pub serial_console_access: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct EbsEncryptionByDefaultOutput {
    pub ebs_encryption_by_default: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SerialConsoleAccessOutput {
    pub serial_console_access_enabled: bool,
}

/// Empty request body shared by the parameterless account operations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRequest {}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnapshotBlockPublicAccessInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnapshotBlockPublicAccessOutput {
    pub state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageBlockPublicAccessInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_block_public_access_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImageBlockPublicAccessOutput {
    pub image_block_public_access_state: String,
}

/// Static IMDS defaults returned for the account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InstanceMetadataDefaults {
    pub http_tokens: String,
    pub http_put_response_hop_limit: i64,
    pub http_endpoint: String,
    pub instance_metadata_tags: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct GetInstanceMetadataDefaultsOutput {
    pub account_level: InstanceMetadataDefaults,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeAccountAttributesInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute_names: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AccountAttributeValue {
    pub attribute_value: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AccountAttribute {
    pub attribute_name: String,
    pub attribute_values: Vec<AccountAttributeValue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeAccountAttributesOutput {
    pub account_attributes: Vec<AccountAttribute>,
}
