//! Account-settings service.
//!
//! Two toggles persist: EBS encryption-by-default and serial-console
//! access, both on the single `default` record of the settings bucket,
//! last writer wins. The snapshot/image block-public-access operations
//! echo the requested state without persisting it, and the IMDS defaults
//! are platform constants; reads of all three return the platform
//! default regardless of earlier writes. When the KV store is unreachable
//! the service degrades to zero-valued settings and silently-accepted
//! writes rather than failing the account surface.

use crate::error::Ec2Error;
use crate::store::kv::KvBucket;
use crate::types::account::{
    AccountAttribute, AccountAttributeValue, AccountSettingsRecord, DescribeAccountAttributesInput,
    DescribeAccountAttributesOutput, EbsEncryptionByDefaultOutput, GetInstanceMetadataDefaultsOutput,
    ImageBlockPublicAccessInput, ImageBlockPublicAccessOutput, InstanceMetadataDefaults,
    SerialConsoleAccessOutput, SnapshotBlockPublicAccessInput, SnapshotBlockPublicAccessOutput,
};
use lazy_static::lazy_static;
use log::warn;
use std::sync::Arc;

/// Bucket name in the replicated KV store.
pub const ACCOUNT_SETTINGS_BUCKET: &str = "hive-ec2-account-settings";

/// The only key in the bucket.
const SETTINGS_KEY: &str = "default";

/// Platform default for the block-public-access states.
const UNBLOCKED: &str = "unblocked";

lazy_static! {
    /// Static account attributes; the platform does not vary these per
    /// account.
    static ref ACCOUNT_ATTRIBUTES: Vec<(&'static str, Vec<&'static str>)> = vec![
        ("supported-platforms", vec!["VPC"]),
        ("default-vpc", vec!["none"]),
        ("max-instances", vec!["100"]),
        ("vpc-max-security-groups-per-interface", vec!["5"]),
        ("max-elastic-ips", vec!["5"]),
        ("vpc-max-elastic-ips", vec!["20"]),
    ];
}

pub struct AccountSettingsService {
    bucket: Option<Arc<dyn KvBucket>>,
}

impl AccountSettingsService {
    pub fn new(bucket: Option<Arc<dyn KvBucket>>) -> Self {
        Self { bucket }
    }

    async fn load(&self) -> AccountSettingsRecord {
        let Some(bucket) = &self.bucket else {
            return AccountSettingsRecord::default();
        };
        match bucket.get(SETTINGS_KEY).await {
            Ok(Some(entry)) => serde_json::from_slice(&entry.value).unwrap_or_else(|e| {
                warn!("corrupt account settings record, using defaults: {e}");
                AccountSettingsRecord::default()
            }),
            Ok(None) => AccountSettingsRecord::default(),
            Err(err) => {
                warn!("account settings unavailable, using defaults: {err}");
                AccountSettingsRecord::default()
            }
        }
    }

    async fn store(&self, record: AccountSettingsRecord) {
        let Some(bucket) = &self.bucket else {
            return;
        };
        let bytes = match serde_json::to_vec(&record) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode account settings: {e}");
                return;
            }
        };
        if let Err(err) = bucket.put(SETTINGS_KEY, bytes).await {
            warn!("failed to persist account settings: {err}");
        }
    }

    async fn set_ebs_encryption(&self, enabled: bool) -> EbsEncryptionByDefaultOutput {
        let mut record = self.load().await;
        record.ebs_encryption_by_default = enabled;
        self.store(record).await;
        EbsEncryptionByDefaultOutput {
            ebs_encryption_by_default: enabled,
        }
    }

    pub async fn enable_ebs_encryption_by_default(
        &self,
    ) -> Result<EbsEncryptionByDefaultOutput, Ec2Error> {
        Ok(self.set_ebs_encryption(true).await)
    }

    pub async fn disable_ebs_encryption_by_default(
        &self,
    ) -> Result<EbsEncryptionByDefaultOutput, Ec2Error> {
        Ok(self.set_ebs_encryption(false).await)
    }

    pub async fn get_ebs_encryption_by_default(
        &self,
    ) -> Result<EbsEncryptionByDefaultOutput, Ec2Error> {
        Ok(EbsEncryptionByDefaultOutput {
            ebs_encryption_by_default: self.load().await.ebs_encryption_by_default,
        })
    }

    async fn set_serial_console(&self, enabled: bool) -> SerialConsoleAccessOutput {
        let mut record = self.load().await;
        record.serial_console_access = enabled;
        self.store(record).await;
        SerialConsoleAccessOutput {
            serial_console_access_enabled: enabled,
        }
    }

    pub async fn enable_serial_console_access(
        &self,
    ) -> Result<SerialConsoleAccessOutput, Ec2Error> {
        Ok(self.set_serial_console(true).await)
    }

    pub async fn disable_serial_console_access(
        &self,
    ) -> Result<SerialConsoleAccessOutput, Ec2Error> {
        Ok(self.set_serial_console(false).await)
    }

    pub async fn get_serial_console_access_status(
        &self,
    ) -> Result<SerialConsoleAccessOutput, Ec2Error> {
        Ok(SerialConsoleAccessOutput {
            serial_console_access_enabled: self.load().await.serial_console_access,
        })
    }

    // Snapshot and image block-public-access are accepted but not stored
    // in this release; writes echo the request and reads report the
    // platform default.

    pub async fn enable_snapshot_block_public_access(
        &self,
        input: SnapshotBlockPublicAccessInput,
    ) -> Result<SnapshotBlockPublicAccessOutput, Ec2Error> {
        Ok(SnapshotBlockPublicAccessOutput {
            state: input.state.unwrap_or_else(|| "block-all-sharing".to_string()),
        })
    }

    pub async fn disable_snapshot_block_public_access(
        &self,
    ) -> Result<SnapshotBlockPublicAccessOutput, Ec2Error> {
        Ok(SnapshotBlockPublicAccessOutput {
            state: UNBLOCKED.to_string(),
        })
    }

    pub async fn get_snapshot_block_public_access_state(
        &self,
    ) -> Result<SnapshotBlockPublicAccessOutput, Ec2Error> {
        Ok(SnapshotBlockPublicAccessOutput {
            state: UNBLOCKED.to_string(),
        })
    }

    pub async fn enable_image_block_public_access(
        &self,
        input: ImageBlockPublicAccessInput,
    ) -> Result<ImageBlockPublicAccessOutput, Ec2Error> {
        Ok(ImageBlockPublicAccessOutput {
            image_block_public_access_state: input
                .image_block_public_access_state
                .unwrap_or_else(|| "block-new-sharing".to_string()),
        })
    }

    pub async fn disable_image_block_public_access(
        &self,
    ) -> Result<ImageBlockPublicAccessOutput, Ec2Error> {
        Ok(ImageBlockPublicAccessOutput {
            image_block_public_access_state: UNBLOCKED.to_string(),
        })
    }

    pub async fn get_image_block_public_access_state(
        &self,
    ) -> Result<ImageBlockPublicAccessOutput, Ec2Error> {
        Ok(ImageBlockPublicAccessOutput {
            image_block_public_access_state: UNBLOCKED.to_string(),
        })
    }

    pub async fn get_instance_metadata_defaults(
        &self,
    ) -> Result<GetInstanceMetadataDefaultsOutput, Ec2Error> {
        Ok(GetInstanceMetadataDefaultsOutput {
            account_level: InstanceMetadataDefaults {
                http_tokens: "optional".to_string(),
                http_put_response_hop_limit: 1,
                http_endpoint: "enabled".to_string(),
                instance_metadata_tags: "disabled".to_string(),
            },
        })
    }

    pub async fn describe_account_attributes(
        &self,
        input: DescribeAccountAttributesInput,
    ) -> Result<DescribeAccountAttributesOutput, Ec2Error> {
        let names = input.attribute_names.filter(|n| !n.is_empty());
        let account_attributes = ACCOUNT_ATTRIBUTES
            .iter()
            .filter(|(name, _)| match &names {
                Some(names) => names.iter().any(|n| n == name),
                None => true,
            })
            .map(|(name, values)| AccountAttribute {
                attribute_name: name.to_string(),
                attribute_values: values
                    .iter()
                    .map(|value| AccountAttributeValue {
                        attribute_value: value.to_string(),
                    })
                    .collect(),
            })
            .collect();
        Ok(DescribeAccountAttributesOutput { account_attributes })
    }
}
