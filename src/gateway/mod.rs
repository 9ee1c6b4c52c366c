//! Gateway tier: stateless per-operation entry points.
//!
//! Each method validates the request shape, then issues exactly one typed
//! RPC to the operation's subject. The gateway never touches the blob or
//! KV stores; everything stateful happens behind the bus. Attach/detach
//! and live-capture traffic rides the per-instance subject families,
//! where an unanswered subject means the instance does not exist.

pub mod validate;

use crate::bus::rpc::{self, subject, timeouts};
use crate::bus::MessageBus;
use crate::error::Ec2Error;
use crate::types::account::{
    AccountRequest, DescribeAccountAttributesInput, DescribeAccountAttributesOutput,
    EbsEncryptionByDefaultOutput, GetInstanceMetadataDefaultsOutput, ImageBlockPublicAccessInput,
    ImageBlockPublicAccessOutput, SerialConsoleAccessOutput, SnapshotBlockPublicAccessInput,
    SnapshotBlockPublicAccessOutput,
};
use crate::types::image::{
    CreateImageInput, CreateImageOutput, DescribeImagesInput, DescribeImagesOutput,
};
use crate::types::instance::InstanceCommand;
use crate::types::keypair::{
    CreateKeyPairInput, CreateKeyPairOutput, DeleteKeyPairInput, DeleteKeyPairOutput,
    DescribeKeyPairsInput, DescribeKeyPairsOutput, ImportKeyPairInput, ImportKeyPairOutput,
};
use crate::types::snapshot::{
    CopySnapshotInput, CopySnapshotOutput, CreateSnapshotInput, DeleteSnapshotInput,
    DeleteSnapshotOutput, DescribeSnapshotsInput, DescribeSnapshotsOutput, Snapshot,
};
use crate::types::volume::{
    AttachVolumeInput, CreateVolumeInput, DeleteVolumeInput, DeleteVolumeOutput,
    DescribeVolumeStatusInput, DescribeVolumeStatusOutput, DescribeVolumesInput,
    DescribeVolumesOutput, DetachVolumeInput, ModifyVolumeInput, ModifyVolumeOutput, Volume,
    VolumeAttachment,
};
use std::sync::Arc;

pub struct Gateway {
    bus: Arc<dyn MessageBus>,
}

impl Gateway {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    // ---- Volumes ----

    pub async fn create_volume(&self, input: CreateVolumeInput) -> Result<Volume, Ec2Error> {
        if input.availability_zone.is_empty() {
            return Err(Ec2Error::missing_parameter("AvailabilityZone"));
        }
        if let Some(snapshot_id) = input.snapshot_id.as_deref().filter(|s| !s.is_empty()) {
            validate::snapshot_id(snapshot_id)?;
        }
        if let Some(size) = input.size {
            if size <= 0 {
                return Err(Ec2Error::invalid_parameter(format!(
                    "Volume size must be positive, got {size}"
                )));
            }
        }
        rpc::call(
            self.bus.as_ref(),
            subject::CREATE_VOLUME,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn describe_volumes(
        &self,
        input: DescribeVolumesInput,
    ) -> Result<DescribeVolumesOutput, Ec2Error> {
        for id in input.volume_ids.as_deref().unwrap_or_default() {
            validate::volume_id(id)?;
        }
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_VOLUMES,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn modify_volume(
        &self,
        input: ModifyVolumeInput,
    ) -> Result<ModifyVolumeOutput, Ec2Error> {
        validate::volume_id(&input.volume_id)?;
        rpc::call(
            self.bus.as_ref(),
            subject::MODIFY_VOLUME,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn delete_volume(
        &self,
        input: DeleteVolumeInput,
    ) -> Result<DeleteVolumeOutput, Ec2Error> {
        validate::volume_id(&input.volume_id)?;
        rpc::call(
            self.bus.as_ref(),
            subject::DELETE_VOLUME,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn describe_volume_status(
        &self,
        input: DescribeVolumeStatusInput,
    ) -> Result<DescribeVolumeStatusOutput, Ec2Error> {
        for id in input.volume_ids.as_deref().unwrap_or_default() {
            validate::volume_id(id)?;
        }
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_VOLUME_STATUS,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    /// Attachment is performed by the instance's owning daemon, so the
    /// request goes straight to its command channel.
    pub async fn attach_volume(
        &self,
        input: AttachVolumeInput,
    ) -> Result<VolumeAttachment, Ec2Error> {
        validate::volume_id(&input.volume_id)?;
        validate::instance_id(&input.instance_id)?;
        if input.device.is_empty() {
            return Err(Ec2Error::missing_parameter("Device"));
        }

        let instance_id = input.instance_id.clone();
        let command = InstanceCommand::attach(&instance_id, input);
        rpc::call_instance(
            self.bus.as_ref(),
            &subject::instance_command(&instance_id),
            &instance_id,
            &command,
            timeouts::INSTANCE_COMMAND,
        )
        .await
    }

    pub async fn detach_volume(
        &self,
        input: DetachVolumeInput,
    ) -> Result<VolumeAttachment, Ec2Error> {
        validate::volume_id(&input.volume_id)?;
        let instance_id = input
            .instance_id
            .clone()
            .ok_or_else(|| Ec2Error::missing_parameter("InstanceId"))?;
        validate::instance_id(&instance_id)?;

        let command = InstanceCommand::detach(&instance_id, input);
        rpc::call_instance(
            self.bus.as_ref(),
            &subject::instance_command(&instance_id),
            &instance_id,
            &command,
            timeouts::INSTANCE_COMMAND,
        )
        .await
    }

    // ---- Snapshots ----

    pub async fn create_snapshot(&self, input: CreateSnapshotInput) -> Result<Snapshot, Ec2Error> {
        validate::volume_id(&input.volume_id)?;
        rpc::call(
            self.bus.as_ref(),
            subject::CREATE_SNAPSHOT,
            &input,
            timeouts::SNAPSHOT_CREATE,
        )
        .await
    }

    pub async fn describe_snapshots(
        &self,
        input: DescribeSnapshotsInput,
    ) -> Result<DescribeSnapshotsOutput, Ec2Error> {
        for id in input.snapshot_ids.as_deref().unwrap_or_default() {
            validate::snapshot_id(id)?;
        }
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_SNAPSHOTS,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn delete_snapshot(
        &self,
        input: DeleteSnapshotInput,
    ) -> Result<DeleteSnapshotOutput, Ec2Error> {
        validate::snapshot_id(&input.snapshot_id)?;
        rpc::call(
            self.bus.as_ref(),
            subject::DELETE_SNAPSHOT,
            &input,
            timeouts::DELETE_SNAPSHOT,
        )
        .await
    }

    pub async fn copy_snapshot(
        &self,
        input: CopySnapshotInput,
    ) -> Result<CopySnapshotOutput, Ec2Error> {
        validate::snapshot_id(&input.source_snapshot_id)?;
        if input.source_region.is_empty() {
            return Err(Ec2Error::missing_parameter("SourceRegion"));
        }
        rpc::call(
            self.bus.as_ref(),
            subject::COPY_SNAPSHOT,
            &input,
            timeouts::SNAPSHOT_CREATE,
        )
        .await
    }

    // ---- Images ----

    pub async fn describe_images(
        &self,
        input: DescribeImagesInput,
    ) -> Result<DescribeImagesOutput, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_IMAGES,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn create_image(&self, input: CreateImageInput) -> Result<CreateImageOutput, Ec2Error> {
        if input.name.is_empty() {
            return Err(Ec2Error::missing_parameter("Name"));
        }
        validate::instance_id(&input.instance_id)?;
        rpc::call(
            self.bus.as_ref(),
            subject::CREATE_IMAGE,
            &input,
            timeouts::SNAPSHOT_CREATE,
        )
        .await
    }

    pub async fn copy_image(&self, input: serde_json::Value) -> Result<serde_json::Value, Ec2Error> {
        rpc::call(self.bus.as_ref(), subject::COPY_IMAGE, &input, timeouts::DEFAULT).await
    }

    pub async fn register_image(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::REGISTER_IMAGE,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn deregister_image(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::DEREGISTER_IMAGE,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn modify_image_attribute(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::MODIFY_IMAGE_ATTRIBUTE,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn reset_image_attribute(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::RESET_IMAGE_ATTRIBUTE,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn describe_image_attribute(
        &self,
        input: serde_json::Value,
    ) -> Result<serde_json::Value, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_IMAGE_ATTRIBUTE,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    // ---- Key pairs ----

    pub async fn create_key_pair(
        &self,
        input: CreateKeyPairInput,
    ) -> Result<CreateKeyPairOutput, Ec2Error> {
        if input.key_name.is_empty() {
            return Err(Ec2Error::missing_parameter("KeyName"));
        }
        rpc::call(
            self.bus.as_ref(),
            subject::CREATE_KEY_PAIR,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn import_key_pair(
        &self,
        input: ImportKeyPairInput,
    ) -> Result<ImportKeyPairOutput, Ec2Error> {
        if input.key_name.is_empty() {
            return Err(Ec2Error::missing_parameter("KeyName"));
        }
        if input.public_key_material.is_empty() {
            return Err(Ec2Error::missing_parameter("PublicKeyMaterial"));
        }
        rpc::call(
            self.bus.as_ref(),
            subject::IMPORT_KEY_PAIR,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn describe_key_pairs(
        &self,
        input: DescribeKeyPairsInput,
    ) -> Result<DescribeKeyPairsOutput, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_KEY_PAIRS,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn delete_key_pair(
        &self,
        input: DeleteKeyPairInput,
    ) -> Result<DeleteKeyPairOutput, Ec2Error> {
        let has_name = input.key_name.as_deref().is_some_and(|n| !n.is_empty());
        match input.key_pair_id.as_deref().filter(|i| !i.is_empty()) {
            Some(id) => validate::key_pair_id(id)?,
            None if !has_name => return Err(Ec2Error::missing_parameter("KeyName")),
            None => {}
        }
        rpc::call(
            self.bus.as_ref(),
            subject::DELETE_KEY_PAIR,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    // ---- Account settings ----

    pub async fn enable_ebs_encryption_by_default(
        &self,
    ) -> Result<EbsEncryptionByDefaultOutput, Ec2Error> {
        self.account_call(subject::ENABLE_EBS_ENCRYPTION_BY_DEFAULT).await
    }

    pub async fn disable_ebs_encryption_by_default(
        &self,
    ) -> Result<EbsEncryptionByDefaultOutput, Ec2Error> {
        self.account_call(subject::DISABLE_EBS_ENCRYPTION_BY_DEFAULT).await
    }

    pub async fn get_ebs_encryption_by_default(
        &self,
    ) -> Result<EbsEncryptionByDefaultOutput, Ec2Error> {
        self.account_call(subject::GET_EBS_ENCRYPTION_BY_DEFAULT).await
    }

    pub async fn enable_serial_console_access(
        &self,
    ) -> Result<SerialConsoleAccessOutput, Ec2Error> {
        self.account_call(subject::ENABLE_SERIAL_CONSOLE_ACCESS).await
    }

    pub async fn disable_serial_console_access(
        &self,
    ) -> Result<SerialConsoleAccessOutput, Ec2Error> {
        self.account_call(subject::DISABLE_SERIAL_CONSOLE_ACCESS).await
    }

    pub async fn get_serial_console_access_status(
        &self,
    ) -> Result<SerialConsoleAccessOutput, Ec2Error> {
        self.account_call(subject::GET_SERIAL_CONSOLE_ACCESS_STATUS).await
    }

    pub async fn enable_snapshot_block_public_access(
        &self,
        input: SnapshotBlockPublicAccessInput,
    ) -> Result<SnapshotBlockPublicAccessOutput, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::ENABLE_SNAPSHOT_BLOCK_PUBLIC_ACCESS,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn disable_snapshot_block_public_access(
        &self,
    ) -> Result<SnapshotBlockPublicAccessOutput, Ec2Error> {
        self.account_call(subject::DISABLE_SNAPSHOT_BLOCK_PUBLIC_ACCESS).await
    }

    pub async fn get_snapshot_block_public_access_state(
        &self,
    ) -> Result<SnapshotBlockPublicAccessOutput, Ec2Error> {
        self.account_call(subject::GET_SNAPSHOT_BLOCK_PUBLIC_ACCESS_STATE).await
    }

    pub async fn enable_image_block_public_access(
        &self,
        input: ImageBlockPublicAccessInput,
    ) -> Result<ImageBlockPublicAccessOutput, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::ENABLE_IMAGE_BLOCK_PUBLIC_ACCESS,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    pub async fn disable_image_block_public_access(
        &self,
    ) -> Result<ImageBlockPublicAccessOutput, Ec2Error> {
        self.account_call(subject::DISABLE_IMAGE_BLOCK_PUBLIC_ACCESS).await
    }

    pub async fn get_image_block_public_access_state(
        &self,
    ) -> Result<ImageBlockPublicAccessOutput, Ec2Error> {
        self.account_call(subject::GET_IMAGE_BLOCK_PUBLIC_ACCESS_STATE).await
    }

    pub async fn get_instance_metadata_defaults(
        &self,
    ) -> Result<GetInstanceMetadataDefaultsOutput, Ec2Error> {
        self.account_call(subject::GET_INSTANCE_METADATA_DEFAULTS).await
    }

    pub async fn describe_account_attributes(
        &self,
        input: DescribeAccountAttributesInput,
    ) -> Result<DescribeAccountAttributesOutput, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            subject::DESCRIBE_ACCOUNT_ATTRIBUTES,
            &input,
            timeouts::DEFAULT,
        )
        .await
    }

    async fn account_call<O: serde::de::DeserializeOwned>(
        &self,
        op_subject: &str,
    ) -> Result<O, Ec2Error> {
        rpc::call(
            self.bus.as_ref(),
            op_subject,
            &AccountRequest {},
            timeouts::DEFAULT,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBlockBackend;
    use crate::bus::MemoryBus;
    use crate::config::DaemonConfig;
    use crate::error::Ec2ErrorCode;
    use crate::services::image::{InstanceFacts, InstanceResolver};
    use crate::services::keypair::{GeneratedKeyPair, KeyGenerator};
    use crate::services::ServiceRouter;
    use crate::store::blob::MemoryBlobStore;
    use crate::store::kv::MemoryKvStore;
    use crate::types::keypair::KeyType;
    use async_trait::async_trait;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    struct NoInstances;

    #[async_trait]
    impl InstanceResolver for NoInstances {
        async fn resolve(&self, _: &str) -> Result<Option<InstanceFacts>, Ec2Error> {
            Ok(None)
        }
    }

    struct NoKeys;

    #[async_trait]
    impl KeyGenerator for NoKeys {
        async fn generate(&self, _: KeyType, _: &str) -> Result<GeneratedKeyPair, Ec2Error> {
            Err(Ec2Error::server_internal("no key generation in this test"))
        }
    }

    /// Gateway and daemon collapsed into one process over the in-memory
    /// fabric; the RPC seam between them stays real.
    async fn embedded() -> (Gateway, Arc<MemoryBus>) {
        let bus = Arc::new(MemoryBus::new());
        let router = ServiceRouter::new(
            Arc::new(MemoryBlobStore::new()),
            Some(Arc::new(MemoryKvStore::new())),
            bus.clone(),
            Arc::new(MemoryBlockBackend::new()),
            Arc::new(NoInstances),
            Arc::new(NoKeys),
            Arc::new(DaemonConfig::default()),
        )
        .await;
        router.subscribe_all(bus.as_ref()).await.unwrap();
        (Gateway::new(bus.clone()), bus)
    }

    fn volume_input(size: i64) -> CreateVolumeInput {
        CreateVolumeInput {
            availability_zone: "ap-southeast-2a".to_string(),
            size: Some(size),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn malformed_ids_never_reach_the_bus() {
        // No responders anywhere: a transport attempt would surface as
        // ServerInternal, so a taxonomy code proves the gateway rejected
        // the request itself.
        let gateway = Gateway::new(Arc::new(MemoryBus::new()));

        let err = gateway
            .describe_volumes(DescribeVolumesInput {
                volume_ids: Some(vec!["volume-1".to_string()]),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidVolumeIdMalformed);

        let err = gateway
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: "snap-".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidSnapshotIdMalformed);

        let err = gateway
            .create_image(CreateImageInput {
                instance_id: "vm-1".to_string(),
                name: "x".to_string(),
                description: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidInstanceIdMalformed);

        let err = gateway
            .delete_key_pair(DeleteKeyPairInput::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::MissingParameter);
    }

    #[tokio::test]
    async fn snapshot_protects_its_source_volume() {
        let (gateway, _bus) = embedded().await;

        let volume = gateway.create_volume(volume_input(10)).await.unwrap();
        let snapshot = gateway
            .create_snapshot(CreateSnapshotInput {
                volume_id: volume.volume_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();

        let err = gateway
            .delete_volume(DeleteVolumeInput {
                volume_id: volume.volume_id.clone(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::VolumeInUse);

        gateway
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: snapshot.snapshot_id.clone(),
            })
            .await
            .unwrap();

        let output = gateway
            .delete_volume(DeleteVolumeInput {
                volume_id: volume.volume_id.clone(),
            })
            .await
            .unwrap();
        assert!(output.success);
    }

    #[tokio::test]
    async fn snapshot_lifecycle_round_trips_through_the_seam() {
        let (gateway, _bus) = embedded().await;

        let volume = gateway.create_volume(volume_input(100)).await.unwrap();
        let snapshot = gateway
            .create_snapshot(CreateSnapshotInput {
                volume_id: volume.volume_id.clone(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(snapshot.snapshot_id.starts_with("snap-"));
        assert_eq!(snapshot.progress, "100%");
        assert_eq!(snapshot.volume_size, 100);

        let described = gateway
            .describe_snapshots(DescribeSnapshotsInput {
                snapshot_ids: Some(vec![snapshot.snapshot_id.clone()]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(described.snapshots.len(), 1);

        gateway
            .delete_snapshot(DeleteSnapshotInput {
                snapshot_id: snapshot.snapshot_id.clone(),
            })
            .await
            .unwrap();

        let described = gateway
            .describe_snapshots(DescribeSnapshotsInput {
                snapshot_ids: Some(vec![snapshot.snapshot_id]),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(described.snapshots.is_empty());
    }

    #[tokio::test]
    async fn modify_volume_is_grow_only_end_to_end() {
        let (gateway, _bus) = embedded().await;
        let volume = gateway.create_volume(volume_input(10)).await.unwrap();

        for target in [5, 10] {
            let err = gateway
                .modify_volume(ModifyVolumeInput {
                    volume_id: volume.volume_id.clone(),
                    size: Some(target),
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert_eq!(err.code, Ec2ErrorCode::InvalidParameterValue);
        }

        let output = gateway
            .modify_volume(ModifyVolumeInput {
                volume_id: volume.volume_id.clone(),
                size: Some(20),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(output.volume_modification.original_size, 10);
        assert_eq!(output.volume_modification.target_size, 20);

        let described = gateway
            .describe_volumes(DescribeVolumesInput {
                volume_ids: Some(vec![volume.volume_id.clone()]),
            })
            .await
            .unwrap();
        assert_eq!(described.volumes[0].size, 20);
    }

    #[tokio::test]
    async fn attach_needs_a_live_instance() {
        let (gateway, bus) = embedded().await;

        let err = gateway
            .attach_volume(AttachVolumeInput {
                volume_id: "vol-c00001".to_string(),
                instance_id: "i-ghost001".to_string(),
                device: "/dev/sdf".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidInstanceIdNotFound);

        // With a daemon answering the command channel the attachment
        // comes back from the instance side.
        bus.subscribe(
            &subject::instance_command("i-alive001"),
            rpc::handler(|command: InstanceCommand| async move {
                let data = command.attach_volume_data.unwrap_or_default();
                Ok::<_, Ec2Error>(VolumeAttachment {
                    volume_id: data.volume_id,
                    instance_id: command.id,
                    device: data.device,
                    state: "attached".to_string(),
                    attach_time: None,
                    delete_on_termination: false,
                })
            }),
        )
        .await
        .unwrap();

        let attachment = gateway
            .attach_volume(AttachVolumeInput {
                volume_id: "vol-c00001".to_string(),
                instance_id: "i-alive001".to_string(),
                device: "/dev/sdf".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(attachment.state, "attached");
        assert_eq!(attachment.instance_id, "i-alive001");
    }

    #[tokio::test]
    async fn account_toggle_persists_across_calls() {
        let (gateway, _bus) = embedded().await;

        assert!(
            gateway
                .enable_ebs_encryption_by_default()
                .await
                .unwrap()
                .ebs_encryption_by_default
        );
        assert!(
            gateway
                .get_ebs_encryption_by_default()
                .await
                .unwrap()
                .ebs_encryption_by_default
        );
        assert!(
            !gateway
                .disable_ebs_encryption_by_default()
                .await
                .unwrap()
                .ebs_encryption_by_default
        );
        assert!(
            !gateway
                .get_ebs_encryption_by_default()
                .await
                .unwrap()
                .ebs_encryption_by_default
        );
    }

    #[tokio::test]
    async fn key_import_flow_validates_end_to_end() {
        let (gateway, _bus) = embedded().await;
        let blob: Vec<u8> = (10u8..61).collect();
        let material = format!("ssh-ed25519 {}", STANDARD.encode(blob));

        let imported = gateway
            .import_key_pair(ImportKeyPairInput {
                key_name: "k1".to_string(),
                public_key_material: material.clone(),
            })
            .await
            .unwrap();
        assert!(imported.key_pair_id.starts_with("key-"));
        assert!(imported.key_fingerprint.starts_with("SHA256:"));

        let err = gateway
            .import_key_pair(ImportKeyPairInput {
                key_name: "k1".to_string(),
                public_key_material: material,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidKeyPairDuplicate);

        let err = gateway
            .import_key_pair(ImportKeyPairInput {
                key_name: "k2".to_string(),
                public_key_material: "ssh-dss xxx".to_string(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidKeyFormat);
    }

    #[tokio::test]
    async fn unknown_account_attributes_come_back_empty_not_failed() {
        let (gateway, _bus) = embedded().await;
        let output = gateway
            .describe_account_attributes(DescribeAccountAttributesInput {
                attribute_names: Some(vec!["never-heard-of-it".to_string()]),
            })
            .await
            .unwrap();
        assert!(output.account_attributes.is_empty());

        let output = gateway
            .describe_account_attributes(DescribeAccountAttributesInput::default())
            .await
            .unwrap();
        assert_eq!(output.account_attributes.len(), 6);
    }
}
