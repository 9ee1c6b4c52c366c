//! Daemon-side services and their bus registration.
//!
//! Each service owns one resource class; the router below holds them all
//! and answers the `ec2.<Operation>` subject family. Registration is one
//! line per operation, so the subject table and the service surface stay
//! in sight of each other.

pub mod account;
pub mod image;
pub mod index;
pub mod keypair;
pub mod snapshot;
pub mod volume;

use crate::backend::BlockBackend;
use crate::bus::rpc::{self, subject};
use crate::bus::{BusError, MessageBus};
use crate::config::DaemonConfig;
use crate::store::blob::BlobStore;
use crate::store::kv::KvStore;
use account::{AccountSettingsService, ACCOUNT_SETTINGS_BUCKET};
use image::{not_implemented, ImageService, InstanceResolver};
use index::{SnapshotIndex, VOLUME_SNAPSHOTS_BUCKET};
use keypair::{KeyGenerator, KeyPairService};
use log::warn;
use snapshot::SnapshotService;
use std::sync::Arc;
use volume::VolumeService;

/// Registers `$method` of `$svc` as the responder for `$subject`. The
/// `()` form is for operations whose wire request is an empty object.
macro_rules! route {
    ($bus:expr, $subject:expr, $svc:expr, $method:ident) => {{
        let svc = $svc.clone();
        $bus.subscribe(
            $subject,
            rpc::handler(move |input| {
                let svc = svc.clone();
                async move { svc.$method(input).await }
            }),
        )
        .await?;
    }};
    ($bus:expr, $subject:expr, $svc:expr, $method:ident, ()) => {{
        let svc = $svc.clone();
        $bus.subscribe(
            $subject,
            rpc::handler(move |_: crate::types::account::AccountRequest| {
                let svc = svc.clone();
                async move { svc.$method().await }
            }),
        )
        .await?;
    }};
}

/// Holds the five resource services and answers the bus for them.
pub struct ServiceRouter {
    pub volumes: Arc<VolumeService>,
    pub snapshots: Arc<SnapshotService>,
    pub images: Arc<ImageService>,
    pub key_pairs: Arc<KeyPairService>,
    pub account: Arc<AccountSettingsService>,
}

impl ServiceRouter {
    /// Builds the services over their stores. A KV store that is absent
    /// or cannot hand out buckets degrades the affected services (the
    /// account surface falls back to defaults, volume deletion refuses to
    /// run without its gate) instead of failing construction.
    pub async fn new(
        blob: Arc<dyn BlobStore>,
        kv: Option<Arc<dyn KvStore>>,
        bus: Arc<dyn MessageBus>,
        backend: Arc<dyn BlockBackend>,
        resolver: Arc<dyn InstanceResolver>,
        generator: Arc<dyn KeyGenerator>,
        config: Arc<DaemonConfig>,
    ) -> Self {
        let mut snapshot_index = None;
        let mut settings_bucket = None;
        if let Some(kv) = &kv {
            match kv.bucket(VOLUME_SNAPSHOTS_BUCKET).await {
                Ok(bucket) => snapshot_index = Some(Arc::new(SnapshotIndex::new(bucket))),
                Err(err) => warn!("snapshot index bucket unavailable: {err}"),
            }
            match kv.bucket(ACCOUNT_SETTINGS_BUCKET).await {
                Ok(bucket) => settings_bucket = Some(bucket),
                Err(err) => warn!("account settings bucket unavailable: {err}"),
            }
        }

        ServiceRouter {
            volumes: Arc::new(VolumeService::new(
                blob.clone(),
                bus.clone(),
                snapshot_index.clone(),
                config.clone(),
            )),
            snapshots: Arc::new(SnapshotService::new(
                blob.clone(),
                snapshot_index,
                config.clone(),
            )),
            images: Arc::new(ImageService::new(
                blob.clone(),
                bus,
                backend,
                resolver,
                config.clone(),
            )),
            key_pairs: Arc::new(KeyPairService::new(blob, generator, config)),
            account: Arc::new(AccountSettingsService::new(settings_bucket)),
        }
    }

    /// Installs a responder for every operation subject.
    pub async fn subscribe_all(&self, bus: &dyn MessageBus) -> Result<(), BusError> {
        // Volumes
        route!(bus, subject::CREATE_VOLUME, self.volumes, create_volume);
        route!(bus, subject::DESCRIBE_VOLUMES, self.volumes, describe_volumes);
        route!(bus, subject::MODIFY_VOLUME, self.volumes, modify_volume);
        route!(bus, subject::DELETE_VOLUME, self.volumes, delete_volume);
        route!(
            bus,
            subject::DESCRIBE_VOLUME_STATUS,
            self.volumes,
            describe_volume_status
        );

        // Snapshots
        route!(bus, subject::CREATE_SNAPSHOT, self.snapshots, create_snapshot);
        route!(
            bus,
            subject::DESCRIBE_SNAPSHOTS,
            self.snapshots,
            describe_snapshots
        );
        route!(bus, subject::DELETE_SNAPSHOT, self.snapshots, delete_snapshot);
        route!(bus, subject::COPY_SNAPSHOT, self.snapshots, copy_snapshot);

        // Images
        route!(bus, subject::DESCRIBE_IMAGES, self.images, describe_images);
        route!(bus, subject::CREATE_IMAGE, self.images, create_image);
        for (stub_subject, operation) in [
            (subject::COPY_IMAGE, "CopyImage"),
            (subject::REGISTER_IMAGE, "RegisterImage"),
            (subject::DEREGISTER_IMAGE, "DeregisterImage"),
            (subject::MODIFY_IMAGE_ATTRIBUTE, "ModifyImageAttribute"),
            (subject::RESET_IMAGE_ATTRIBUTE, "ResetImageAttribute"),
            (subject::DESCRIBE_IMAGE_ATTRIBUTE, "DescribeImageAttribute"),
        ] {
            bus.subscribe(
                stub_subject,
                rpc::handler(move |_: serde_json::Value| async move {
                    Err::<serde_json::Value, _>(not_implemented(operation))
                }),
            )
            .await?;
        }

        // Key pairs
        route!(bus, subject::CREATE_KEY_PAIR, self.key_pairs, create_key_pair);
        route!(bus, subject::IMPORT_KEY_PAIR, self.key_pairs, import_key_pair);
        route!(
            bus,
            subject::DESCRIBE_KEY_PAIRS,
            self.key_pairs,
            describe_key_pairs
        );
        route!(bus, subject::DELETE_KEY_PAIR, self.key_pairs, delete_key_pair);

        // Account settings
        route!(
            bus,
            subject::ENABLE_EBS_ENCRYPTION_BY_DEFAULT,
            self.account,
            enable_ebs_encryption_by_default,
            ()
        );
        route!(
            bus,
            subject::DISABLE_EBS_ENCRYPTION_BY_DEFAULT,
            self.account,
            disable_ebs_encryption_by_default,
            ()
        );
        route!(
            bus,
            subject::GET_EBS_ENCRYPTION_BY_DEFAULT,
            self.account,
            get_ebs_encryption_by_default,
            ()
        );
        route!(
            bus,
            subject::ENABLE_SERIAL_CONSOLE_ACCESS,
            self.account,
            enable_serial_console_access,
            ()
        );
        route!(
            bus,
            subject::DISABLE_SERIAL_CONSOLE_ACCESS,
            self.account,
            disable_serial_console_access,
            ()
        );
        route!(
            bus,
            subject::GET_SERIAL_CONSOLE_ACCESS_STATUS,
            self.account,
            get_serial_console_access_status,
            ()
        );
        route!(
            bus,
            subject::ENABLE_SNAPSHOT_BLOCK_PUBLIC_ACCESS,
            self.account,
            enable_snapshot_block_public_access
        );
        route!(
            bus,
            subject::DISABLE_SNAPSHOT_BLOCK_PUBLIC_ACCESS,
            self.account,
            disable_snapshot_block_public_access,
            ()
        );
        route!(
            bus,
            subject::GET_SNAPSHOT_BLOCK_PUBLIC_ACCESS_STATE,
            self.account,
            get_snapshot_block_public_access_state,
            ()
        );
        route!(
            bus,
            subject::ENABLE_IMAGE_BLOCK_PUBLIC_ACCESS,
            self.account,
            enable_image_block_public_access
        );
        route!(
            bus,
            subject::DISABLE_IMAGE_BLOCK_PUBLIC_ACCESS,
            self.account,
            disable_image_block_public_access,
            ()
        );
        route!(
            bus,
            subject::GET_IMAGE_BLOCK_PUBLIC_ACCESS_STATE,
            self.account,
            get_image_block_public_access_state,
            ()
        );
        route!(
            bus,
            subject::GET_INSTANCE_METADATA_DEFAULTS,
            self.account,
            get_instance_metadata_defaults,
            ()
        );
        route!(
            bus,
            subject::DESCRIBE_ACCOUNT_ATTRIBUTES,
            self.account,
            describe_account_attributes
        );

        Ok(())
    }
}
