//! Typed RPC on top of the raw bus: canonical-JSON marshal, dispatch,
//! reply decode against the error-envelope rules, and the daemon-side
//! handler adapter.

use crate::bus::{BusError, BusHandler, MessageBus};
use crate::error::{self, Ec2Error, Ec2ErrorCode};
use futures::future::BoxFuture;
use log::warn;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Bus subjects. EC2 operations map to `ec2.<OperationName>`; the
/// per-instance families are built from the resource id.
pub mod subject {
    pub const CREATE_VOLUME: &str = "ec2.CreateVolume";
    pub const DESCRIBE_VOLUMES: &str = "ec2.DescribeVolumes";
    pub const MODIFY_VOLUME: &str = "ec2.ModifyVolume";
    pub const DELETE_VOLUME: &str = "ec2.DeleteVolume";
    pub const DESCRIBE_VOLUME_STATUS: &str = "ec2.DescribeVolumeStatus";

    pub const CREATE_SNAPSHOT: &str = "ec2.CreateSnapshot";
    pub const DESCRIBE_SNAPSHOTS: &str = "ec2.DescribeSnapshots";
    pub const DELETE_SNAPSHOT: &str = "ec2.DeleteSnapshot";
    pub const COPY_SNAPSHOT: &str = "ec2.CopySnapshot";

    pub const DESCRIBE_IMAGES: &str = "ec2.DescribeImages";
    pub const CREATE_IMAGE: &str = "ec2.CreateImage";
    pub const COPY_IMAGE: &str = "ec2.CopyImage";
    pub const REGISTER_IMAGE: &str = "ec2.RegisterImage";
    pub const DEREGISTER_IMAGE: &str = "ec2.DeregisterImage";
    pub const MODIFY_IMAGE_ATTRIBUTE: &str = "ec2.ModifyImageAttribute";
    pub const RESET_IMAGE_ATTRIBUTE: &str = "ec2.ResetImageAttribute";
    pub const DESCRIBE_IMAGE_ATTRIBUTE: &str = "ec2.DescribeImageAttribute";

    pub const CREATE_KEY_PAIR: &str = "ec2.CreateKeyPair";
    pub const IMPORT_KEY_PAIR: &str = "ec2.ImportKeyPair";
    pub const DESCRIBE_KEY_PAIRS: &str = "ec2.DescribeKeyPairs";
    pub const DELETE_KEY_PAIR: &str = "ec2.DeleteKeyPair";

    pub const ENABLE_EBS_ENCRYPTION_BY_DEFAULT: &str = "ec2.EnableEbsEncryptionByDefault";
    pub const DISABLE_EBS_ENCRYPTION_BY_DEFAULT: &str = "ec2.DisableEbsEncryptionByDefault";
    pub const GET_EBS_ENCRYPTION_BY_DEFAULT: &str = "ec2.GetEbsEncryptionByDefault";
    pub const ENABLE_SERIAL_CONSOLE_ACCESS: &str = "ec2.EnableSerialConsoleAccess";
    pub const DISABLE_SERIAL_CONSOLE_ACCESS: &str = "ec2.DisableSerialConsoleAccess";
    pub const GET_SERIAL_CONSOLE_ACCESS_STATUS: &str = "ec2.GetSerialConsoleAccessStatus";
    pub const ENABLE_SNAPSHOT_BLOCK_PUBLIC_ACCESS: &str = "ec2.EnableSnapshotBlockPublicAccess";
    pub const DISABLE_SNAPSHOT_BLOCK_PUBLIC_ACCESS: &str = "ec2.DisableSnapshotBlockPublicAccess";
    pub const GET_SNAPSHOT_BLOCK_PUBLIC_ACCESS_STATE: &str = "ec2.GetSnapshotBlockPublicAccessState";
    pub const ENABLE_IMAGE_BLOCK_PUBLIC_ACCESS: &str = "ec2.EnableImageBlockPublicAccess";
    pub const DISABLE_IMAGE_BLOCK_PUBLIC_ACCESS: &str = "ec2.DisableImageBlockPublicAccess";
    pub const GET_IMAGE_BLOCK_PUBLIC_ACCESS_STATE: &str = "ec2.GetImageBlockPublicAccessState";
    pub const GET_INSTANCE_METADATA_DEFAULTS: &str = "ec2.GetInstanceMetadataDefaults";
    pub const DESCRIBE_ACCOUNT_ATTRIBUTES: &str = "ec2.DescribeAccountAttributes";

    pub const EBS_DELETE: &str = "ebs.delete";

    /// Command channel of a running instance's owning daemon.
    pub fn instance_command(instance_id: &str) -> String {
        format!("ec2.cmd.{instance_id}")
    }

    /// Live-snapshot channel of the daemon serving an attached volume.
    pub fn ebs_snapshot(volume_id: &str) -> String {
        format!("ebs.snapshot.{volume_id}")
    }
}

/// Per-operation request timeouts.
pub mod timeouts {
    use std::time::Duration;

    /// Reads and metadata operations.
    pub const DEFAULT: Duration = Duration::from_secs(30);
    /// Snapshot deletion walks every volume document.
    pub const DELETE_SNAPSHOT: Duration = Duration::from_secs(60);
    /// Snapshot capture and copy move volume-sized data.
    pub const SNAPSHOT_CREATE: Duration = Duration::from_secs(120);
    /// Attach/detach and live-snapshot commands to a single instance.
    pub const INSTANCE_COMMAND: Duration = Duration::from_secs(30);
}

fn decode_reply<O: DeserializeOwned>(subject: &str, payload: &[u8]) -> Result<O, Ec2Error> {
    if let Some(err) = error::decode_error(payload) {
        return Err(err);
    }
    serde_json::from_slice(payload).map_err(|e| {
        Ec2Error::server_internal(format!("failed to decode reply from {subject}: {e}"))
    })
}

/// Marshal `input`, dispatch on `subject`, decode the reply as either an
/// error envelope or `O`. Transport failures (including an unanswered
/// subject) surface as `ServerInternal`.
pub async fn call<I, O>(
    bus: &dyn MessageBus,
    subject: &str,
    input: &I,
    timeout: Duration,
) -> Result<O, Ec2Error>
where
    I: Serialize + ?Sized,
    O: DeserializeOwned,
{
    let reply = dispatch(bus, subject, input, timeout).await.map_err(|err| {
        warn!("rpc on {subject} failed: {err}");
        Ec2Error::server_internal(format!("request on {subject} failed: {err}"))
    })?;
    decode_reply(subject, &reply)
}

/// Like [`call`], for the per-instance subject families: an unanswered
/// subject means the target instance does not exist.
pub async fn call_instance<I, O>(
    bus: &dyn MessageBus,
    subject: &str,
    instance_id: &str,
    input: &I,
    timeout: Duration,
) -> Result<O, Ec2Error>
where
    I: Serialize + ?Sized,
    O: DeserializeOwned,
{
    let reply = match dispatch(bus, subject, input, timeout).await {
        Ok(reply) => reply,
        Err(BusError::NoResponders(_)) => {
            return Err(Ec2Error::new(
                Ec2ErrorCode::InvalidInstanceIdNotFound,
                format!("The instance ID '{instance_id}' does not exist"),
            ));
        }
        Err(err) => {
            warn!("rpc on {subject} failed: {err}");
            return Err(Ec2Error::server_internal(format!(
                "request on {subject} failed: {err}"
            )));
        }
    };
    decode_reply(subject, &reply)
}

async fn dispatch<I>(
    bus: &dyn MessageBus,
    subject: &str,
    input: &I,
    timeout: Duration,
) -> Result<Vec<u8>, BusError>
where
    I: Serialize + ?Sized,
{
    let payload = serde_json::to_vec(input)
        .map_err(|e| BusError::Transport(format!("failed to encode request: {e}")))?;
    bus.request(subject, payload, timeout).await
}

/// Encodes a service result as a reply payload: the value itself on
/// success, the error envelope otherwise.
pub fn encode_reply<O: Serialize>(result: Result<O, Ec2Error>) -> Vec<u8> {
    match result {
        Ok(value) => serde_json::to_vec(&value).unwrap_or_else(|e| {
            error::encode_error(&Ec2Error::server_internal(format!(
                "failed to encode reply: {e}"
            )))
        }),
        Err(err) => error::encode_error(&err),
    }
}

/// Wraps a typed service method as a raw bus responder: decode the request,
/// run the method, envelope the result.
pub fn handler<I, O, F, Fut>(f: F) -> BusHandler
where
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, Ec2Error>> + Send + 'static,
{
    Arc::new(
        move |payload: Vec<u8>| -> BoxFuture<'static, Vec<u8>> {
            match serde_json::from_slice::<I>(&payload) {
                Ok(input) => {
                    let fut = f(input);
                    Box::pin(async move { encode_reply(fut.await) })
                }
                Err(err) => {
                    let reply = error::encode_error(&Ec2Error::server_internal(format!(
                        "failed to decode request: {err}"
                    )));
                    Box::pin(async move { reply })
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryBus;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, Debug)]
    struct Ping {
        count: u32,
    }

    #[tokio::test]
    async fn call_round_trips_typed_payloads() {
        let bus = MemoryBus::new();
        bus.subscribe(
            "ec2.Ping",
            handler(|input: Ping| async move {
                Ok::<_, Ec2Error>(Ping {
                    count: input.count + 1,
                })
            }),
        )
        .await
        .unwrap();

        let reply: Ping = call(&bus, "ec2.Ping", &Ping { count: 1 }, timeouts::DEFAULT)
            .await
            .unwrap();
        assert_eq!(reply.count, 2);
    }

    #[tokio::test]
    async fn service_errors_come_back_as_taxonomy_codes() {
        let bus = MemoryBus::new();
        bus.subscribe(
            "ec2.Ping",
            handler(|_: Ping| async move {
                Err::<Ping, _>(Ec2Error::code(Ec2ErrorCode::VolumeInUse))
            }),
        )
        .await
        .unwrap();

        let err = call::<_, Ping>(&bus, "ec2.Ping", &Ping { count: 0 }, timeouts::DEFAULT)
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::VolumeInUse);
    }

    #[tokio::test]
    async fn no_responders_on_instance_subject_is_instance_not_found() {
        let bus = MemoryBus::new();
        let subject = subject::instance_command("i-ghost");
        let err = call_instance::<_, Ping>(
            &bus,
            &subject,
            "i-ghost",
            &Ping { count: 0 },
            timeouts::INSTANCE_COMMAND,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::InvalidInstanceIdNotFound);
    }

    #[tokio::test]
    async fn no_responders_on_service_subject_is_server_internal() {
        let bus = MemoryBus::new();
        let err = call::<_, Ping>(&bus, "ec2.Ping", &Ping { count: 0 }, timeouts::DEFAULT)
            .await
            .unwrap_err();
        assert_eq!(err.code, Ec2ErrorCode::ServerInternal);
    }
}
