//! EC2-compatible error taxonomy shared by both dispatch tiers.
//!
//! Every RPC reply on the bus is either a successful result or an error
//! envelope `{code, message?}`. The code set is closed: a reply whose code
//! is not one of the strings below is not treated as an error envelope at
//! all, it is decoded as a success payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of EC2 error codes emitted by the gateway and the daemon
/// services. Wire strings are exact; several use the dotted AWS form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ec2ErrorCode {
    ValidationError,
    InvalidParameterValue,
    MissingParameter,
    InvalidVolumeIdMalformed,
    InvalidSnapshotIdMalformed,
    InvalidInstanceIdMalformed,
    InvalidKeyPairFormat,
    InvalidKeyFormat,
    InvalidVolumeNotFound,
    InvalidSnapshotNotFound,
    InvalidInstanceIdNotFound,
    InvalidKeyPairNotFound,
    IncorrectState,
    VolumeInUse,
    InvalidSnapshotInUse,
    InvalidKeyPairDuplicate,
    InvalidAvailabilityZone,
    ServerInternal,
    InternalError,
}

impl Ec2ErrorCode {
    /// The exact string carried in the wire envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            Ec2ErrorCode::ValidationError => "ValidationError",
            Ec2ErrorCode::InvalidParameterValue => "InvalidParameterValue",
            Ec2ErrorCode::MissingParameter => "MissingParameter",
            Ec2ErrorCode::InvalidVolumeIdMalformed => "InvalidVolumeID.Malformed",
            Ec2ErrorCode::InvalidSnapshotIdMalformed => "InvalidSnapshotID.Malformed",
            Ec2ErrorCode::InvalidInstanceIdMalformed => "InvalidInstanceID.Malformed",
            Ec2ErrorCode::InvalidKeyPairFormat => "InvalidKeyPair.Format",
            Ec2ErrorCode::InvalidKeyFormat => "InvalidKey.Format",
            Ec2ErrorCode::InvalidVolumeNotFound => "InvalidVolume.NotFound",
            Ec2ErrorCode::InvalidSnapshotNotFound => "InvalidSnapshot.NotFound",
            Ec2ErrorCode::InvalidInstanceIdNotFound => "InvalidInstanceID.NotFound",
            Ec2ErrorCode::InvalidKeyPairNotFound => "InvalidKeyPair.NotFound",
            Ec2ErrorCode::IncorrectState => "IncorrectState",
            Ec2ErrorCode::VolumeInUse => "VolumeInUse",
            Ec2ErrorCode::InvalidSnapshotInUse => "InvalidSnapshot.InUse",
            Ec2ErrorCode::InvalidKeyPairDuplicate => "InvalidKeyPair.Duplicate",
            Ec2ErrorCode::InvalidAvailabilityZone => "InvalidAvailabilityZone",
            Ec2ErrorCode::ServerInternal => "ServerInternal",
            Ec2ErrorCode::InternalError => "InternalError",
        }
    }

    /// Parses a wire string back into a code. Returns `None` for anything
    /// outside the closed set, which is how ambiguous success payloads are
    /// kept out of the error path.
    pub fn parse(code: &str) -> Option<Ec2ErrorCode> {
        let code = match code {
            "ValidationError" => Ec2ErrorCode::ValidationError,
            "InvalidParameterValue" => Ec2ErrorCode::InvalidParameterValue,
            "MissingParameter" => Ec2ErrorCode::MissingParameter,
            "InvalidVolumeID.Malformed" => Ec2ErrorCode::InvalidVolumeIdMalformed,
            "InvalidSnapshotID.Malformed" => Ec2ErrorCode::InvalidSnapshotIdMalformed,
            "InvalidInstanceID.Malformed" => Ec2ErrorCode::InvalidInstanceIdMalformed,
            "InvalidKeyPair.Format" => Ec2ErrorCode::InvalidKeyPairFormat,
            "InvalidKey.Format" => Ec2ErrorCode::InvalidKeyFormat,
            "InvalidVolume.NotFound" => Ec2ErrorCode::InvalidVolumeNotFound,
            "InvalidSnapshot.NotFound" => Ec2ErrorCode::InvalidSnapshotNotFound,
            "InvalidInstanceID.NotFound" => Ec2ErrorCode::InvalidInstanceIdNotFound,
            "InvalidKeyPair.NotFound" => Ec2ErrorCode::InvalidKeyPairNotFound,
            "IncorrectState" => Ec2ErrorCode::IncorrectState,
            "VolumeInUse" => Ec2ErrorCode::VolumeInUse,
            "InvalidSnapshot.InUse" => Ec2ErrorCode::InvalidSnapshotInUse,
            "InvalidKeyPair.Duplicate" => Ec2ErrorCode::InvalidKeyPairDuplicate,
            "InvalidAvailabilityZone" => Ec2ErrorCode::InvalidAvailabilityZone,
            "ServerInternal" => Ec2ErrorCode::ServerInternal,
            "InternalError" => Ec2ErrorCode::InternalError,
            _ => return None,
        };
        Some(code)
    }
}

impl fmt::Display for Ec2ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An EC2 error value: one taxonomy code plus an optional human-readable
/// message. Services and the gateway return these directly; the bus layer
/// turns them into wire envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}{}", .message.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct Ec2Error {
    pub code: Ec2ErrorCode,
    pub message: Option<String>,
}

impl Ec2Error {
    pub fn new(code: Ec2ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    pub fn code(code: Ec2ErrorCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn server_internal(message: impl Into<String>) -> Self {
        Self::new(Ec2ErrorCode::ServerInternal, message)
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(Ec2ErrorCode::InvalidParameterValue, message)
    }

    pub fn missing_parameter(field: &str) -> Self {
        Self::new(
            Ec2ErrorCode::MissingParameter,
            format!("The request must contain the parameter {field}"),
        )
    }
}

/// Wire form of an error reply. `deny_unknown_fields` keeps success payloads
/// that merely contain a `code` field from masquerading as errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ErrorEnvelope {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<&Ec2Error> for ErrorEnvelope {
    fn from(err: &Ec2Error) -> Self {
        ErrorEnvelope {
            code: err.code.as_str().to_string(),
            message: err.message.clone(),
        }
    }
}

/// Serialises an error into its reply envelope.
pub fn encode_error(err: &Ec2Error) -> Vec<u8> {
    serde_json::to_vec(&ErrorEnvelope::from(err))
        .unwrap_or_else(|_| br#"{"code":"ServerInternal"}"#.to_vec())
}

/// Attempts to read a reply as an error envelope. Returns `None` when the
/// payload is not envelope-shaped or carries an unknown code; the caller
/// then decodes it as a success payload.
pub fn decode_error(payload: &[u8]) -> Option<Ec2Error> {
    let envelope: ErrorEnvelope = serde_json::from_slice(payload).ok()?;
    let code = Ec2ErrorCode::parse(&envelope.code)?;
    Some(Ec2Error {
        code,
        message: envelope.message,
    })
}
