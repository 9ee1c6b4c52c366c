//! Request validators shared by the gateway entry points.
//!
//! The gateway owns shape checks so the daemon never spends time on
//! malformed input; the daemon re-applies the same rules on its own
//! critical paths, and both tiers emit the same codes for the same
//! faults.

use crate::error::{Ec2Error, Ec2ErrorCode};
use crate::types::{
    is_well_formed_id, INSTANCE_PREFIX, KEY_PAIR_PREFIX, SNAPSHOT_PREFIX, VOLUME_PREFIX,
};

pub fn volume_id(id: &str) -> Result<(), Ec2Error> {
    if id.is_empty() {
        return Err(Ec2Error::missing_parameter("VolumeId"));
    }
    if !is_well_formed_id(id, VOLUME_PREFIX) {
        return Err(Ec2Error::new(
            Ec2ErrorCode::InvalidVolumeIdMalformed,
            format!("Invalid volume id: '{id}'"),
        ));
    }
    Ok(())
}

pub fn snapshot_id(id: &str) -> Result<(), Ec2Error> {
    if id.is_empty() {
        return Err(Ec2Error::missing_parameter("SnapshotId"));
    }
    if !is_well_formed_id(id, SNAPSHOT_PREFIX) {
        return Err(Ec2Error::new(
            Ec2ErrorCode::InvalidSnapshotIdMalformed,
            format!("Invalid snapshot id: '{id}'"),
        ));
    }
    Ok(())
}

pub fn instance_id(id: &str) -> Result<(), Ec2Error> {
    if id.is_empty() {
        return Err(Ec2Error::missing_parameter("InstanceId"));
    }
    if !is_well_formed_id(id, INSTANCE_PREFIX) {
        return Err(Ec2Error::new(
            Ec2ErrorCode::InvalidInstanceIdMalformed,
            format!("Invalid instance id: '{id}'"),
        ));
    }
    Ok(())
}

pub fn key_pair_id(id: &str) -> Result<(), Ec2Error> {
    if id.is_empty() {
        return Err(Ec2Error::missing_parameter("KeyPairId"));
    }
    if !is_well_formed_id(id, KEY_PAIR_PREFIX) {
        return Err(Ec2Error::new(
            Ec2ErrorCode::InvalidKeyPairFormat,
            format!("Invalid key pair id: '{id}'"),
        ));
    }
    Ok(())
}
