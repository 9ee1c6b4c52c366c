//! EC2 request/response shapes and stored document shapes.
//!
//! Operation inputs/outputs and per-resource config documents serialise
//! with Go-SDK-style PascalCase field names. The internal command payloads
//! (`ec2.cmd.<id>`, `ebs.*`) use camelCase; those live in [`instance`].

pub mod account;
pub mod image;
pub mod instance;
pub mod keypair;
pub mod snapshot;
pub mod volume;

use chrono::Utc;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Resource id prefixes.
pub const VOLUME_PREFIX: &str = "vol";
pub const SNAPSHOT_PREFIX: &str = "snap";
pub const IMAGE_PREFIX: &str = "ami";
pub const KEY_PAIR_PREFIX: &str = "key";
pub const INSTANCE_PREFIX: &str = "i";

/// A single resource tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

/// Tags requested at creation time, scoped to a resource type
/// (`volume`, `snapshot`, `key-pair`, …). Specifications for other
/// resource types are ignored by the receiving service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TagSpecification {
    pub resource_type: String,
    pub tags: Vec<Tag>,
}

/// Collects the tags of every specification matching `resource_type` into
/// an ordered key→value map.
pub fn tags_for_resource(
    specs: Option<&[TagSpecification]>,
    resource_type: &str,
) -> std::collections::BTreeMap<String, String> {
    let mut tags = std::collections::BTreeMap::new();
    for spec in specs.unwrap_or_default() {
        if spec.resource_type == resource_type {
            for tag in &spec.tags {
                tags.insert(tag.key.clone(), tag.value.clone());
            }
        }
    }
    tags
}

/// Converts a stored tag map back into the wire list form.
pub fn tag_list(tags: &std::collections::BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(key, value)| Tag {
            key: key.clone(),
            value: value.clone(),
        })
        .collect()
}

/// A resource id is well formed when it carries the right dashed prefix
/// and at least one id character after it. Both tiers apply the same rule.
pub fn is_well_formed_id(id: &str, prefix: &str) -> bool {
    match id.strip_prefix(prefix) {
        Some(rest) => rest.starts_with('-') && rest.len() > 1,
        None => false,
    }
}

/// Mints a fresh resource id: `<prefix>-<17 hex chars>`, the hex drawn
/// from the current epoch seconds followed by random bytes. The time salt
/// keeps ids from colliding across daemon restarts even if the RNG state
/// repeats.
pub fn new_resource_id(prefix: &str) -> String {
    let mut raw = [0u8; 9];
    raw[..4].copy_from_slice(&(Utc::now().timestamp() as u32).to_be_bytes());
    rand::rng().fill_bytes(&mut raw[4..]);
    let mut id = hex::encode(raw);
    id.truncate(17);
    format!("{prefix}-{id}")
}
