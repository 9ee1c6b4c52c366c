//! Key-pair shapes. Each key is two blob objects: the raw public key at
//! `keys/<accountId>/<keyName>` and the metadata document at
//! `keys/<accountId>/<keyPairId>.json`.

use serde::{Deserialize, Serialize};

/// Key algorithms the platform stores. `rsa` and `ed25519` can be
/// generated; `ecdsa` only arrives through import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyType {
    #[default]
    #[serde(rename = "rsa")]
    Rsa,
    #[serde(rename = "ed25519")]
    Ed25519,
    #[serde(rename = "ecdsa")]
    Ecdsa,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "rsa",
            KeyType::Ed25519 => "ed25519",
            KeyType::Ecdsa => "ecdsa",
        }
    }
}

/// The stored key metadata document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KeyPairMetadata {
    pub key_pair_id: String,
    pub key_name: String,
    pub key_fingerprint: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateKeyPairInput {
    pub key_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CreateKeyPairOutput {
    pub key_pair_id: String,
    pub key_name: String,
    pub key_fingerprint: String,
    /// PEM private key, returned exactly once at creation.
    pub key_material: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImportKeyPairInput {
    pub key_name: String,
    /// OpenSSH public-key line: `<type> <base64> [comment]`.
    pub public_key_material: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ImportKeyPairOutput {
    pub key_pair_id: String,
    pub key_name: String,
    pub key_fingerprint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeKeyPairsInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pair_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KeyPairInfo {
    pub key_pair_id: String,
    pub key_name: String,
    pub key_fingerprint: String,
    pub key_type: KeyType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DescribeKeyPairsOutput {
    pub key_pairs: Vec<KeyPairInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteKeyPairInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_pair_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeleteKeyPairOutput {
    #[serde(rename = "Return")]
    pub success: bool,
}
