//! Persisted feed entities.

use serde::{Deserialize, Serialize};

/// The record binding a derived keypair to a feed URL.
///
/// Stored as JSON in the entity store under the derived public key. The key
/// names match the records written by earlier deployments, so they are fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Hex private key derived from the bridge secret and the feed URL.
    #[serde(rename = "PrivateKey")]
    pub private_key: String,
    /// The concrete feed URL (not the site URL the caller registered).
    #[serde(rename = "URL")]
    pub feed_url: String,
    /// Optional display profile.
    #[serde(rename = "Meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<EntityMeta>,
}

/// Display profile attached to a registered feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntityMeta {
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// External URL the feed was registered with.
    #[serde(default)]
    pub url: String,
    /// Verified identifier (`user@domain`).
    #[serde(default)]
    pub nip05: String,
    /// Avatar image URL.
    #[serde(default)]
    pub picture: String,
    /// Banner image URL.
    #[serde(default)]
    pub banner: String,
}

impl Entity {
    /// Serializes the entity into the stored JSON form.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses an entity from its stored JSON form.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
