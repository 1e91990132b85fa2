//! Shared types for the newsrelay bridge.
//!
//! This crate holds the data model every other crate speaks: persisted feed
//! entities, the parsed-feed model handed over by the feed parsers, signed
//! relay events and subscription filters, and page metadata records.
//!
//! No crate in the workspace depends on anything *except* `newsrelay-types`
//! for cross-cutting type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

mod entity;
mod feed;
mod metadata;

pub use entity::{Entity, EntityMeta};
pub use feed::{Feed, FeedItem};
pub use metadata::{ArticleMeta, ImageInfo, MetadataRecord, VideoInfo};

/// Seconds since the Unix epoch.
///
/// A single signed 64-bit representation is used for every timestamp the
/// bridge handles, including the per-feed watermark.
pub type Timestamp = i64;

/// Event kinds produced by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum EventKind {
    /// Profile metadata (kind 0).
    ProfileMetadata,
    /// Short text note (kind 1).
    TextNote,
}

/// Returned when a numeric kind has no [`EventKind`] counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported event kind: {0}")]
pub struct UnsupportedKind(pub u32);

impl EventKind {
    /// Returns the numeric protocol code for this kind.
    pub fn as_u32(self) -> u32 {
        match self {
            Self::ProfileMetadata => 0,
            Self::TextNote => 1,
        }
    }

    /// Attempts to convert a numeric code to an `EventKind`.
    ///
    /// Returns `None` if the bridge never produces events of that kind.
    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::ProfileMetadata),
            1 => Some(Self::TextNote),
            _ => None,
        }
    }
}

impl From<EventKind> for u32 {
    fn from(kind: EventKind) -> Self {
        kind.as_u32()
    }
}

impl TryFrom<u32> for EventKind {
    type Error = UnsupportedKind;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_u32(code).ok_or(UnsupportedKind(code))
    }
}

/// A relay event.
///
/// `id` and `sig` are empty until the event has been signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Hex SHA-256 of the canonical serialization.
    pub id: String,
    /// Hex x-only public key of the author.
    pub pubkey: String,
    /// Creation time.
    pub created_at: Timestamp,
    /// Event kind.
    pub kind: EventKind,
    /// Tag lists.
    pub tags: Vec<Vec<String>>,
    /// Event body.
    pub content: String,
    /// Hex Schnorr signature over `id`.
    pub sig: String,
}

impl Event {
    /// Builds an unsigned event.
    pub fn unsigned(
        pubkey: impl Into<String>,
        created_at: Timestamp,
        kind: EventKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            pubkey: pubkey.into(),
            created_at,
            kind,
            tags: Vec::new(),
            content: content.into(),
            sig: String::new(),
        }
    }
}

/// A subscription filter as held by the relay host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Event ids the subscriber asked for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Author public keys (hex).
    #[serde(default)]
    pub authors: Vec<String>,
    /// Accepted kinds; `None` accepts every kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u32>>,
    /// Tag constraints, keyed by tag name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
    /// Inclusive lower time bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Timestamp>,
    /// Inclusive upper time bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<Timestamp>,
}

impl Filter {
    /// Returns `true` if the filter accepts events of `kind`.
    pub fn accepts_kind(&self, kind: EventKind) -> bool {
        match &self.kinds {
            None => true,
            Some(kinds) => kinds.contains(&kind.as_u32()),
        }
    }

    /// Returns `true` if `created_at` lies within `since..=until`.
    pub fn admits(&self, created_at: Timestamp) -> bool {
        if self.since.is_some_and(|since| created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| created_at > until) {
            return false;
        }
        true
    }

    /// Returns `true` if the filter selects by id or tag.
    ///
    /// Synthesized events carry no tags and have ids nobody can know in
    /// advance, so such filters never match anything from the bridge.
    pub fn selects_by_id_or_tag(&self) -> bool {
        self.ids.is_some() || !self.tags.is_empty()
    }
}
