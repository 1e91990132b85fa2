//! Parsed-feed model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed syndication document (RSS, Atom or JSON Feed).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub title: String,
    pub link: String,
    pub description: String,
    pub image_url: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub items: Vec<FeedItem>,
}

/// One entry of a feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    /// Summary text; may contain markup.
    pub description: String,
    /// Full body. Dropped before a feed enters the cache.
    pub content: Option<String>,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

impl Feed {
    /// Drops the full body of every item, keeping only what event synthesis
    /// needs.
    pub fn strip_content(&mut self) {
        for item in &mut self.items {
            item.content = None;
        }
    }
}
