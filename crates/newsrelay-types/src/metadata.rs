//! Page metadata records produced by the metadata fetcher.
//!
//! The JSON shape (including the `articleMeta` key and the omitted empty
//! fields) is what existing clients of the metadata endpoint consume.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Structured metadata extracted from an HTML page head.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Canonical URL of the page.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub image: ImageInfo,
    #[serde(default)]
    pub video: VideoInfo,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(rename = "articleMeta", default)]
    pub article: ArticleMeta,
}

/// Open Graph image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub width: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub height: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub alt: String,
}

/// Open Graph video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoInfo {
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub width: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub height: u32,
}

/// Open Graph article properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub publisher: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_omitted() {
        let record = MetadataRecord {
            title: "Hello".into(),
            image: ImageInfo {
                url: "https://example.com/a.png".into(),
                width: 1200,
                ..ImageInfo::default()
            },
            ..MetadataRecord::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["title"], "Hello");
        assert!(json.get("description").is_none());
        assert!(json.get("keywords").is_none());
        assert_eq!(json["image"]["width"], 1200);
        assert!(json["image"].get("height").is_none());
        assert!(json["articleMeta"].get("published").is_none());
    }

    #[test]
    fn article_times_serialize_as_rfc3339() {
        let published = DateTime::parse_from_rfc3339("2024-03-01T10:00:00+02:00").unwrap();
        let record = MetadataRecord {
            article: ArticleMeta {
                published: Some(published),
                ..ArticleMeta::default()
            },
            ..MetadataRecord::default()
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["articleMeta"]["published"], "2024-03-01T10:00:00+02:00");
    }
}
