//! Feed retrieval and parsing.
//!
//! RSS and Atom documents are parsed with the `rss` and `atom_syndication`
//! crates; JSON Feed is small enough to deserialize directly. Every format
//! is mapped onto the shared [`Feed`] model.

use crate::http::{read_body_limited, MAX_FEED_BYTES};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsrelay_types::{Feed, FeedItem};
use serde::Deserialize;
use std::io::BufReader;
use thiserror::Error;

/// Errors produced while fetching or parsing a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to fetch feed: {0}")]
    Fetch(String),

    #[error("feed server returned status {0}")]
    Status(u16),

    #[error("failed to parse feed: {0}")]
    Parse(String),
}

/// Produces parsed feeds for URLs.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_feed(&self, url: &str) -> Result<Feed, FeedError>;
}

/// Fetches feeds over HTTP.
#[derive(Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    async fn fetch_feed(&self, url: &str) -> Result<Feed, FeedError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Fetch(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(FeedError::Status(resp.status().as_u16()));
        }

        let bytes = read_body_limited(resp, MAX_FEED_BYTES)
            .await
            .map_err(|e| FeedError::Fetch(e.to_string()))?;

        parse_feed(&bytes)
    }
}

/// Parses an RSS, Atom or JSON Feed document.
pub fn parse_feed(bytes: &[u8]) -> Result<Feed, FeedError> {
    let text = String::from_utf8_lossy(bytes);
    let head = text.trim_start_matches('\u{feff}').trim_start();

    if head.starts_with('{') {
        return parse_json_feed(bytes);
    }
    if head.contains("<feed") && !head.contains("<rss") {
        return parse_atom(bytes);
    }
    parse_rss(bytes).or_else(|rss_err| parse_atom(bytes).map_err(|_| rss_err))
}

fn parse_rss(bytes: &[u8]) -> Result<Feed, FeedError> {
    let channel = rss::Channel::read_from(BufReader::new(bytes))
        .map_err(|e| FeedError::Parse(e.to_string()))?;

    let items = channel
        .items()
        .iter()
        .map(|item| FeedItem {
            title: item.title().unwrap_or_default().to_string(),
            description: item.description().unwrap_or_default().to_string(),
            content: item.content().map(str::to_string),
            link: item.link().unwrap_or_default().to_string(),
            published: item.pub_date().and_then(parse_date),
            updated: item
                .dublin_core_ext()
                .and_then(|dc| dc.dates().first())
                .and_then(|d| parse_date(d)),
        })
        .collect();

    Ok(Feed {
        title: channel.title().to_string(),
        link: channel.link().to_string(),
        description: channel.description().to_string(),
        image_url: channel.image().map(|image| image.url().to_string()),
        published: channel
            .pub_date()
            .or(channel.last_build_date())
            .and_then(parse_date),
        items,
    })
}

fn parse_atom(bytes: &[u8]) -> Result<Feed, FeedError> {
    let feed = atom_syndication::Feed::read_from(BufReader::new(bytes))
        .map_err(|e| FeedError::Parse(e.to_string()))?;

    let items = feed
        .entries()
        .iter()
        .map(|entry| FeedItem {
            title: entry.title().as_str().to_string(),
            description: entry
                .summary()
                .map(|s| s.as_str().to_string())
                .unwrap_or_default(),
            content: entry
                .content()
                .and_then(|c| c.value())
                .map(str::to_string),
            link: alternate_link(entry.links()),
            published: entry.published().map(|d| d.to_utc()),
            updated: Some(entry.updated().to_utc()),
        })
        .collect();

    Ok(Feed {
        title: feed.title().as_str().to_string(),
        link: alternate_link(feed.links()),
        description: feed
            .subtitle()
            .map(|s| s.as_str().to_string())
            .unwrap_or_default(),
        image_url: feed.logo().or(feed.icon()).map(str::to_string),
        published: Some(feed.updated().to_utc()),
        items,
    })
}

fn alternate_link(links: &[atom_syndication::Link]) -> String {
    links
        .iter()
        .find(|link| link.rel() == "alternate")
        .or_else(|| links.first())
        .map(|link| link.href().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
struct JsonFeed {
    #[serde(default)]
    title: String,
    #[serde(default)]
    home_page_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    items: Vec<JsonFeedItem>,
}

#[derive(Debug, Deserialize)]
struct JsonFeedItem {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    content_html: Option<String>,
    #[serde(default)]
    content_text: Option<String>,
    #[serde(default)]
    date_published: Option<String>,
    #[serde(default)]
    date_modified: Option<String>,
}

fn parse_json_feed(bytes: &[u8]) -> Result<Feed, FeedError> {
    let feed: JsonFeed =
        serde_json::from_slice(bytes).map_err(|e| FeedError::Parse(e.to_string()))?;

    let items = feed
        .items
        .into_iter()
        .map(|item| FeedItem {
            title: item.title.unwrap_or_default(),
            description: item.summary.unwrap_or_default(),
            content: item.content_html.or(item.content_text),
            link: item.url.unwrap_or_default(),
            published: item.date_published.as_deref().and_then(parse_date),
            updated: item.date_modified.as_deref().and_then(parse_date),
        })
        .collect();

    Ok(Feed {
        title: feed.title,
        link: feed.home_page_url.unwrap_or_default(),
        description: feed.description.unwrap_or_default(),
        image_url: feed.icon,
        published: None,
        items,
    })
}

/// Parses the date formats found in the wild: RFC 2822 for RSS, RFC 3339
/// for everything else.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
        .map(|d| d.to_utc())
}
