//! Page metadata extraction.
//!
//! A page is fetched in two steps: a `HEAD` request gates on the content
//! type so binary resources are never downloaded, then a `GET` retrieves the
//! document. Only `<head>` is inspected.

use crate::http::{
    content_type, normalize_url, read_body_limited, BROWSER_ACCEPT_LANGUAGE,
    BROWSER_CACHE_CONTROL, BROWSER_USER_AGENT, MAX_PAGE_BYTES,
};
use chrono::{DateTime, FixedOffset};
use newsrelay_types::{ArticleMeta, ImageInfo, MetadataRecord, VideoInfo};
use reqwest::header;
use reqwest::StatusCode;
use scraper::{Html, Selector};
use thiserror::Error;

const HTML_CONTENT_TYPES: [&str; 3] = ["text/html", "application/xhtml+xml", "application/xml"];

const HEAD_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;";
const GET_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("request failed: {0}")]
    Request(String),

    /// The target is not an HTML document.
    #[error("invalid format")]
    InvalidFormat,

    #[error("status code {0} error")]
    Status(u16),
}

impl MetadataError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status(404))
    }
}

/// Fetches `url` and extracts its metadata.
pub async fn fetch_metadata(
    client: &reqwest::Client,
    url: &str,
) -> Result<MetadataRecord, MetadataError> {
    let url = normalize_url(url);

    let head = client
        .head(&url)
        .header(header::USER_AGENT, BROWSER_USER_AGENT)
        .header(header::ACCEPT, HEAD_ACCEPT)
        .header(header::ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
        .header(header::CACHE_CONTROL, BROWSER_CACHE_CONTROL)
        .send()
        .await
        .map_err(|e| MetadataError::Request(e.to_string()))?;

    if head.status() == StatusCode::NOT_FOUND {
        return Err(MetadataError::Status(404));
    }
    if !head.status().is_success() {
        return Err(MetadataError::InvalidFormat);
    }
    let ct = content_type(head.headers());
    if !HTML_CONTENT_TYPES.iter().any(|typ| ct.contains(typ)) {
        tracing::debug!(url = %url, content_type = %ct, "not an html document");
        return Err(MetadataError::InvalidFormat);
    }

    let resp = client
        .get(&url)
        .header(header::USER_AGENT, BROWSER_USER_AGENT)
        .header(header::ACCEPT, GET_ACCEPT)
        .header(header::ACCEPT_LANGUAGE, BROWSER_ACCEPT_LANGUAGE)
        .header(header::CACHE_CONTROL, BROWSER_CACHE_CONTROL)
        .send()
        .await
        .map_err(|e| MetadataError::Request(e.to_string()))?;

    if resp.status() != StatusCode::OK {
        return Err(MetadataError::Status(resp.status().as_u16()));
    }

    let body = read_body_limited(resp, MAX_PAGE_BYTES)
        .await
        .map_err(|e| MetadataError::Request(e.to_string()))?;

    Ok(extract_metadata(&String::from_utf8_lossy(&body)))
}

/// Extracts metadata from an HTML document.
pub fn extract_metadata(html: &str) -> MetadataRecord {
    let head = PageHead(Html::parse_document(html));

    MetadataRecord {
        url: head
            .meta_tag("og:url")
            .or_else(|| head.select_attr("head link[rel='canonical']", "href"))
            .unwrap_or_default(),
        title: head
            .meta_tag("og:title")
            .or_else(|| head.title())
            .unwrap_or_default(),
        description: head
            .meta_tag("og:description")
            .or_else(|| head.meta_tag("description"))
            .unwrap_or_default(),
        keywords: head.list("keywords"),
        image: ImageInfo {
            url: head.meta_tag("og:image").unwrap_or_default(),
            width: head.number("og:image:width"),
            height: head.number("og:image:height"),
            alt: head.meta_tag("og:image:alt").unwrap_or_default(),
        },
        video: VideoInfo {
            url: head.meta_tag("og:video").unwrap_or_default(),
            width: head.number("og:video:width"),
            height: head.number("og:video:height"),
        },
        article: ArticleMeta {
            author: head.meta_tag("article:author").unwrap_or_default(),
            publisher: head.meta_tag("article:publisher").unwrap_or_default(),
            section: head.meta_tag("article:section").unwrap_or_default(),
            published: head.time("article:published_time"),
            modified: head.time("article:modified_time"),
            tags: head.list("article:tag"),
        },
    }
}

struct PageHead(Html);

impl PageHead {
    /// `property` matches win over `name` matches; within each, the first
    /// element in document order wins.
    fn meta_tag(&self, tag: &str) -> Option<String> {
        self.select_attr(&format!("head meta[property='{tag}']"), "content")
            .or_else(|| self.select_attr(&format!("head meta[name='{tag}']"), "content"))
    }

    fn select_attr(&self, selector: &str, attr: &str) -> Option<String> {
        let selector = Selector::parse(selector).ok()?;
        self.0
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr(attr))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn title(&self) -> Option<String> {
        let selector = Selector::parse("head title").ok()?;
        self.0
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
    }

    fn list(&self, tag: &str) -> Vec<String> {
        self.meta_tag(tag)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn number(&self, tag: &str) -> u32 {
        self.meta_tag(tag)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or_default()
    }

    fn time(&self, tag: &str) -> Option<DateTime<FixedOffset>> {
        self.meta_tag(tag)
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_open_graph_and_article_fields() {
        let html = r#"
            <html>
            <head>
                <title>Fallback</title>
                <meta property="og:title" content="Test Page">
                <meta property="og:url" content="https://example.com/canonical">
                <meta property="og:description" content="A test description">
                <meta property="og:image" content="https://example.com/image.jpg">
                <meta property="og:image:width" content="1200">
                <meta property="og:image:height" content="630">
                <meta property="og:image:alt" content="Alt text">
                <meta property="og:video" content="https://example.com/v.mp4">
                <meta name="keywords" content="rust, feeds, ,relay">
                <meta property="article:author" content="Jane">
                <meta property="article:section" content="Tech">
                <meta property="article:published_time" content="2024-03-01T10:00:00+02:00">
                <meta property="article:modified_time" content="not a date">
                <meta property="article:tag" content="a,b">
            </head>
            <body></body>
            </html>
        "#;

        let record = extract_metadata(html);
        assert_eq!(record.title, "Test Page");
        assert_eq!(record.url, "https://example.com/canonical");
        assert_eq!(record.description, "A test description");
        assert_eq!(record.image.url, "https://example.com/image.jpg");
        assert_eq!(record.image.width, 1200);
        assert_eq!(record.image.height, 630);
        assert_eq!(record.image.alt, "Alt text");
        assert_eq!(record.video.url, "https://example.com/v.mp4");
        assert_eq!(record.video.width, 0);
        assert_eq!(record.keywords, vec!["rust", "feeds", "relay"]);
        assert_eq!(record.article.author, "Jane");
        assert_eq!(record.article.section, "Tech");
        assert_eq!(
            record.article.published.map(|t| t.timestamp()),
            Some(1_709_280_000)
        );
        assert!(record.article.modified.is_none());
        assert_eq!(record.article.tags, vec!["a", "b"]);
    }

    #[test]
    fn falls_back_to_title_canonical_and_description() {
        let html = r#"
            <html>
            <head>
                <title> Fallback Title </title>
                <link rel="canonical" href="https://example.com/c">
                <meta name="description" content="Meta description fallback">
            </head>
            </html>
        "#;

        let record = extract_metadata(html);
        assert_eq!(record.title, "Fallback Title");
        assert_eq!(record.url, "https://example.com/c");
        assert_eq!(record.description, "Meta description fallback");
        assert!(record.keywords.is_empty());
    }

    #[test]
    fn property_match_beats_earlier_name_match() {
        let html = r#"
            <html>
            <head>
                <meta name="og:title" content="By name">
                <meta property="og:title" content="By property">
                <meta property="og:title" content="Second property">
            </head>
            </html>
        "#;

        assert_eq!(extract_metadata(html).title, "By property");
    }

    #[test]
    fn ignores_tags_outside_head() {
        let html = r#"
            <html>
            <head><title>Head</title></head>
            <body><meta property="og:title" content="Body tag"></body>
            </html>
        "#;

        assert_eq!(extract_metadata(html).title, "Head");
    }
}
