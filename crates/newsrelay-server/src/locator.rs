//! Resolves a site URL to the URL of its syndication feed.

use crate::http::{content_type, normalize_url, read_body_limited, MAX_PAGE_BYTES};
use scraper::{Html, Selector};
use thiserror::Error;
use url::Url;

/// Content-type markers that identify a feed, in priority order.
pub const FEED_MARKERS: [&str; 5] = [
    "rss+xml",
    "atom+xml",
    "feed+json",
    "text/xml",
    "application/xml",
];

/// Why no feed URL could be found. Callers treat every variant as
/// "not found".
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("site unreachable: {0}")]
    Unreachable(String),

    #[error("site returned status {0}")]
    Status(u16),

    #[error("no feed advertised at {0}")]
    NoFeed(String),
}

/// Finds the feed behind `site_url`.
///
/// A URL that already serves a feed content type is returned as is. An HTML
/// page is searched for a `<link>` advertising one of [`FEED_MARKERS`].
pub async fn locate_feed(client: &reqwest::Client, site_url: &str) -> Result<String, LocateError> {
    let url = normalize_url(site_url);

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| LocateError::Unreachable(e.to_string()))?;

    let status = resp.status();
    if status.as_u16() >= 300 {
        return Err(LocateError::Status(status.as_u16()));
    }

    let ct = content_type(resp.headers()).to_string();
    if FEED_MARKERS.iter().any(|marker| ct.contains(marker)) {
        return Ok(url);
    }

    if ct.contains("text/html") {
        let body = read_body_limited(resp, MAX_PAGE_BYTES)
            .await
            .map_err(|e| LocateError::Unreachable(e.to_string()))?;
        if let Some(feed_url) = find_feed_link(&String::from_utf8_lossy(&body), &url) {
            tracing::debug!(site_url = %url, feed_url = %feed_url, "found advertised feed");
            return Ok(feed_url);
        }
    }

    Err(LocateError::NoFeed(url))
}

/// Returns the first advertised feed link, honoring marker priority over
/// document order.
pub fn find_feed_link(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);

    for marker in FEED_MARKERS {
        let Ok(selector) = Selector::parse(&format!("link[type*='{marker}']")) else {
            continue;
        };
        let href = document
            .select(&selector)
            .next()
            .and_then(|el| el.value().attr("href"))
            .map(str::trim)
            .filter(|href| !href.is_empty());

        if let Some(href) = href {
            return resolve_href(page_url, href);
        }
    }

    None
}

/// Resolves an advertised href against the page it was found on.
///
/// Absolute and root-relative hrefs resolve as in a browser. Bare relative
/// hrefs are joined onto the page path as path segments, so `feed.xml` on
/// `/blog` becomes `/blog/feed.xml`.
fn resolve_href(page_url: &str, href: &str) -> Option<String> {
    if href.starts_with("http") {
        return Some(href.to_string());
    }

    let mut base = Url::parse(page_url).ok()?;
    if href.starts_with('/') {
        return base.join(href).ok().map(String::from);
    }

    let (rel_path, query) = match href.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (href, None),
    };
    let joined = join_path(base.path(), rel_path);
    base.set_path(&joined);
    base.set_query(query);
    base.set_fragment(None);
    Some(base.into())
}

/// Joins and cleans slash-separated paths, resolving `.` and `..`.
fn join_path(base: &str, rel: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(rel.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_priority_beats_document_order() {
        let html = r#"
            <html><head>
                <link rel="alternate" type="application/atom+xml" href="https://example.com/atom.xml">
                <link rel="alternate" type="application/rss+xml" href="https://example.com/rss.xml">
            </head></html>
        "#;

        assert_eq!(
            find_feed_link(html, "https://example.com/").as_deref(),
            Some("https://example.com/rss.xml")
        );
    }

    #[test]
    fn skips_links_with_empty_href() {
        let html = r#"
            <link type="application/rss+xml" href="">
            <link type="application/atom+xml" href="/atom">
        "#;

        assert_eq!(
            find_feed_link(html, "https://example.com/blog").as_deref(),
            Some("https://example.com/atom")
        );
    }

    #[test]
    fn root_relative_href_replaces_page_path() {
        assert_eq!(
            resolve_href("https://example.com/blog", "/feed.xml").as_deref(),
            Some("https://example.com/feed.xml")
        );
    }

    #[test]
    fn bare_relative_href_is_joined_onto_page_path() {
        assert_eq!(
            resolve_href("https://example.com/blog", "feed.xml").as_deref(),
            Some("https://example.com/blog/feed.xml")
        );
        assert_eq!(
            resolve_href("https://example.com/blog/post/?page=2", "../rss").as_deref(),
            Some("https://example.com/blog/rss")
        );
    }

    #[test]
    fn protocol_relative_and_absolute_hrefs() {
        assert_eq!(
            resolve_href("https://example.com/blog", "//cdn.example.com/feed").as_deref(),
            Some("https://cdn.example.com/feed")
        );
        assert_eq!(
            resolve_href("https://example.com/blog", "http://other.org/rss").as_deref(),
            Some("http://other.org/rss")
        );
    }

    #[test]
    fn page_without_feed_links_yields_nothing() {
        let html = r#"<html><head><link rel="stylesheet" href="/site.css"></head></html>"#;
        assert!(find_feed_link(html, "https://example.com/").is_none());
    }
}
