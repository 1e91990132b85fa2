//! Turns feed items and feed headers into unsigned relay events.

use chrono::Utc;
use newsrelay_types::{EntityMeta, Event, EventKind, Feed, FeedItem, Timestamp};
use scraper::Html;
use serde::Serialize;

/// Content longer than this gets a truncated copy appended.
pub const PREVIEW_THRESHOLD: usize = 250;
const PREVIEW_CHARS: usize = 249;

/// Builds the text note for one feed item.
///
/// `created_at` comes from [`crate::watermark::Watermarks::item_times`], which
/// keeps undated items stable across passes.
pub fn item_to_text_note(pubkey: &str, item: &FeedItem, created_at: Timestamp) -> Event {
    let mut content = String::new();
    if !item.title.is_empty() {
        content.push_str("**");
        content.push_str(&item.title);
        content.push_str("**\n\n");
    }
    content.push_str(&strip_markup(&item.description));
    append_truncated_copy(&mut content);
    content.push_str("\n\n");
    content.push_str(&item.link);

    Event::unsigned(pubkey, created_at, EventKind::TextNote, content)
}

/// Published time if known, else updated time.
pub fn item_date(item: &FeedItem) -> Option<Timestamp> {
    item.published.or(item.updated).map(|t| t.timestamp())
}

/// Appends the first 249 characters plus an ellipsis when the content is
/// over the preview threshold.
///
/// Notes produced by the bridge have always carried this duplicated preview
/// and clients render them that way, so the text is kept as is.
pub fn append_truncated_copy(content: &mut String) {
    if content.chars().count() > PREVIEW_THRESHOLD {
        let preview: String = content.chars().take(PREVIEW_CHARS).collect();
        content.push_str(&preview);
        content.push('…');
    }
}

/// Returns the text of an HTML fragment with all tags removed and entities
/// decoded.
pub fn strip_markup(html: &str) -> String {
    Html::parse_fragment(html).root_element().text().collect()
}

#[derive(Serialize)]
struct ProfileContent<'a> {
    name: &'a str,
    about: String,
    picture: &'a str,
    nip05: &'a str,
    banner: &'a str,
    website: &'a str,
}

/// Builds the profile metadata event describing a feed.
pub fn feed_to_profile(
    pubkey: &str,
    feed: &Feed,
    meta: Option<&EntityMeta>,
) -> Result<Event, serde_json::Error> {
    let name = meta
        .map(|m| m.name.as_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(&feed.title);
    let picture = meta
        .map(|m| m.picture.as_str())
        .filter(|p| !p.is_empty())
        .or(feed.image_url.as_deref())
        .unwrap_or_default();

    let mut about = strip_markup(&feed.description);
    if !feed.link.is_empty() {
        about.push_str("\n\n");
        about.push_str(&feed.link);
    }

    let content = serde_json::to_string(&ProfileContent {
        name,
        about,
        picture,
        nip05: meta.map(|m| m.nip05.as_str()).unwrap_or_default(),
        banner: meta.map(|m| m.banner.as_str()).unwrap_or_default(),
        website: meta
            .map(|m| m.url.as_str())
            .filter(|u| !u.is_empty())
            .unwrap_or(&feed.link),
    })?;

    let created_at = feed
        .published
        .map(|t| t.timestamp())
        .unwrap_or_else(|| Utc::now().timestamp());

    Ok(Event::unsigned(
        pubkey,
        created_at,
        EventKind::ProfileMetadata,
        content,
    ))
}
