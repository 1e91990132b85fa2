//! Per-feed delivery watermarks.
//!
//! The watermark for a feed is the newest `created_at` already delivered
//! for it. Watermarks only move forward.
//!
//! Items without any date are stamped with the time they were first seen,
//! so the same item keeps the same `created_at` across passes and the
//! watermark can recognise it as delivered.

use crate::synth::item_date;
use newsrelay_types::{Event, FeedItem, Timestamp};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    marks: HashMap<String, Timestamp>,
    /// feed URL -> item key -> first-seen time, for undated items only.
    first_seen: HashMap<String, HashMap<String, Timestamp>>,
}

#[derive(Debug, Default)]
pub struct Watermarks {
    state: Mutex<State>,
}

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, feed_url: &str) -> Option<Timestamp> {
        self.lock().marks.get(feed_url).copied()
    }

    /// Returns `true` if an event at `ts` has not been delivered yet.
    pub fn should_emit(&self, feed_url: &str, ts: Timestamp) -> bool {
        self.lock().marks.get(feed_url).map_or(true, |mark| ts > *mark)
    }

    /// Raises the watermark to `ts`; never lowers it.
    pub fn advance(&self, feed_url: &str, ts: Timestamp) {
        let mut state = self.lock();
        let mark = state.marks.entry(feed_url.to_string()).or_insert(ts);
        *mark = (*mark).max(ts);
    }

    /// Keeps only events newer than the watermark and advances it to the
    /// newest of them, in one critical section.
    pub fn filter_and_advance(&self, feed_url: &str, events: Vec<Event>) -> Vec<Event> {
        let mut state = self.lock();
        let current = state.marks.get(feed_url).copied();

        let fresh: Vec<Event> = events
            .into_iter()
            .filter(|event| current.map_or(true, |mark| event.created_at > mark))
            .collect();

        if let Some(newest) = fresh.iter().map(|event| event.created_at).max() {
            let mark = state.marks.entry(feed_url.to_string()).or_insert(newest);
            *mark = (*mark).max(newest);
        }

        fresh
    }

    /// Resolves the creation time of every item of a feed, in order.
    ///
    /// Dated items use their published or updated time. An undated item
    /// reuses the time it was first seen; a new one is stamped `now`, or one
    /// second past the watermark when that is later. Undated items that left
    /// the feed are forgotten.
    pub fn item_times(&self, feed_url: &str, items: &[FeedItem], now: Timestamp) -> Vec<Timestamp> {
        let mut state = self.lock();
        let floor = state
            .marks
            .get(feed_url)
            .map_or(now, |mark| now.max(mark.saturating_add(1)));
        let previous = state.first_seen.remove(feed_url).unwrap_or_default();
        let mut current: HashMap<String, Timestamp> = HashMap::new();

        let times = items
            .iter()
            .map(|item| {
                if let Some(ts) = item_date(item) {
                    return ts;
                }
                let key = item_key(item);
                let ts = previous
                    .get(key)
                    .or_else(|| current.get(key))
                    .copied()
                    .unwrap_or(floor);
                current.insert(key.to_string(), ts);
                ts
            })
            .collect();

        if !current.is_empty() {
            state.first_seen.insert(feed_url.to_string(), current);
        }
        times
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Identifies an item within its feed: the link, else the title, else the
/// description.
fn item_key(item: &FeedItem) -> &str {
    [&item.link, &item.title, &item.description]
        .into_iter()
        .find(|s| !s.is_empty())
        .map_or("", String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use newsrelay_types::EventKind;
    use std::sync::Arc;

    const FEED: &str = "https://example.com/feed.xml";

    fn note(ts: Timestamp) -> Event {
        Event::unsigned("pk", ts, EventKind::TextNote, format!("at {ts}"))
    }

    fn undated(link: &str) -> FeedItem {
        FeedItem {
            title: "untitled".into(),
            link: link.into(),
            ..FeedItem::default()
        }
    }

    #[test]
    fn unknown_feed_emits_everything() {
        let marks = Watermarks::new();
        assert!(marks.should_emit(FEED, i64::MIN));
        assert_eq!(marks.get(FEED), None);
    }

    #[test]
    fn advance_is_monotone() {
        let marks = Watermarks::new();
        marks.advance(FEED, 200);
        marks.advance(FEED, 100);
        assert_eq!(marks.get(FEED), Some(200));

        assert!(!marks.should_emit(FEED, 200));
        assert!(marks.should_emit(FEED, 201));
    }

    #[test]
    fn filter_and_advance_drops_delivered_events() {
        let marks = Watermarks::new();
        marks.advance(FEED, 150);

        let fresh = marks.filter_and_advance(FEED, vec![note(100), note(150), note(300), note(200)]);
        let times: Vec<_> = fresh.iter().map(|e| e.created_at).collect();
        assert_eq!(times, vec![300, 200]);
        assert_eq!(marks.get(FEED), Some(300));

        assert!(marks.filter_and_advance(FEED, vec![note(300)]).is_empty());
    }

    #[test]
    fn empty_batch_leaves_watermark_unset() {
        let marks = Watermarks::new();
        assert!(marks.filter_and_advance(FEED, Vec::new()).is_empty());
        assert_eq!(marks.get(FEED), None);
    }

    #[test]
    fn dated_items_keep_their_own_time() {
        let marks = Watermarks::new();
        let published = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let item = FeedItem {
            published: Some(published),
            ..undated("https://example.com/1")
        };

        assert_eq!(
            marks.item_times(FEED, &[item], 9_999_999_999),
            vec![published.timestamp()]
        );
    }

    #[test]
    fn undated_items_keep_their_first_seen_time() {
        let marks = Watermarks::new();
        let items = vec![undated("https://example.com/a")];

        assert_eq!(marks.item_times(FEED, &items, 1_000), vec![1_000]);
        assert_eq!(marks.item_times(FEED, &items, 2_000), vec![1_000]);

        let grown = vec![undated("https://example.com/b"), undated("https://example.com/a")];
        assert_eq!(marks.item_times(FEED, &grown, 3_000), vec![3_000, 1_000]);
    }

    #[test]
    fn new_undated_items_land_past_the_watermark() {
        let marks = Watermarks::new();
        marks.advance(FEED, 5_000);

        let times = marks.item_times(FEED, &[undated("https://example.com/late")], 5_000);
        assert_eq!(times, vec![5_001]);
        assert!(marks.should_emit(FEED, times[0]));
    }

    #[test]
    fn items_that_leave_the_feed_are_forgotten() {
        let marks = Watermarks::new();
        let item = vec![undated("https://example.com/a")];

        marks.item_times(FEED, &item, 1_000);
        marks.item_times(FEED, &[], 2_000);
        assert_eq!(marks.item_times(FEED, &item, 3_000), vec![3_000]);
    }

    #[test]
    fn items_without_link_are_keyed_by_title() {
        let marks = Watermarks::new();
        let item = FeedItem {
            title: "Only a title".into(),
            ..FeedItem::default()
        };

        marks.item_times(FEED, std::slice::from_ref(&item), 10);
        assert_eq!(marks.item_times(FEED, &[item], 20), vec![10]);
    }

    #[test]
    fn concurrent_advances_keep_the_maximum() {
        let marks = Arc::new(Watermarks::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let marks = Arc::clone(&marks);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        marks.advance(FEED, t * 1_000 + i);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(marks.get(FEED), Some(7_999));
    }
}
