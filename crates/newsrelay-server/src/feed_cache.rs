//! Bounded, expiring cache of parsed feeds.

use crate::feeds::{FeedError, FeedSource};
use lru::LruCache;
use newsrelay_types::Feed;
use std::num::NonZeroUsize;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 512;
pub const DEFAULT_TTL: Duration = Duration::from_secs(19 * 60);

struct CachedFeed {
    feed: Arc<Feed>,
    inserted_at: Instant,
}

/// LRU cache of parsed feeds keyed by feed URL, with a hard expiry.
///
/// Failed fetches are never stored. Concurrent misses for the same URL each
/// fetch; the last insert wins.
pub struct FeedCache {
    source: Arc<dyn FeedSource>,
    entries: RwLock<LruCache<String, CachedFeed>>,
    ttl: Duration,
}

impl FeedCache {
    pub fn new(source: Arc<dyn FeedSource>, capacity: NonZeroUsize, ttl: Duration) -> Self {
        Self {
            source,
            entries: RwLock::new(LruCache::new(capacity)),
            ttl,
        }
    }

    /// Returns the cached feed for `url`, fetching and storing it on a miss.
    pub async fn get_or_fetch(&self, url: &str) -> Result<Arc<Feed>, FeedError> {
        if let Some(feed) = self.lookup(url) {
            tracing::trace!(feed_url = %url, "feed cache hit");
            return Ok(feed);
        }

        tracing::debug!(feed_url = %url, "feed cache miss, fetching");
        let mut feed = self.source.fetch_feed(url).await?;
        feed.strip_content();
        let feed = Arc::new(feed);

        let evicted = self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(
                url.to_string(),
                CachedFeed {
                    feed: Arc::clone(&feed),
                    inserted_at: Instant::now(),
                },
            );
        if let Some((evicted_url, _)) = evicted.filter(|(key, _)| key != url) {
            tracing::debug!(feed_url = %evicted_url, "evicted least recently used feed");
        }

        Ok(feed)
    }

    fn lookup(&self, url: &str) -> Option<Arc<Feed>> {
        if !self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(url)
        {
            return None;
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        self.take_if_fresh(&mut entries, url)
    }

    /// Promotes and returns a fresh entry, or drops an expired one. Freshness
    /// is judged under the caller's write lock, so an entry refreshed by a
    /// concurrent fetch is never evicted.
    fn take_if_fresh(
        &self,
        entries: &mut LruCache<String, CachedFeed>,
        url: &str,
    ) -> Option<Arc<Feed>> {
        let (fresh, feed) = entries
            .get(url)
            .map(|entry| (entry.inserted_at.elapsed() < self.ttl, Arc::clone(&entry.feed)))?;
        if fresh {
            Some(feed)
        } else {
            entries.pop(url);
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
