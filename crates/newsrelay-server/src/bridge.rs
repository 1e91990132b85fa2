//! The feed-to-event bridge.
//!
//! Registration turns a site URL into a persisted entity keyed by the
//! derived public key. Queries and polls turn a stored entity back into
//! signed events on demand; events are never persisted.

use crate::feed_cache::FeedCache;
use crate::feeds::FeedError;
use crate::host::RelayHost;
use crate::locator::{locate_feed, LocateError};
use crate::synth::{feed_to_profile, item_to_text_note};
use chrono::Utc;
use crate::watermark::Watermarks;
use newsrelay_db::{EntityStore, StoreError};
use newsrelay_identity::{derive_private_key, finalize, EventSigner, SigningError};
use newsrelay_types::{Entity, EntityMeta, Event, EventKind, Filter};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid entity json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("entity store task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("couldn't find a feed url: {0}")]
    Locate(#[from] LocateError),

    #[error("bad feed: {0}")]
    Feed(#[from] FeedError),

    #[error("bad private key: {0}")]
    Signing(#[from] SigningError),

    #[error("failed to save entity: {0}")]
    Entity(#[from] EntityError),
}

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub pubkey: String,
    pub feed_url: String,
}

pub struct Bridge {
    secret: Vec<u8>,
    http: reqwest::Client,
    feeds: FeedCache,
    store: Arc<dyn EntityStore>,
    signer: Arc<dyn EventSigner>,
    watermarks: Watermarks,
}

impl Bridge {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        http: reqwest::Client,
        feeds: FeedCache,
        store: Arc<dyn EntityStore>,
        signer: Arc<dyn EventSigner>,
    ) -> Self {
        Self {
            secret: secret.into(),
            http,
            feeds,
            store,
            signer,
            watermarks: Watermarks::new(),
        }
    }

    pub fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    /// Locates the feed behind `site_url`, checks that it parses, and stores
    /// its entity under the derived public key. Nothing is stored on failure.
    pub async fn register(
        &self,
        site_url: &str,
        meta: Option<EntityMeta>,
    ) -> Result<Registration, RegisterError> {
        let feed_url = locate_feed(&self.http, site_url).await?;
        self.feeds.get_or_fetch(&feed_url).await?;

        let private_key = derive_private_key(&self.secret, &feed_url);
        let pubkey = self.signer.public_key_for(&private_key)?;

        let entity = Entity {
            private_key,
            feed_url: feed_url.clone(),
            meta,
        };
        self.save_entity(&pubkey, &entity).await?;

        tracing::info!(feed_url = %feed_url, pubkey = %pubkey, "saved feed");
        Ok(Registration { pubkey, feed_url })
    }

    pub async fn load_entity(&self, pubkey: &str) -> Result<Option<Entity>, EntityError> {
        let store = Arc::clone(&self.store);
        let key = pubkey.as_bytes().to_vec();
        let raw = tokio::task::spawn_blocking(move || store.get(&key))
            .await
            .map_err(|e| EntityError::Task(e.to_string()))??;

        raw.map(|bytes| Entity::from_json(&bytes).map_err(EntityError::from))
            .transpose()
    }

    async fn save_entity(&self, pubkey: &str, entity: &Entity) -> Result<(), EntityError> {
        let store = Arc::clone(&self.store);
        let key = pubkey.as_bytes().to_vec();
        let value = entity.to_json()?;
        tokio::task::spawn_blocking(move || store.set(&key, &value))
            .await
            .map_err(|e| EntityError::Task(e.to_string()))??;
        Ok(())
    }

    /// Answers a subscription filter synchronously.
    ///
    /// Every matching note is returned regardless of the watermark, which is
    /// then advanced to the newest returned note.
    pub async fn query(&self, filter: &Filter) -> Vec<Event> {
        let mut events = Vec::new();
        if filter.selects_by_id_or_tag() {
            return events;
        }

        for pubkey in &filter.authors {
            let Some(entity) = self.entity_for(pubkey).await else {
                continue;
            };
            let feed = match self.feeds.get_or_fetch(&entity.feed_url).await {
                Ok(feed) => feed,
                Err(e) => {
                    tracing::warn!(feed_url = %entity.feed_url, error = %e, "failed to parse feed");
                    continue;
                }
            };

            if filter.accepts_kind(EventKind::ProfileMetadata) {
                match feed_to_profile(pubkey, &feed, entity.meta.as_ref()) {
                    Ok(profile) if filter.admits(profile.created_at) => {
                        events.extend(self.sign(profile, &entity));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(pubkey = %pubkey, error = %e, "failed to build profile event");
                    }
                }
            }

            if filter.accepts_kind(EventKind::TextNote) {
                let times = self.watermarks.item_times(
                    &entity.feed_url,
                    &feed.items,
                    Utc::now().timestamp(),
                );
                let mut newest = None;
                for (item, created_at) in feed.items.iter().zip(times) {
                    let note = item_to_text_note(pubkey, item, created_at);
                    if !filter.admits(note.created_at) {
                        continue;
                    }
                    if let Some(signed) = self.sign(note, &entity) {
                        newest = newest.max(Some(signed.created_at));
                        events.push(signed);
                    }
                }
                if let Some(newest) = newest {
                    self.watermarks.advance(&entity.feed_url, newest);
                }
            }
        }

        events
    }

    /// Runs one polling pass: every author of every live filter that wants
    /// text notes gets its new notes delivered to `host`.
    ///
    /// Returns the number of events delivered. Errors are logged and skipped.
    pub async fn poll_once(&self, host: &dyn RelayHost) -> usize {
        let filters = host.active_filters();
        tracing::info!(filters = filters.len(), "checking for updates");

        let mut seen = HashSet::new();
        let mut delivered = 0;

        for filter in filters
            .iter()
            .filter(|f| f.accepts_kind(EventKind::TextNote))
        {
            for pubkey in &filter.authors {
                if !seen.insert(pubkey.as_str()) {
                    continue;
                }
                delivered += self.poll_author(pubkey, host).await;
            }
        }

        delivered
    }

    async fn poll_author(&self, pubkey: &str, host: &dyn RelayHost) -> usize {
        let Some(entity) = self.entity_for(pubkey).await else {
            return 0;
        };
        let feed = match self.feeds.get_or_fetch(&entity.feed_url).await {
            Ok(feed) => feed,
            Err(e) => {
                tracing::warn!(feed_url = %entity.feed_url, error = %e, "failed to parse feed");
                return 0;
            }
        };

        let times = self
            .watermarks
            .item_times(&entity.feed_url, &feed.items, Utc::now().timestamp());
        let mut fresh: Vec<Event> = feed
            .items
            .iter()
            .zip(times)
            .filter(|(_, created_at)| self.watermarks.should_emit(&entity.feed_url, *created_at))
            .map(|(item, created_at)| item_to_text_note(pubkey, item, created_at))
            .collect();
        // Oldest first, so a failed delivery leaves the rest eligible next pass.
        fresh.sort_by_key(|note| note.created_at);

        let mut delivered = 0;
        for note in fresh {
            let created_at = note.created_at;
            let Some(signed) = self.sign(note, &entity) else {
                continue;
            };
            if let Err(e) = host.deliver(signed).await {
                tracing::warn!(pubkey = %pubkey, error = %e, "failed to deliver event");
                break;
            }
            self.watermarks.advance(&entity.feed_url, created_at);
            delivered += 1;
        }

        if delivered > 0 {
            tracing::debug!(feed_url = %entity.feed_url, delivered, "delivered new notes");
        }
        delivered
    }

    async fn entity_for(&self, pubkey: &str) -> Option<Entity> {
        match self.load_entity(pubkey).await {
            Ok(Some(entity)) => Some(entity),
            Ok(None) => {
                tracing::debug!(pubkey = %pubkey, "no entity registered for author");
                None
            }
            Err(e) => {
                tracing::warn!(pubkey = %pubkey, error = %e, "failed to load entity");
                None
            }
        }
    }

    fn sign(&self, event: Event, entity: &Entity) -> Option<Event> {
        match finalize(self.signer.as_ref(), event, &entity.private_key) {
            Ok(signed) => Some(signed),
            Err(e) => {
                tracing::warn!(feed_url = %entity.feed_url, error = %e, "failed to sign event");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::FeedSource;
    use crate::host::{ChannelHost, DeliveryError};
    use async_trait::async_trait;
    use chrono::DateTime;
    use newsrelay_db::MemoryEntityStore;
    use newsrelay_identity::Secp256k1Signer;
    use newsrelay_types::{Feed, FeedItem};
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    const SECRET: &[u8] = b"unit-secret";
    const FEED_URL: &str = "https://example.com/feed.xml";

    /// Serves whatever feed the test currently holds.
    struct StaticSource(Mutex<Feed>);

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch_feed(&self, _url: &str) -> Result<Feed, FeedError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    /// Accepts a fixed number of deliveries, then reports itself closed.
    struct LimitedHost {
        filters: Vec<Filter>,
        budget: AtomicUsize,
        delivered: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl RelayHost for LimitedHost {
        fn active_filters(&self) -> Vec<Filter> {
            self.filters.clone()
        }

        async fn deliver(&self, event: Event) -> Result<(), DeliveryError> {
            let left = self.budget.load(Ordering::SeqCst);
            if left == 0 {
                return Err(DeliveryError::Closed);
            }
            self.budget.store(left - 1, Ordering::SeqCst);
            self.delivered.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn item(link: &str, published: Option<i64>) -> FeedItem {
        FeedItem {
            title: "same item".into(),
            link: link.into(),
            published: published.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            ..FeedItem::default()
        }
    }

    /// A bridge whose only entity points at `FEED_URL`. The cache TTL is zero
    /// so every pass sees the current contents of the source.
    async fn bridge_with(items: Vec<FeedItem>) -> (Bridge, Arc<StaticSource>, String) {
        let source = Arc::new(StaticSource(Mutex::new(Feed {
            items,
            ..Feed::default()
        })));
        let feeds = FeedCache::new(
            source.clone(),
            NonZeroUsize::new(4).unwrap(),
            Duration::ZERO,
        );
        let bridge = Bridge::new(
            SECRET,
            reqwest::Client::new(),
            feeds,
            Arc::new(MemoryEntityStore::new()),
            Arc::new(Secp256k1Signer),
        );

        let private_key = derive_private_key(SECRET, FEED_URL);
        let pubkey = Secp256k1Signer.public_key_for(&private_key).unwrap();
        let entity = Entity {
            private_key,
            feed_url: FEED_URL.to_string(),
            meta: None,
        };
        bridge.save_entity(&pubkey, &entity).await.unwrap();
        (bridge, source, pubkey)
    }

    fn notes_by(pubkey: &str) -> Filter {
        Filter {
            authors: vec![pubkey.to_string()],
            kinds: Some(vec![1]),
            ..Filter::default()
        }
    }

    #[tokio::test]
    async fn undated_item_is_delivered_once_across_passes() {
        let (bridge, source, pubkey) = bridge_with(vec![item("https://x/1", None)]).await;
        let (host, mut rx) = ChannelHost::new(8);
        host.subscribe("s", vec![notes_by(&pubkey)]);

        assert_eq!(bridge.poll_once(&host).await, 1);
        let first = rx.try_recv().unwrap();

        // Cross a wall-clock second so a fresh "now" would differ.
        tokio::time::sleep(Duration::from_millis(1_100)).await;
        assert_eq!(bridge.poll_once(&host).await, 0);
        assert!(rx.try_recv().is_err());

        source
            .0
            .lock()
            .unwrap()
            .items
            .insert(0, item("https://x/2", None));
        assert_eq!(bridge.poll_once(&host).await, 1);
        let second = rx.try_recv().unwrap();
        assert!(second.content.ends_with("https://x/2"));
        assert!(second.created_at > first.created_at);
    }

    #[tokio::test]
    async fn query_and_poll_agree_on_undated_item_time() {
        let (bridge, _source, pubkey) = bridge_with(vec![item("https://x/1", None)]).await;

        let queried = bridge.query(&notes_by(&pubkey)).await;
        assert_eq!(queried.len(), 1);

        let (host, _rx) = ChannelHost::new(8);
        host.subscribe("s", vec![notes_by(&pubkey)]);
        assert_eq!(bridge.poll_once(&host).await, 0);
        assert_eq!(bridge.watermarks().get(FEED_URL), Some(queried[0].created_at));
    }

    #[tokio::test]
    async fn failed_delivery_leaves_remaining_notes_for_next_pass() {
        let (bridge, _source, pubkey) = bridge_with(vec![
            item("https://x/3", Some(300)),
            item("https://x/2", Some(200)),
            item("https://x/1", Some(100)),
        ])
        .await;

        let host = LimitedHost {
            filters: vec![notes_by(&pubkey)],
            budget: AtomicUsize::new(1),
            delivered: Mutex::new(Vec::new()),
        };
        assert_eq!(bridge.poll_once(&host).await, 1);
        assert_eq!(bridge.watermarks().get(FEED_URL), Some(100));

        host.budget.store(usize::MAX, Ordering::SeqCst);
        assert_eq!(bridge.poll_once(&host).await, 2);
        assert_eq!(bridge.poll_once(&host).await, 0);

        let times: Vec<i64> = host
            .delivered
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.created_at)
            .collect();
        assert_eq!(times, vec![100, 200, 300]);
    }
}
