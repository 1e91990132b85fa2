//! Self-expiring cache of page metadata.
//!
//! Every insert schedules its own deletion. Each insert also takes a fresh
//! generation number, and a deletion only removes the entry it was scheduled
//! for, so refreshing a key is never undone by the previous deletion.

use newsrelay_types::MetadataRecord;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

struct Entry {
    record: MetadataRecord,
    generation: u64,
    expires_at: Instant,
}

type Entries = Arc<RwLock<HashMap<String, Entry>>>;

pub struct MetadataCache {
    entries: Entries,
    next_generation: AtomicU64,
    ttl: Duration,
}

impl MetadataCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            ttl,
        }
    }

    pub fn get(&self, url: &str) -> Option<MetadataRecord> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(url)
            .filter(|entry| Instant::now() < entry.expires_at)
            .map(|entry| entry.record.clone())
    }

    /// Stores `record` and schedules its removal after the TTL.
    ///
    /// Must be called from within a tokio runtime.
    pub fn insert(&self, url: String, record: MetadataRecord) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let expires_at = Instant::now() + self.ttl;

        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                url.clone(),
                Entry {
                    record,
                    generation,
                    expires_at,
                },
            );

        let entries = Arc::clone(&self.entries);
        tokio::spawn(async move {
            tokio::time::sleep_until(expires_at).await;
            let mut entries = entries.write().unwrap_or_else(|e| e.into_inner());
            if entries
                .get(&url)
                .is_some_and(|entry| entry.generation == generation)
            {
                entries.remove(&url);
                tracing::trace!(url = %url, "metadata cache entry expired");
            }
        });
    }

    /// Number of stored entries, including any past expiry but not yet
    /// removed.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MetadataCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
