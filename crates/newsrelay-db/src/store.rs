//! Opaque key-value storage for feed entities.
//!
//! The bridge treats entities as blobs keyed by public key; it owns the JSON
//! encoding, the store only persists bytes.

use crate::pool::DbPool;
use rusqlite::{params, OptionalExtension};
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Errors produced by an [`EntityStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// No pooled connection was available.
    #[error("database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// The underlying query failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A lock guarding in-memory state was poisoned.
    #[error("entity store lock poisoned")]
    LockPoisoned,
}

/// Get/set by key. Implementations are blocking; async callers go through
/// `spawn_blocking`.
pub trait EntityStore: Send + Sync {
    /// Returns the stored value, or `None` if the key was never set.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
}

/// SQLite-backed store over the `entities` table.
#[derive(Clone)]
pub struct SqliteEntityStore {
    pool: DbPool,
}

impl SqliteEntityStore {
    /// Wraps a pool whose schema has already been migrated.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl EntityStore for SqliteEntityStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.pool.get()?;
        let value = conn
            .query_row(
                "SELECT value FROM entities WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO entities (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Process-local store, for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryEntityStore {
    entries: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntityStore for MemoryEntityStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let entries = self.entries.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let mut entries = self.entries.write().map_err(|_| StoreError::LockPoisoned)?;
        entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}
