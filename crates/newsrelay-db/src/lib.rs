//! Storage layer for the newsrelay bridge.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! embedded SQL migrations, and the key-value entity store the bridge
//! persists registrations in.
//!
//! Migrations are compiled into the binary with `include_str!`, so the
//! schema always ships with the code that reads it.

mod migrations;
mod pool;
mod store;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, open_database, DbPool, DbRuntimeSettings, PoolError};
pub use store::{EntityStore, MemoryEntityStore, SqliteEntityStore, StoreError};
