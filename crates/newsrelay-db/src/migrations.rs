//! Schema versioning for the entity database.
//!
//! The SQL lives in `migrations/` and is compiled in. Applied names are
//! recorded in `_newsrelay_migrations`; anything not recorded there runs on
//! startup inside its own transaction.

use rusqlite::Connection;
use thiserror::Error;

struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// Append only. Names are the primary key of the history table.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_entities",
        sql: include_str!("migrations/001_entities.sql"),
    },
];

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        name: String,
        source: rusqlite::Error,
    },

    #[error("failed to read migration history: {0}")]
    StateQuery(rusqlite::Error),
}

/// Applies every migration missing from the history table and returns the
/// number applied. A failing migration leaves no partial schema behind.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    apply_pending(conn, MIGRATIONS)
}

fn apply_pending(conn: &Connection, migrations: &[Migration]) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _newsrelay_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|source| MigrationError::ExecutionFailed {
        name: "history table".to_string(),
        source,
    })?;

    let mut applied = 0;
    for migration in migrations {
        let recorded: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM _newsrelay_migrations WHERE name = ?1)",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;
        if recorded {
            tracing::debug!(migration = migration.name, "skipping applied migration");
            continue;
        }

        let failed = |source| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source,
        };

        tracing::info!(migration = migration.name, "applying migration");
        let tx = conn.unchecked_transaction().map_err(failed)?;
        tx.execute_batch(migration.sql).map_err(failed)?;
        tx.execute(
            "INSERT INTO _newsrelay_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed)?;
        tx.commit().map_err(failed)?;
        applied += 1;
    }

    Ok(applied)
}
