//! Index schema and migrations.
//!
//! The schema version lives in `index_metadata` under `schema_version`.
//! On open, a missing version means a fresh database: the latest
//! schema is created outright. Otherwise migrations with a target
//! version greater than the stored one are applied in sequence.

use rusqlite::Connection;

use crate::error::{ErrorCode, Result, ServerError};

pub const SCHEMA_VERSION: i64 = 1;

pub const KEY_SCHEMA_VERSION: &str = "schema_version";
pub const KEY_LAST_VACUUM: &str = "last_vacuum";

/// Connection pragmas: 4 KiB pages, ~10 MiB cache, in-memory temp
/// store, 256 MiB mmap, WAL with synchronous NORMAL, foreign keys on.
const PRAGMAS: &str = "
PRAGMA page_size = 4096;
PRAGMA cache_size = -10240;
PRAGMA temp_store = MEMORY;
PRAGMA mmap_size = 268435456;
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
";

const METADATA_TABLE: &str = "
CREATE TABLE IF NOT EXISTS index_metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS notes (
    uid TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    category TEXT,
    file_path TEXT NOT NULL,
    project TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    content_hash TEXT NOT NULL,
    created TEXT NOT NULL,
    updated TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notes_category ON notes(category);
CREATE INDEX IF NOT EXISTS idx_notes_updated ON notes(updated DESC);

CREATE TABLE IF NOT EXISTS links (
    source_uid TEXT NOT NULL,
    target_uid TEXT NOT NULL,
    link_type TEXT NOT NULL,
    strength REAL NOT NULL DEFAULT 1.0,
    first_seen TEXT NOT NULL,
    last_seen TEXT NOT NULL,
    PRIMARY KEY (source_uid, target_uid, link_type)
);

CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_uid);

CREATE VIRTUAL TABLE IF NOT EXISTS notes_fts USING fts5(
    uid UNINDEXED,
    title,
    content,
    tags,
    category,
    project,
    tokenize = 'unicode61 remove_diacritics 2'
);
";

/// Migrations applied to databases older than [`SCHEMA_VERSION`].
/// Each entry is `(target_version, sql)`; entries are ordered.
const MIGRATIONS: &[(i64, &str)] = &[(1, SCHEMA_V1)];

pub fn apply_pragmas(conn: &Connection) -> Result<()> {
    conn.execute_batch(PRAGMAS)
        .map_err(|err| build_error("pragma setup failed", err))
}

/// Create or migrate the schema up to [`SCHEMA_VERSION`].
pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(METADATA_TABLE)
        .map_err(|err| build_error("metadata table creation failed", err))?;

    let current = read_version(conn)?;
    match current {
        None => {
            conn.execute_batch(SCHEMA_V1)
                .map_err(|err| build_error("schema creation failed", err))?;
            write_version(conn, SCHEMA_VERSION)?;
        }
        Some(version) => {
            for (target, sql) in MIGRATIONS {
                if *target > version {
                    conn.execute_batch(sql)
                        .map_err(|err| build_error("migration failed", err))?;
                    write_version(conn, *target)?;
                    tracing::info!(from = version, to = target, "migrated index schema");
                }
            }
        }
    }
    Ok(())
}

pub fn read_version(conn: &Connection) -> Result<Option<i64>> {
    use rusqlite::OptionalExtension;
    conn.query_row(
        "SELECT value FROM index_metadata WHERE key = ?1",
        [KEY_SCHEMA_VERSION],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(|err| build_error("schema version read failed", err))
    .map(|value| value.and_then(|v| v.parse().ok()))
}

fn write_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO index_metadata(key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![KEY_SCHEMA_VERSION, version.to_string()],
    )
    .map_err(|err| build_error("schema version write failed", err))?;
    Ok(())
}

pub fn build_error(context: &str, err: rusqlite::Error) -> ServerError {
    ServerError::new(ErrorCode::IndexBuildError, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_gets_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        apply_pragmas(&conn).unwrap();
        initialize(&conn).unwrap();

        assert_eq!(read_version(&conn).unwrap(), Some(SCHEMA_VERSION));

        // All four tables exist
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master
                 WHERE name IN ('notes', 'links', 'index_metadata', 'notes_fts')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 4);
    }

    #[test]
    fn initialize_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
        assert_eq!(read_version(&conn).unwrap(), Some(SCHEMA_VERSION));
    }
}
