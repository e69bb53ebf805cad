//! SQLite search index.
//!
//! A queryable mirror of the vault: one `notes` row and one FTS entry
//! per note, plus the `links` edge table. The connection is a single
//! writer behind a mutex; every call crosses into `spawn_blocking` so
//! the async executor never blocks on SQLite.

mod schema;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, ToSql};
use serde::Serialize;
use vault_notes::Note;

use crate::error::{ErrorCode, Result, ServerError};
use crate::store::content_hash;

pub use schema::SCHEMA_VERSION;

/// A `notes` table row.
#[derive(Debug, Clone, Serialize)]
pub struct IndexedNote {
    pub uid: String,
    pub title: String,
    pub category: Option<String>,
    pub file_path: String,
    pub project: Option<String>,
    pub tags: Vec<String>,
    pub content_hash: String,
    pub created: String,
    pub updated: String,
    pub indexed_at: String,
}

/// A `links` table row.
#[derive(Debug, Clone, Serialize)]
pub struct LinkRow {
    pub source_uid: String,
    pub target_uid: String,
    pub link_type: String,
    pub strength: f64,
    pub first_seen: String,
    pub last_seen: String,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub uid: String,
    pub title: String,
    pub category: Option<String>,
    pub file_path: String,
    pub snippet: String,
    pub score: f64,
}

/// Search results plus timing metrics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_count: usize,
    pub query_ms: u64,
    pub processing_ms: u64,
    pub total_ms: u64,
    pub cache_hit: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub limit: usize,
    pub offset: usize,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Created,
    Updated,
    Title,
}

impl SortBy {
    fn column(&self) -> &'static str {
        match self {
            SortBy::Created => "created",
            SortBy::Updated => "updated",
            SortBy::Title => "title COLLATE NOCASE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub project: Option<String>,
    pub limit: usize,
    pub offset: usize,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            category: None,
            tags: Vec::new(),
            project: None,
            limit: 100,
            offset: 0,
            sort_by: SortBy::Updated,
            sort_order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub note_count: usize,
    pub link_count: usize,
    pub schema_version: i64,
    pub last_vacuum: Option<String>,
    pub db_size_bytes: u64,
}

pub struct SearchIndex {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SearchIndex {
    /// Open (or create) the index database at `path`, applying
    /// pragmas and schema migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| {
                ServerError::new(
                    ErrorCode::IndexBuildError,
                    format!("cannot create index directory {}: {err}", parent.display()),
                )
            })?;
        }

        let conn = Connection::open(path).map_err(|err| {
            ServerError::new(
                ErrorCode::IndexBuildError,
                format!("cannot open index at {}: {err}", path.display()),
            )
        })?;
        schema::apply_pragmas(&conn)?;
        schema::initialize(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| {
                ServerError::new(ErrorCode::InternalError, "index connection mutex poisoned")
            })?;
            f(&mut guard)
        })
        .await
        .map_err(|err| ServerError::internal(format!("index task join failed: {err}")))?
    }

    /// Upsert a note into `notes` and `notes_fts` and rebuild its
    /// outbound link rows, all in one transaction.
    pub async fn index_note(&self, note: &Note, file_path: &str) -> Result<()> {
        let note = note.clone();
        let file_path = file_path.to_string();
        self.call(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|err| build_error("begin index transaction", err))?;
            upsert_note(&tx, &note, &file_path)?;
            tx.commit()
                .map_err(|err| build_error("commit index transaction", err))
        })
        .await
    }

    /// Index many notes in a single transaction.
    pub async fn batch_index(&self, notes: Vec<(String, Note)>) -> Result<usize> {
        self.call(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|err| build_error("begin batch transaction", err))?;
            for (file_path, note) in &notes {
                upsert_note(&tx, note, file_path)?;
            }
            tx.commit()
                .map_err(|err| build_error("commit batch transaction", err))?;
            Ok(notes.len())
        })
        .await
    }

    /// Delete a note from all three tables.
    pub async fn remove_note(&self, uid: &str) -> Result<()> {
        let uid = uid.to_string();
        self.call(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|err| build_error("begin delete transaction", err))?;
            tx.execute("DELETE FROM notes WHERE uid = ?1", [&uid])
                .map_err(|err| build_error("delete note row", err))?;
            tx.execute("DELETE FROM notes_fts WHERE uid = ?1", [&uid])
                .map_err(|err| build_error("delete fts row", err))?;
            tx.execute(
                "DELETE FROM links WHERE source_uid = ?1 OR target_uid = ?1",
                [&uid],
            )
            .map_err(|err| build_error("delete link rows", err))?;
            tx.commit()
                .map_err(|err| build_error("commit delete transaction", err))
        })
        .await
    }

    /// BM25-ranked full-text search with optional category and
    /// any-of-tags filters.
    pub async fn search(&self, query: &str, opts: SearchOptions) -> Result<SearchResponse> {
        let started = Instant::now();
        let match_expr = fts_match_expr(query);
        if match_expr.is_empty() {
            return Ok(SearchResponse {
                results: Vec::new(),
                total_count: 0,
                query_ms: 0,
                processing_ms: 0,
                total_ms: started.elapsed().as_millis() as u64,
                cache_hit: false,
            });
        }

        let response = self
            .call(move |conn| {
                let mut where_sql = String::from("notes_fts MATCH ?1");
                let mut params: Vec<Box<dyn ToSql + Send>> = vec![Box::new(match_expr)];

                if let Some(category) = &opts.category {
                    params.push(Box::new(category.clone()));
                    where_sql.push_str(&format!(" AND n.category = ?{}", params.len()));
                }
                if !opts.tags.is_empty() {
                    let placeholders: Vec<String> = opts
                        .tags
                        .iter()
                        .map(|tag| {
                            params.push(Box::new(tag.clone()));
                            format!("?{}", params.len())
                        })
                        .collect();
                    where_sql.push_str(&format!(
                        " AND EXISTS (SELECT 1 FROM json_each(n.tags) AS je WHERE je.value IN ({}))",
                        placeholders.join(", ")
                    ));
                }

                let query_started = Instant::now();
                let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();

                let total_count: i64 = conn
                    .query_row(
                        &format!(
                            "SELECT COUNT(*) FROM notes_fts JOIN notes n ON n.uid = notes_fts.uid
                             WHERE {where_sql}"
                        ),
                        refs.as_slice(),
                        |row| row.get(0),
                    )
                    .map_err(|err| query_error("search count", err))?;

                let sql = format!(
                    "SELECT notes_fts.uid, n.title, n.category, n.file_path,
                            snippet(notes_fts, -1, '[', ']', '…', 12),
                            bm25(notes_fts)
                     FROM notes_fts JOIN notes n ON n.uid = notes_fts.uid
                     WHERE {where_sql}
                     ORDER BY bm25(notes_fts)
                     LIMIT {} OFFSET {}",
                    opts.limit.max(1),
                    opts.offset
                );
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|err| query_error("prepare search", err))?;
                let query_ms = query_started.elapsed().as_millis() as u64;

                let processing_started = Instant::now();
                let results = stmt
                    .query_map(refs.as_slice(), |row| {
                        Ok(SearchHit {
                            uid: row.get(0)?,
                            title: row.get(1)?,
                            category: row.get(2)?,
                            file_path: row.get(3)?,
                            snippet: row.get(4)?,
                            // bm25 is smaller-is-better; flip so bigger is better
                            score: -row.get::<_, f64>(5)?,
                        })
                    })
                    .map_err(|err| query_error("run search", err))?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(|err| query_error("collect search rows", err))?;
                let processing_ms = processing_started.elapsed().as_millis() as u64;

                Ok(SearchResponse {
                    results,
                    total_count: total_count as usize,
                    query_ms,
                    processing_ms,
                    total_ms: 0,
                    cache_hit: false,
                })
            })
            .await?;

        Ok(SearchResponse {
            total_ms: started.elapsed().as_millis() as u64,
            ..response
        })
    }

    /// Filtered, paginated listing from the `notes` table, with the
    /// total (pre-pagination) count.
    pub async fn list_notes(&self, opts: ListOptions) -> Result<(Vec<IndexedNote>, usize)> {
        self.call(move |conn| {
            let mut clauses: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn ToSql + Send>> = Vec::new();

            if let Some(category) = &opts.category {
                params.push(Box::new(category.clone()));
                clauses.push(format!("category = ?{}", params.len()));
            }
            if let Some(project) = &opts.project {
                params.push(Box::new(project.clone()));
                clauses.push(format!("project = ?{}", params.len()));
            }
            if !opts.tags.is_empty() {
                let placeholders: Vec<String> = opts
                    .tags
                    .iter()
                    .map(|tag| {
                        params.push(Box::new(tag.clone()));
                        format!("?{}", params.len())
                    })
                    .collect();
                clauses.push(format!(
                    "EXISTS (SELECT 1 FROM json_each(tags) AS je WHERE je.value IN ({}))",
                    placeholders.join(", ")
                ));
            }

            let where_sql = if clauses.is_empty() {
                String::new()
            } else {
                format!("WHERE {}", clauses.join(" AND "))
            };
            let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref() as &dyn ToSql).collect();

            let total: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM notes {where_sql}"),
                    refs.as_slice(),
                    |row| row.get(0),
                )
                .map_err(|err| query_error("list count", err))?;

            let sql = format!(
                "SELECT {NOTE_COLUMNS} FROM notes {where_sql}
                 ORDER BY {} {}
                 LIMIT {} OFFSET {}",
                opts.sort_by.column(),
                opts.sort_order.keyword(),
                opts.limit,
                opts.offset
            );
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|err| query_error("prepare list", err))?;
            let notes = stmt
                .query_map(refs.as_slice(), indexed_note_from_row)
                .map_err(|err| query_error("run list", err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| query_error("collect list rows", err))?;

            Ok((notes, total as usize))
        })
        .await
    }

    /// All `(uid, content_hash)` pairs, for disk reconciliation.
    pub async fn note_hashes(&self) -> Result<Vec<(String, String)>> {
        self.call(move |conn| {
            let mut stmt = conn
                .prepare("SELECT uid, content_hash FROM notes")
                .map_err(|err| query_error("prepare hashes", err))?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(|err| query_error("run hashes", err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| query_error("collect hashes", err))
        })
        .await
    }

    /// Fetch one indexed note by UID.
    pub async fn get_note(&self, uid: &str) -> Result<Option<IndexedNote>> {
        let uid = uid.to_string();
        self.call(move |conn| {
            conn.query_row(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE uid = ?1"),
                [&uid],
                indexed_note_from_row,
            )
            .optional()
            .map_err(|err| query_error("get note", err))
        })
        .await
    }

    /// Link rows pointing at `uid`. Sources may reference targets that
    /// no longer exist; callers tolerate that.
    pub async fn get_backlinks(&self, uid: &str) -> Result<Vec<LinkRow>> {
        self.link_rows("SELECT source_uid, target_uid, link_type, strength, first_seen, last_seen
                        FROM links WHERE target_uid = ?1 ORDER BY source_uid", uid)
            .await
    }

    /// Link rows originating at `uid`.
    pub async fn get_outgoing_links(&self, uid: &str) -> Result<Vec<LinkRow>> {
        self.link_rows("SELECT source_uid, target_uid, link_type, strength, first_seen, last_seen
                        FROM links WHERE source_uid = ?1 ORDER BY target_uid", uid)
            .await
    }

    /// Distinct UIDs connected to `uid` in either direction.
    pub async fn get_connected_nodes(&self, uid: &str) -> Result<Vec<String>> {
        let uid = uid.to_string();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT target_uid FROM links WHERE source_uid = ?1
                     UNION
                     SELECT DISTINCT source_uid FROM links WHERE target_uid = ?1",
                )
                .map_err(|err| query_error("prepare connected nodes", err))?;
            stmt.query_map([&uid], |row| row.get(0))
                .map_err(|err| query_error("run connected nodes", err))?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(|err| query_error("collect connected nodes", err))
        })
        .await
    }

    /// Notes absent from both ends of the `links` table.
    pub async fn get_orphan_notes(&self) -> Result<Vec<IndexedNote>> {
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {NOTE_COLUMNS} FROM notes
                     WHERE uid NOT IN (SELECT source_uid FROM links)
                       AND uid NOT IN (SELECT target_uid FROM links)
                     ORDER BY updated DESC"
                ))
                .map_err(|err| query_error("prepare orphans", err))?;
            stmt.query_map([], indexed_note_from_row)
                .map_err(|err| query_error("run orphans", err))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|err| query_error("collect orphans", err))
        })
        .await
    }

    /// Merge the FTS structures and reclaim free pages; records the
    /// vacuum timestamp in `index_metadata`.
    pub async fn optimize(&self) -> Result<()> {
        self.call(move |conn| {
            conn.execute("INSERT INTO notes_fts(notes_fts) VALUES('optimize')", [])
                .map_err(|err| build_error("fts optimize", err))?;
            conn.execute_batch("VACUUM")
                .map_err(|err| build_error("vacuum", err))?;
            conn.execute(
                "INSERT INTO index_metadata(key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                rusqlite::params![schema::KEY_LAST_VACUUM, Utc::now().to_rfc3339()],
            )
            .map_err(|err| build_error("record vacuum timestamp", err))?;
            Ok(())
        })
        .await
    }

    /// SQLite and FTS integrity verification. `Ok(false)` means the
    /// database reported corruption.
    pub async fn integrity_check(&self) -> Result<bool> {
        self.call(move |conn| {
            let verdict: String = conn
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))
                .map_err(|err| query_error("integrity check", err))?;
            if verdict != "ok" {
                return Ok(false);
            }
            match conn.execute("INSERT INTO notes_fts(notes_fts) VALUES('integrity-check')", []) {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::DatabaseCorrupt =>
                {
                    Ok(false)
                }
                Err(err) => Err(query_error("fts integrity check", err)),
            }
        })
        .await
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        self.call(move |conn| {
            let note_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))
                .map_err(|err| query_error("count notes", err))?;
            let link_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM links", [], |row| row.get(0))
                .map_err(|err| query_error("count links", err))?;
            let schema_version = schema::read_version(conn)?.unwrap_or(0);
            let last_vacuum: Option<String> = conn
                .query_row(
                    "SELECT value FROM index_metadata WHERE key = ?1",
                    [schema::KEY_LAST_VACUUM],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|err| query_error("read last vacuum", err))?;

            Ok(IndexStats {
                note_count: note_count as usize,
                link_count: link_count as usize,
                schema_version,
                last_vacuum,
                db_size_bytes,
            })
        })
        .await
    }

    /// Flush the WAL ahead of shutdown.
    pub async fn close(&self) -> Result<()> {
        self.call(move |conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE)")
                .map_err(|err| query_error("wal checkpoint", err))
        })
        .await
    }

    async fn link_rows(&self, sql: &'static str, uid: &str) -> Result<Vec<LinkRow>> {
        let uid = uid.to_string();
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|err| query_error("prepare link query", err))?;
            stmt.query_map([&uid], |row| {
                Ok(LinkRow {
                    source_uid: row.get(0)?,
                    target_uid: row.get(1)?,
                    link_type: row.get(2)?,
                    strength: row.get(3)?,
                    first_seen: row.get(4)?,
                    last_seen: row.get(5)?,
                })
            })
            .map_err(|err| query_error("run link query", err))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|err| query_error("collect link rows", err))
        })
        .await
    }
}

const NOTE_COLUMNS: &str =
    "uid, title, category, file_path, project, tags, content_hash, created, updated, indexed_at";

fn indexed_note_from_row(row: &rusqlite::Row) -> rusqlite::Result<IndexedNote> {
    let tags_json: String = row.get(5)?;
    Ok(IndexedNote {
        uid: row.get(0)?,
        title: row.get(1)?,
        category: row.get(2)?,
        file_path: row.get(3)?,
        project: row.get(4)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        content_hash: row.get(6)?,
        created: row.get(7)?,
        updated: row.get(8)?,
        indexed_at: row.get(9)?,
    })
}

/// Quote each whitespace token so FTS5 operators and punctuation in
/// user queries cannot break the MATCH expression.
fn fts_match_expr(query: &str) -> String {
    query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Outbound link rows for a note: front matter links first, then
/// body-extracted wiki and inline targets; one row per target.
fn link_rows_for(note: &Note) -> Vec<(String, &'static str)> {
    let mut seen = HashSet::new();
    let mut rows = Vec::new();
    let extracted = md_links::extract_links(&note.body);

    for target in &note.front.links {
        if seen.insert(target.clone()) {
            rows.push((target.clone(), "frontmatter"));
        }
    }
    for target in extracted.wiki {
        if seen.insert(target.clone()) {
            rows.push((target, "wiki"));
        }
    }
    for target in extracted.markdown {
        if seen.insert(target.clone()) {
            rows.push((target, "markdown"));
        }
    }
    rows
}

fn upsert_note(tx: &rusqlite::Transaction, note: &Note, file_path: &str) -> Result<()> {
    let markdown = note.to_markdown().map_err(ServerError::from)?;
    let tags_json = serde_json::to_string(&note.front.tags)
        .map_err(|err| ServerError::internal(format!("tags serialization failed: {err}")))?;
    let now = Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO notes (uid, title, category, file_path, project, tags, content_hash,
                            created, updated, indexed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(uid) DO UPDATE SET
             title = excluded.title,
             category = excluded.category,
             file_path = excluded.file_path,
             project = excluded.project,
             tags = excluded.tags,
             content_hash = excluded.content_hash,
             created = excluded.created,
             updated = excluded.updated,
             indexed_at = excluded.indexed_at",
        rusqlite::params![
            note.front.id,
            note.front.title,
            note.front.category.map(|c| c.as_str()),
            file_path,
            note.front.project,
            tags_json,
            content_hash(&markdown),
            note.front.created.to_rfc3339(),
            note.front.updated.to_rfc3339(),
            now,
        ],
    )
    .map_err(|err| build_error("upsert note row", err))?;

    tx.execute("DELETE FROM notes_fts WHERE uid = ?1", [&note.front.id])
        .map_err(|err| build_error("clear fts row", err))?;
    tx.execute(
        "INSERT INTO notes_fts (uid, title, content, tags, category, project)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            note.front.id,
            note.front.title,
            note.body,
            note.front.tags.join(" "),
            note.front.category.map(|c| c.as_str()),
            note.front.project,
        ],
    )
    .map_err(|err| build_error("insert fts row", err))?;

    for (target, link_type) in link_rows_for(note) {
        tx.execute(
            "INSERT INTO links (source_uid, target_uid, link_type, strength, first_seen, last_seen)
             VALUES (?1, ?2, ?3, 1.0, ?4, ?4)
             ON CONFLICT(source_uid, target_uid, link_type)
             DO UPDATE SET last_seen = excluded.last_seen",
            rusqlite::params![note.front.id, target, link_type, now],
        )
        .map_err(|err| build_error("upsert link row", err))?;
    }
    tx.execute(
        "DELETE FROM links WHERE source_uid = ?1 AND last_seen <> ?2",
        rusqlite::params![note.front.id, now],
    )
    .map_err(|err| build_error("prune stale link rows", err))?;

    Ok(())
}

fn build_error(context: &str, err: rusqlite::Error) -> ServerError {
    ServerError::new(ErrorCode::IndexBuildError, format!("{context}: {err}"))
}

fn query_error(context: &str, err: rusqlite::Error) -> ServerError {
    ServerError::new(ErrorCode::IndexQueryError, format!("{context}: {err}"))
}
