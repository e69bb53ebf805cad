//! Filesystem note store.
//!
//! Notes are Markdown files under the vault root. Writes go through a
//! temp-file-plus-rename so readers never observe a half-written note.
//! Transient I/O failures (fd exhaustion, busy files) are retried here
//! with a short backoff; everything else fails fast.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use md_links::LinkKind;
use rand::Rng;
use sha2::{Digest, Sha256};
use tokio::fs;
use vault_notes::uid::uid_from_file_name;
use vault_notes::{note_file_name, Note, NoteError};

use crate::error::{ErrorCode, Result, ServerError};

/// Default number of context lines above and below a backlink match.
pub const DEFAULT_CONTEXT_LINES: usize = 2;

/// Default worker bound for vault scans.
pub const DEFAULT_SCAN_CONCURRENCY: usize = 8;

const TRANSIENT_ATTEMPTS: u32 = 3;
const TRANSIENT_BASE_DELAY: Duration = Duration::from_millis(100);
const TRANSIENT_MAX_DELAY: Duration = Duration::from_secs(1);

/// A note that links to some target, with the lines around each match.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Backlink {
    pub source_uid: String,
    pub source_title: String,
    pub source_path: PathBuf,
    pub contexts: Vec<BacklinkContext>,
}

/// One body match for a backlink: 1-based line number, link syntax,
/// and the surrounding lines.
#[derive(Debug, Clone, serde::Serialize)]
pub struct BacklinkContext {
    pub line: usize,
    pub kind: LinkKind,
    pub snippet: String,
}

pub struct NoteStore {
    vault_path: PathBuf,
}

impl NoteStore {
    pub fn new(vault_path: PathBuf) -> Self {
        Self { vault_path }
    }

    pub fn vault_path(&self) -> &Path {
        &self.vault_path
    }

    /// The canonical file path for a note (vault root joined with the
    /// sanitized-title-plus-uid file name).
    pub fn note_path(&self, note: &Note) -> PathBuf {
        self.vault_path
            .join(note_file_name(&note.front.title, &note.front.id))
    }

    /// Strict load: parse errors and missing files surface as errors.
    pub async fn load(&self, path: &Path) -> Result<Note> {
        let raw = self.read_to_string(path).await?;
        Note::parse(&raw).map_err(|err| front_matter_error(path, err))
    }

    /// Lenient load: missing or invalid front matter fields are
    /// replaced with defaults and logged as warnings.
    pub async fn load_lenient(&self, path: &Path) -> Result<Note> {
        let raw = self.read_to_string(path).await?;
        let lenient = Note::parse_lenient(&raw);
        for warning in &lenient.warnings {
            tracing::warn!(path = %path.display(), %warning, "lenient note load");
        }
        Ok(lenient.note)
    }

    /// Save a note at its canonical path, refreshing `updated`.
    pub async fn save(&self, note: &mut Note) -> Result<PathBuf> {
        let path = self.note_path(note);
        self.save_at(note, &path).await?;
        Ok(path)
    }

    /// Save a note at an explicit path, refreshing `updated`. Parent
    /// directories are created as needed.
    pub async fn save_at(&self, note: &mut Note, path: &Path) -> Result<()> {
        note.front.updated = Utc::now();
        note.front.normalize();
        let content = note.to_markdown().map_err(ServerError::from)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|err| {
                ServerError::new(
                    ErrorCode::FileWriteError,
                    format!("cannot create {}: {err}", parent.display()),
                )
            })?;
        }

        atomic_write(path, &content).await.map_err(|err| {
            ServerError::new(
                ErrorCode::FileWriteError,
                format!("failed to write {}: {err}", path.display()),
            )
        })
    }

    /// Delete a note file. A missing file counts as success.
    pub async fn delete(&self, path: &Path) -> Result<()> {
        match with_transient_retry(|| fs::remove_file(path)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ServerError::new(
                ErrorCode::FileWriteError,
                format!("failed to delete {}: {err}", path.display()),
            )),
        }
    }

    /// Find the note with the given UID. The first match (in sorted
    /// path order) wins; duplicates are reported.
    pub async fn find_by_uid(&self, uid: &str) -> Result<Option<(PathBuf, Note)>> {
        let files = self.scan_files().await?;

        // Fast path: the uid sits at the filename tail. Only taken
        // when exactly one file claims it, so duplicate uids still go
        // through the reporting scan below.
        let claimed: Vec<PathBuf> = files
            .iter()
            .filter(|path| {
                path.file_name()
                    .map(|n| uid_from_file_name(&n.to_string_lossy()) == Some(uid))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if let [path] = claimed.as_slice() {
            if let Ok(note) = self.load_lenient(path).await {
                if note.front.id == uid {
                    return Ok(Some((path.clone(), note)));
                }
            }
        }

        let mut matches = Vec::new();
        for path in files {
            let note = match self.load_lenient(&path).await {
                Ok(note) => note,
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "skipping unreadable note");
                    continue;
                }
            };
            if note.front.id == uid {
                matches.push((path, note));
            }
        }

        if matches.len() > 1 {
            let paths: Vec<String> = matches
                .iter()
                .map(|(p, _)| p.display().to_string())
                .collect();
            tracing::warn!(uid, ?paths, "duplicate uid, first match wins");
        }

        Ok(matches.into_iter().next())
    }

    /// Load every note in the vault with a bounded worker count.
    ///
    /// With `skip_invalid`, malformed files are logged and dropped;
    /// otherwise the first parse error aborts the scan.
    pub async fn load_all(
        &self,
        skip_invalid: bool,
        concurrency: usize,
    ) -> Result<Vec<(PathBuf, Note)>> {
        let files = self.scan_files().await?;
        let concurrency = concurrency.max(1);

        let loaded: Vec<(PathBuf, Result<Note>)> = stream::iter(files)
            .map(|path| async move {
                let result = self.load(&path).await;
                (path, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut notes = Vec::with_capacity(loaded.len());
        for (path, result) in loaded {
            match result {
                Ok(note) => notes.push((path, note)),
                Err(err) if skip_invalid => {
                    tracing::warn!(path = %path.display(), %err, "skipping malformed note");
                }
                Err(err) => return Err(err),
            }
        }

        notes.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(notes)
    }

    /// A note path relative to the vault root, as stored in index rows.
    pub fn rel_path(&self, path: &Path) -> String {
        path.strip_prefix(&self.vault_path)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    /// Recursively list `*.md` files, skipping dot-prefixed entries.
    pub async fn scan_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![self.vault_path.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = with_transient_retry(|| fs::read_dir(&dir))
                .await
                .map_err(|err| scan_error(&dir, err))?;

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|err| scan_error(&dir, err))?
            {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await.map_err(|err| scan_error(&dir, err))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() && name.to_string_lossy().ends_with(".md") {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }

    async fn read_to_string(&self, path: &Path) -> Result<String> {
        with_transient_retry(|| fs::read_to_string(path))
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    ServerError::new(
                        ErrorCode::FileNotFound,
                        format!("no such note file: {}", path.display()),
                    )
                } else {
                    ServerError::new(
                        ErrorCode::FileReadError,
                        format!("failed to read {}: {err}", path.display()),
                    )
                }
            })
    }
}

/// SHA-256 of note content, hex-encoded. Stored in the index to
/// detect drift between disk and index rows.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

fn front_matter_error(path: &Path, err: NoteError) -> ServerError {
    let mut server_err = ServerError::from(err);
    server_err = server_err.with_metadata("path", serde_json::json!(path.display().to_string()));
    server_err
}

fn scan_error(dir: &Path, err: std::io::Error) -> ServerError {
    ServerError::new(
        ErrorCode::FileReadError,
        format!("failed to scan {}: {err}", dir.display()),
    )
}

/// Write via a sibling temp file (`.{target}.tmp.{epoch-ms}.{random}`)
/// and rename over the target. On any failure the temp file is
/// unlinked and the original error surfaces.
async fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_name = format!(
        ".{file_name}.tmp.{}.{}",
        Utc::now().timestamp_millis(),
        random_hex()
    );
    let temp_path = path.with_file_name(temp_name);

    if let Err(err) = with_transient_retry(|| fs::write(&temp_path, content)).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }

    if let Err(err) = with_transient_retry(|| fs::rename(&temp_path, path)).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err);
    }

    Ok(())
}

fn random_hex() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    hex::encode(bytes)
}

/// Retry an I/O operation on transient failures, up to 3 attempts
/// with 100 ms exponential backoff capped at 1 s.
async fn with_transient_retry<T, F, Fut>(mut op: F) -> std::io::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::io::Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < TRANSIENT_ATTEMPTS && is_transient(&err) => {
                let delay = TRANSIENT_BASE_DELAY * 2u32.pow(attempt - 1);
                tokio::time::sleep(delay.min(TRANSIENT_MAX_DELAY)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_transient(err: &std::io::Error) -> bool {
    if matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::Interrupted
    ) {
        return true;
    }
    // EMFILE(24)/ENFILE(23)/EBUSY(16)/EAGAIN(11, 35 on macOS) have no
    // stable ErrorKind mapping
    matches!(err.raw_os_error(), Some(11 | 16 | 23 | 24 | 35))
}

/// Lines around every body occurrence of `target_uid`, tagged with
/// the link syntax that referenced it. A reference that only lives in
/// the front matter `links` array yields no snippets.
pub fn context_snippets(body: &str, target_uid: &str, context_lines: usize) -> Vec<BacklinkContext> {
    let lines: Vec<&str> = body.lines().collect();
    let wiki_open = format!("[[{target_uid}");
    let md_target = format!("({target_uid})");
    let mut contexts = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        let kind = if line.contains(&wiki_open) {
            Some(LinkKind::Wiki)
        } else if line.contains(&md_target) {
            Some(LinkKind::Markdown)
        } else {
            None
        };
        let Some(kind) = kind else { continue };

        let start = i.saturating_sub(context_lines);
        let end = (i + context_lines).min(lines.len().saturating_sub(1));
        contexts.push(BacklinkContext {
            line: i + 1,
            kind,
            snippet: lines[start..=end].join("\n"),
        });
    }

    contexts
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vault_notes::{mint_uid, FrontMatter};

    fn new_note(title: &str, body: &str) -> Note {
        Note::new(FrontMatter::new(mint_uid(), title.to_string()), body.to_string())
    }

    fn store_in(dir: &TempDir) -> NoteStore {
        NoteStore::new(dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut note = new_note("Round Trip", "Body text\n");
        let before = note.front.updated;
        let path = store.save(&mut note).await.unwrap();

        let loaded = store.load(&path).await.unwrap();
        assert_eq!(loaded.body, "Body text\n");
        assert_eq!(loaded.front.id, note.front.id);
        assert!(loaded.front.updated >= before);
    }

    #[tokio::test]
    async fn save_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut note = new_note("Clean", "body");
        store.save(&mut note).await.unwrap();

        let mut entries = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        assert!(
            entries.iter().all(|name| !name.contains(".tmp.")),
            "temp file left behind: {entries:?}"
        );
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn delete_missing_file_is_success() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        store
            .delete(&temp.path().join("does-not-exist.md"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn load_missing_file_is_file_not_found() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let err = store.load(&temp.path().join("nope.md")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::FileNotFound);
    }

    #[tokio::test]
    async fn find_by_uid_returns_first_match() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut a = new_note("Alpha", "a");
        let mut b = new_note("Beta", "b");
        store.save(&mut a).await.unwrap();
        store.save(&mut b).await.unwrap();

        let (path, found) = store.find_by_uid(&b.front.id).await.unwrap().unwrap();
        assert_eq!(found.front.title, "Beta");
        assert!(path.ends_with(note_file_name("Beta", &b.front.id)));

        assert!(store.find_by_uid("20000101T000000000000Z").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_all_skips_invalid_when_asked() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut good = new_note("Good", "ok");
        store.save(&mut good).await.unwrap();
        std::fs::write(temp.path().join("broken.md"), "no front matter here").unwrap();

        let notes = store.load_all(true, 4).await.unwrap();
        assert_eq!(notes.len(), 1);

        let err = store.load_all(false, 4).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFrontMatter);
    }

    #[tokio::test]
    async fn scan_skips_hidden_directories() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut note = new_note("Visible", "v");
        store.save(&mut note).await.unwrap();

        std::fs::create_dir_all(temp.path().join(".zettel")).unwrap();
        std::fs::write(temp.path().join(".zettel/hidden.md"), "x").unwrap();

        let files = store.scan_files().await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn context_snippets_tag_line_and_kind() {
        let uid = "20240101T000000000001Z";
        let body = format!("intro line\nsee [[{uid}]] here\noutro line\n");

        let contexts = context_snippets(&body, uid, 1);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts[0].line, 2);
        assert_eq!(contexts[0].kind, LinkKind::Wiki);
        assert!(contexts[0].snippet.contains("intro line"));
        assert!(contexts[0].snippet.contains("outro line"));

        let inline = format!("a [link]({uid}) here");
        let contexts = context_snippets(&inline, uid, 2);
        assert_eq!(contexts[0].kind, LinkKind::Markdown);
    }

    #[test]
    fn context_snippets_without_body_reference_are_empty() {
        assert!(context_snippets("no reference here", "20240101T000000000001Z", 2).is_empty());
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let a = content_hash("same");
        let b = content_hash("same");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }
}
