//! The memory index proper: fingerprint-driven sync, cosine search, and
//! windowed source reads.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use moobot_core::config::MemoryConfig;
use moobot_model::Embedder;

use crate::chunk::Chunker;
use crate::db::{blob_to_vec, init_db, vec_to_blob};
use crate::error::{MemoryError, Result};
use crate::types::{MemoryChunk, SearchHit, SearchOptions, SyncReport};

/// Directories processed per progress checkpoint during filesystem walks.
const FS_BATCH: usize = 32;
/// Snippet cap for search results.
const SNIPPET_CHARS: usize = 400;

pub struct MemoryIndex {
    db: Mutex<Connection>,
    embedder: Arc<dyn Embedder>,
    chunker: Chunker,
    workspace: PathBuf,
    filesystem_roots: Vec<PathBuf>,
    tz: Tz,
    default_k: usize,
    default_min_score: f32,
}

impl MemoryIndex {
    pub fn open(
        index_path: &Path,
        workspace: PathBuf,
        embedder: Arc<dyn Embedder>,
        cfg: &MemoryConfig,
        tz: Tz,
    ) -> Result<Self> {
        let conn = Connection::open(index_path)?;
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            embedder,
            chunker: Chunker::new(cfg.chunking.target_tokens, cfg.chunking.overlap_tokens),
            workspace,
            filesystem_roots: cfg.sync.filesystem_roots.iter().map(PathBuf::from).collect(),
            tz,
            default_k: cfg.search.k,
            default_min_score: cfg.search.min_score,
        })
    }

    // -----------------------------------------------------------------
    // Store primitives
    // -----------------------------------------------------------------

    /// Insert or replace one chunk. Guards the embedding dimension: the
    /// first write pins it, later mismatches are rejected.
    pub fn upsert(&self, chunk: &MemoryChunk) -> Result<()> {
        let conn = self.db.lock().unwrap();
        check_dimension(&conn, chunk.embedding.len())?;
        conn.execute(
            "INSERT OR REPLACE INTO chunks
             (path, chunk_index, start_line, end_line, text, embedding, source_date)
             VALUES (?1,?2,?3,?4,?5,?6,?7)",
            rusqlite::params![
                chunk.path,
                chunk.chunk_index as i64,
                chunk.start_line as i64,
                chunk.end_line as i64,
                chunk.text,
                vec_to_blob(&chunk.embedding),
                chunk.source_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }

    /// Remove every chunk (and fingerprint) whose path starts with `prefix`.
    pub fn delete_by_prefix(&self, prefix: &str) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        let pattern = format!(
            "{}%",
            prefix
                .replace('\\', "\\\\")
                .replace('%', "\\%")
                .replace('_', "\\_")
        );
        let n = conn.execute(
            "DELETE FROM chunks WHERE path LIKE ?1 ESCAPE '\\'",
            [&pattern],
        )?;
        conn.execute(
            "DELETE FROM fingerprints WHERE path LIKE ?1 ESCAPE '\\'",
            [&pattern],
        )?;
        Ok(n)
    }

    // -----------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------

    /// Walk all sources, re-index what changed, prune what disappeared.
    pub async fn sync(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for rel in self.note_paths() {
            self.sync_full_file(&rel, &mut report).await?;
        }
        for rel in self.chat_log_paths() {
            self.sync_tailed_file(&rel, &mut report).await?;
        }
        let roots = self.filesystem_roots.clone();
        for root in &roots {
            self.sync_filesystem_root(root, &mut report).await?;
        }
        self.prune_missing(&mut report)?;

        info!(
            upserted = report.upserted_chunks,
            deleted = report.deleted_paths,
            embedded = report.embedded_texts,
            "memory sync complete"
        );
        Ok(report)
    }

    fn note_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        if self.workspace.join("MEMORY.md").is_file() {
            paths.push("MEMORY.md".to_string());
        }
        if let Ok(entries) = std::fs::read_dir(self.workspace.join("memory")) {
            let mut names: Vec<String> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"))
                .filter_map(|e| e.file_name().to_str().map(|n| format!("memory/{n}")))
                .collect();
            names.sort();
            paths.extend(names);
        }
        paths
    }

    /// Day aggregates plus per-chat tails. Group logs are deliberately not
    /// indexed; group traffic never enters the private memory.
    fn chat_log_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for (dir, prefix) in [
            (self.workspace.join("chat-log"), "chat-log"),
            (
                self.workspace.join("chat-log").join("private"),
                "chat-log/private",
            ),
        ] {
            if let Ok(entries) = std::fs::read_dir(dir) {
                let mut names: Vec<String> = entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jsonl"))
                    .filter_map(|e| e.file_name().to_str().map(|n| format!("{prefix}/{n}")))
                    .collect();
                names.sort();
                paths.extend(names);
            }
        }
        paths
    }

    /// Notes: any fingerprint change re-chunks the whole file.
    async fn sync_full_file(&self, rel: &str, report: &mut SyncReport) -> Result<()> {
        let abs = self.workspace.join(rel);
        let Some((mtime_ms, size)) = file_stamp(&abs) else {
            return Ok(());
        };
        if !self.fingerprint_changed(rel, mtime_ms, size)? {
            return Ok(());
        }

        let raw = std::fs::read_to_string(&abs)?;
        let lines: Vec<&str> = raw.lines().collect();
        let spans = self.chunker.chunk_lines(&lines, 1);
        let source_date = Some(self.stamp_date(mtime_ms));

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let vectors = self.embed_batch(&texts, report).await?;

        {
            let conn = self.db.lock().unwrap();
            conn.execute("DELETE FROM chunks WHERE path = ?1", [rel])?;
        }
        for (i, (span, vec)) in spans.iter().zip(vectors).enumerate() {
            self.upsert(&MemoryChunk {
                path: rel.to_string(),
                chunk_index: i,
                start_line: span.start_line,
                end_line: span.end_line,
                text: span.text.clone(),
                embedding: vec,
                source_date,
            })?;
            report.upserted_chunks += 1;
        }
        self.store_fingerprint(rel, mtime_ms, size, lines.len())?;
        debug!(path = rel, chunks = spans.len(), "note re-indexed");
        Ok(())
    }

    /// Chat logs: append-only, so only lines past the stored cursor are
    /// chunked. A shrunken file (rotation) falls back to a full re-index.
    async fn sync_tailed_file(&self, rel: &str, report: &mut SyncReport) -> Result<()> {
        let abs = self.workspace.join(rel);
        let Some((mtime_ms, size)) = file_stamp(&abs) else {
            return Ok(());
        };
        if !self.fingerprint_changed(rel, mtime_ms, size)? {
            return Ok(());
        }
        let last_line = self.stored_last_line(rel)?;

        let raw = std::fs::read_to_string(&abs)?;
        let lines: Vec<&str> = raw.lines().collect();

        if lines.len() < last_line {
            warn!(path = rel, "chat log shrank, re-indexing from scratch");
            self.delete_by_prefix(rel)?;
            report.deleted_paths += 1;
            return Box::pin(self.sync_tailed_file(rel, report)).await;
        }

        let fresh = &lines[last_line..];
        let spans = self.chunker.chunk_lines(fresh, last_line + 1);
        let source_date = Some(
            date_from_file_name(rel).unwrap_or_else(|| self.stamp_date(mtime_ms)),
        );

        let texts: Vec<String> = spans.iter().map(|s| s.text.clone()).collect();
        let vectors = self.embed_batch(&texts, report).await?;

        let next_index = self.next_chunk_index(rel)?;
        for (i, (span, vec)) in spans.iter().zip(vectors).enumerate() {
            self.upsert(&MemoryChunk {
                path: rel.to_string(),
                chunk_index: next_index + i,
                start_line: span.start_line,
                end_line: span.end_line,
                text: span.text.clone(),
                embedding: vec,
                source_date,
            })?;
            report.upserted_chunks += 1;
        }
        self.store_fingerprint(rel, mtime_ms, size, lines.len())?;
        debug!(path = rel, new_chunks = spans.len(), "chat log tailed");
        Ok(())
    }

    /// Filesystem listings: one chunk per directory, walked in sorted order
    /// with a persisted cursor so a crash resumes from the last batch.
    async fn sync_filesystem_root(&self, root: &Path, report: &mut SyncReport) -> Result<()> {
        if !root.is_dir() {
            return Ok(());
        }
        let root_key = root.to_string_lossy().into_owned();
        let dirs = collect_dirs_sorted(root);
        let cursor = self.load_cursor(&root_key)?;
        let resume_at = cursor
            .as_deref()
            .and_then(|c| dirs.iter().position(|d| d.to_string_lossy() == c))
            .map(|i| i + 1)
            .unwrap_or(0);

        for batch in dirs[resume_at..].chunks(FS_BATCH) {
            for dir in batch {
                self.sync_one_listing(root, dir, report).await?;
            }
            if let Some(last) = batch.last() {
                self.store_cursor(&root_key, &last.to_string_lossy())?;
            }
        }
        self.clear_cursor(&root_key)?;
        Ok(())
    }

    async fn sync_one_listing(
        &self,
        root: &Path,
        dir: &Path,
        report: &mut SyncReport,
    ) -> Result<()> {
        let rel = listing_path(root, dir);
        let Some((mtime_ms, _)) = file_stamp(dir) else {
            return Ok(());
        };
        let entries = list_entries(dir);
        let size = entries.len() as u64;
        if !self.fingerprint_changed(&rel, mtime_ms, size)? {
            return Ok(());
        }

        let text = format!("{}\n{}", rel, entries.join("\n"));
        let vectors = self.embed_batch(std::slice::from_ref(&text), report).await?;
        self.upsert(&MemoryChunk {
            path: rel.clone(),
            chunk_index: 0,
            start_line: 1,
            end_line: entries.len().max(1),
            text,
            embedding: vectors.into_iter().next().unwrap_or_default(),
            source_date: Some(self.stamp_date(mtime_ms)),
        })?;
        report.upserted_chunks += 1;
        self.store_fingerprint(&rel, mtime_ms, size, 0)?;
        Ok(())
    }

    /// Drop chunks whose source no longer exists.
    fn prune_missing(&self, report: &mut SyncReport) -> Result<()> {
        let paths: Vec<String> = {
            let conn = self.db.lock().unwrap();
            let mut stmt = conn.prepare("SELECT path FROM fingerprints")?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };
        for path in paths {
            if !self.source_exists(&path) {
                self.delete_by_prefix(&path)?;
                report.deleted_paths += 1;
                debug!(path, "source gone, chunks pruned");
            }
        }
        Ok(())
    }

    async fn embed_batch(&self, texts: &[String], report: &mut SyncReport) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        report.embedded_texts += texts.len();
        Ok(self.embedder.embed(texts).await?)
    }

    // -----------------------------------------------------------------
    // Search
    // -----------------------------------------------------------------

    pub async fn search(&self, query: &str, opts: &SearchOptions) -> Result<Vec<SearchHit>> {
        let window = self.resolve_window(opts)?;
        let min_score = opts.min_score.unwrap_or(self.default_min_score);
        let k = opts.k.unwrap_or(self.default_k);

        let query_vec = self
            .embedder
            .embed(std::slice::from_ref(&query.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let rows: Vec<(String, usize, usize, String, Vec<f32>, Option<NaiveDate>)> = {
            let conn = self.db.lock().unwrap();
            let mut stmt = conn.prepare(
                "SELECT path, start_line, end_line, text, embedding, source_date FROM chunks",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)? as usize,
                        row.get::<_, i64>(2)? as usize,
                        row.get::<_, String>(3)?,
                        blob_to_vec(&row.get::<_, Vec<u8>>(4)?),
                        row.get::<_, Option<String>>(5)?
                            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
                    ))
                })?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        let mut hits: Vec<SearchHit> = rows
            .into_iter()
            .filter_map(|(path, start_line, end_line, text, vec, date)| {
                if let Some((from, to)) = window {
                    // Undated chunks never match a dated query.
                    let d = date?;
                    if d < from || d > to {
                        return None;
                    }
                }
                let score = cosine(&query_vec, &vec);
                if score < min_score || !self.source_exists(&path) {
                    return None;
                }
                let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
                Some(SearchHit {
                    path,
                    start_line,
                    end_line,
                    snippet,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }

    /// Read a line window from an indexed source. Only notes and chat logs
    /// are readable; filesystem listings are search-only.
    pub fn read_file(&self, path: &str, from: Option<usize>, lines: Option<usize>) -> Result<String> {
        if path.starts_with("filesystem") {
            return Err(MemoryError::NotReadable(path.to_string()));
        }
        let rel = Path::new(path);
        if rel.is_absolute()
            || rel
                .components()
                .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(MemoryError::NotReadable(path.to_string()));
        }
        let raw = std::fs::read_to_string(self.workspace.join(rel))?;
        let all: Vec<&str> = raw.lines().collect();
        let start = from.unwrap_or(1).saturating_sub(1).min(all.len());
        let count = lines.unwrap_or(100);
        Ok(all[start..(start + count).min(all.len())].join("\n"))
    }

    // -----------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------

    fn fingerprint_changed(&self, rel: &str, mtime_ms: i64, size: u64) -> Result<bool> {
        let conn = self.db.lock().unwrap();
        let stored: Option<(i64, i64)> = conn
            .query_row(
                "SELECT mtime_ms, size FROM fingerprints WHERE path = ?1",
                [rel],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .ok();
        Ok(stored != Some((mtime_ms, size as i64)))
    }

    fn stored_last_line(&self, rel: &str) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT last_line FROM fingerprints WHERE path = ?1",
                [rel],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize)
    }

    fn store_fingerprint(&self, rel: &str, mtime_ms: i64, size: u64, last_line: usize) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO fingerprints (path, mtime_ms, size, last_line)
             VALUES (?1,?2,?3,?4)",
            rusqlite::params![rel, mtime_ms, size as i64, last_line as i64],
        )?;
        Ok(())
    }

    fn next_chunk_index(&self, rel: &str) -> Result<usize> {
        let conn = self.db.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT COALESCE(MAX(chunk_index) + 1, 0) FROM chunks WHERE path = ?1",
                [rel],
                |row| row.get::<_, i64>(0),
            )
            .unwrap_or(0) as usize)
    }

    fn load_cursor(&self, source: &str) -> Result<Option<String>> {
        let conn = self.db.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT cursor FROM sync_progress WHERE source = ?1",
                [source],
                |row| row.get(0),
            )
            .ok())
    }

    fn store_cursor(&self, source: &str, cursor: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO sync_progress (source, cursor) VALUES (?1,?2)",
            [source, cursor],
        )?;
        Ok(())
    }

    fn clear_cursor(&self, source: &str) -> Result<()> {
        let conn = self.db.lock().unwrap();
        conn.execute("DELETE FROM sync_progress WHERE source = ?1", [source])?;
        Ok(())
    }

    fn source_exists(&self, path: &str) -> bool {
        if let Some(rel) = path.strip_prefix("filesystem") {
            let rel = rel.trim_start_matches('/');
            return self.filesystem_roots.iter().any(|root| {
                if rel.is_empty() {
                    root.is_dir()
                } else {
                    root.join(rel).is_dir()
                }
            });
        }
        self.workspace.join(path).is_file()
    }

    fn stamp_date(&self, mtime_ms: i64) -> NaiveDate {
        Utc.timestamp_millis_opt(mtime_ms)
            .single()
            .unwrap_or_else(Utc::now)
            .with_timezone(&self.tz)
            .date_naive()
    }

    fn resolve_window(&self, opts: &SearchOptions) -> Result<Option<(NaiveDate, NaiveDate)>> {
        if opts.date_from.is_some() || opts.date_to.is_some() {
            let from = opts.date_from.unwrap_or(NaiveDate::MIN);
            let to = opts.date_to.unwrap_or(NaiveDate::MAX);
            return Ok(Some((from, to)));
        }
        let Some(ref range) = opts.date_range else {
            return Ok(None);
        };
        let today = Utc::now().with_timezone(&self.tz).date_naive();
        let window = match range.as_str() {
            "yesterday" => {
                let y = today - chrono::Duration::days(1);
                (y, y)
            }
            "last_week" | "last_7_days" => (today - chrono::Duration::days(7), today),
            "last_month" => (today - chrono::Duration::days(30), today),
            other => {
                return Err(MemoryError::InvalidDateFilter(format!(
                    "unknown date_range \"{other}\""
                )))
            }
        };
        Ok(Some(window))
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

fn check_dimension(conn: &Connection, dim: usize) -> Result<()> {
    let stored: Option<String> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'embedding_dim'",
            [],
            |row| row.get(0),
        )
        .ok();
    match stored.and_then(|s| s.parse::<usize>().ok()) {
        Some(stored) if stored != dim => Err(MemoryError::DimensionMismatch { stored, got: dim }),
        Some(_) => Ok(()),
        None => {
            conn.execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES ('embedding_dim', ?1)",
                [dim.to_string()],
            )?;
            Ok(())
        }
    }
}

fn file_stamp(path: &Path) -> Option<(i64, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()?
        .duration_since(std::time::UNIX_EPOCH)
        .ok()?;
    Some((mtime.as_millis() as i64, meta.len()))
}

/// `chat-log/2026-03-01.jsonl` → 2026-03-01.
fn date_from_file_name(rel: &str) -> Option<NaiveDate> {
    let stem = Path::new(rel).file_stem()?.to_str()?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}

fn listing_path(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => "filesystem/".to_string(),
        Ok(rel) => format!("filesystem/{}", rel.to_string_lossy()),
        Err(_) => "filesystem/".to_string(),
    }
}

fn collect_dirs_sorted(root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![root.to_path_buf()];
    let mut i = 0;
    while i < dirs.len() {
        if let Ok(entries) = std::fs::read_dir(&dirs[i]) {
            let mut children: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            children.sort();
            dirs.extend(children);
        }
        i += 1;
    }
    dirs.sort();
    dirs
}

fn list_entries(dir: &Path) -> Vec<String> {
    let mut entries: Vec<String> = std::fs::read_dir(dir)
        .map(|rd| {
            rd.filter_map(|e| e.ok())
                .map(|e| {
                    let name = e.file_name().to_string_lossy().into_owned();
                    if e.path().is_dir() {
                        format!("{name}/")
                    } else {
                        name
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic letter-frequency embedder; close enough to rank
    /// overlapping texts above unrelated ones.
    struct BagOfLetters {
        calls: AtomicUsize,
    }

    impl BagOfLetters {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Embedder for BagOfLetters {
        async fn embed(&self, texts: &[String]) -> moobot_model::Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 27];
                    for c in t.to_lowercase().chars() {
                        if c.is_ascii_lowercase() {
                            v[(c as u8 - b'a') as usize] += 1.0;
                        } else if c.is_ascii_digit() {
                            v[26] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    fn index_with(dir: &Path) -> (MemoryIndex, Arc<BagOfLetters>) {
        let embedder = BagOfLetters::new();
        let cfg = MemoryConfig::default();
        let idx = MemoryIndex::open(
            &dir.join("memory.sqlite3"),
            dir.join("workspace"),
            embedder.clone(),
            &cfg,
            chrono_tz::UTC,
        )
        .unwrap();
        (idx, embedder)
    }

    fn write_note(dir: &Path, rel: &str, text: &str) {
        let path = dir.join("workspace").join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        write_note(tmp.path(), "MEMORY.md", "User prefers dark mode.\n");
        let (idx, embedder) = index_with(tmp.path());

        let first = idx.sync().await.unwrap();
        assert!(first.upserted_chunks > 0);
        assert!(first.embedded_texts > 0);

        let calls_after_first = embedder.calls.load(Ordering::SeqCst);
        let second = idx.sync().await.unwrap();
        assert_eq!(second.upserted_chunks, 0);
        assert_eq!(second.embedded_texts, 0);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn search_recalls_note_content() {
        let tmp = tempfile::tempdir().unwrap();
        write_note(tmp.path(), "memory/prefs.md", "User prefers dark mode.\n");
        write_note(tmp.path(), "memory/food.md", "Favourite soup: pumpkin.\n");
        let (idx, _) = index_with(tmp.path());
        idx.sync().await.unwrap();

        let hits = idx
            .search("what does the user prefer?", &SearchOptions::default())
            .await
            .unwrap();
        assert!(!hits.is_empty());
        assert!(hits[0].snippet.contains("dark mode"));
        assert!(hits[0].score >= 0.5);
    }

    #[tokio::test]
    async fn date_filter_excludes_other_days() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("workspace")).unwrap();
        write_note(tmp.path(), "MEMORY.md", "anchor note\n");
        let (idx, embedder) = index_with(tmp.path());
        idx.sync().await.unwrap();

        // A chunk dated long before any "yesterday" window.
        let vec = embedder
            .embed(&["meeting about dark mode".to_string()])
            .await
            .unwrap()
            .remove(0);
        idx.upsert(&MemoryChunk {
            path: "MEMORY.md".to_string(),
            chunk_index: 99,
            start_line: 1,
            end_line: 1,
            text: "meeting about dark mode".to_string(),
            embedding: vec,
            source_date: Some(NaiveDate::from_ymd_opt(2025, 2, 15).unwrap()),
        })
        .unwrap();

        let hits = idx
            .search(
                "dark mode",
                &SearchOptions {
                    date_range: Some("yesterday".to_string()),
                    min_score: Some(0.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(hits.iter().all(|h| !h.snippet.contains("meeting")));
    }

    #[tokio::test]
    async fn chat_log_tail_only_embeds_new_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("workspace/chat-log/2026-07-01.jsonl");
        std::fs::create_dir_all(log.parent().unwrap()).unwrap();
        std::fs::write(&log, "{\"user\":\"a\",\"assistant\":\"b\"}\n").unwrap();

        let (idx, _) = index_with(tmp.path());
        let first = idx.sync().await.unwrap();
        assert_eq!(first.upserted_chunks, 1);

        // Append one line; ensure the mtime stamp moves.
        std::thread::sleep(std::time::Duration::from_millis(20));
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new().append(true).open(&log).unwrap();
        writeln!(f, "{{\"user\":\"c\",\"assistant\":\"d\"}}").unwrap();
        drop(f);

        let second = idx.sync().await.unwrap();
        assert_eq!(second.upserted_chunks, 1);

        // Chunks accumulate under increasing indices, dated from the name.
        let hits = idx
            .search(
                "a b c d",
                &SearchOptions {
                    min_score: Some(0.0),
                    k: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn removed_source_is_pruned() {
        let tmp = tempfile::tempdir().unwrap();
        write_note(tmp.path(), "memory/tmp.md", "temporary fact\n");
        let (idx, _) = index_with(tmp.path());
        idx.sync().await.unwrap();

        std::fs::remove_file(tmp.path().join("workspace/memory/tmp.md")).unwrap();
        let report = idx.sync().await.unwrap();
        assert_eq!(report.deleted_paths, 1);

        let hits = idx
            .search(
                "temporary fact",
                &SearchOptions {
                    min_score: Some(0.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn filesystem_listings_index_and_refuse_read() {
        let tmp = tempfile::tempdir().unwrap();
        let tree = tmp.path().join("tree");
        std::fs::create_dir_all(tree.join("docs")).unwrap();
        std::fs::write(tree.join("docs/readme.txt"), "x").unwrap();
        std::fs::create_dir_all(tmp.path().join("workspace")).unwrap();

        let embedder = BagOfLetters::new();
        let mut cfg = MemoryConfig::default();
        cfg.sync.filesystem_roots = vec![tree.to_string_lossy().into_owned()];
        let idx = MemoryIndex::open(
            &tmp.path().join("memory.sqlite3"),
            tmp.path().join("workspace"),
            embedder,
            &cfg,
            chrono_tz::UTC,
        )
        .unwrap();
        idx.sync().await.unwrap();

        let hits = idx
            .search(
                "readme docs",
                &SearchOptions {
                    min_score: Some(0.0),
                    k: Some(10),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(hits.iter().any(|h| h.path.starts_with("filesystem/")));

        let err = idx.read_file("filesystem/docs", None, None).unwrap_err();
        assert!(matches!(err, MemoryError::NotReadable(_)));
    }

    #[tokio::test]
    async fn read_file_windows_and_traversal_guard() {
        let tmp = tempfile::tempdir().unwrap();
        write_note(tmp.path(), "MEMORY.md", "one\ntwo\nthree\nfour\n");
        let (idx, _) = index_with(tmp.path());

        assert_eq!(idx.read_file("MEMORY.md", Some(2), Some(2)).unwrap(), "two\nthree");
        assert!(matches!(
            idx.read_file("../secrets.txt", None, None),
            Err(MemoryError::NotReadable(_))
        ));
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
