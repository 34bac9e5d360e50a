use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A bounded text fragment with its embedding and source coordinates.
///
/// `path` namespaces the origin: note paths (`MEMORY.md`, `memory/*.md`),
/// chat-log paths (`chat-log/….jsonl`), and filesystem listings
/// (`filesystem/` or `filesystem/<rel>`).
#[derive(Debug, Clone)]
pub struct MemoryChunk {
    pub path: String,
    pub chunk_index: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub embedding: Vec<f32>,
    pub source_date: Option<NaiveDate>,
}

/// One search result, sorted by descending score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
    pub snippet: String,
    pub score: f32,
}

/// Filters for [`crate::MemoryIndex::search`].
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub k: Option<usize>,
    pub min_score: Option<f32>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    /// Shorthand window relative to the user timezone:
    /// `yesterday`, `last_week` / `last_7_days`, `last_month`.
    pub date_range: Option<String>,
}

/// What a `sync()` pass actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub upserted_chunks: usize,
    pub deleted_paths: usize,
    /// Number of embedding API texts sent. Zero on a no-change pass.
    pub embedded_texts: usize,
}
