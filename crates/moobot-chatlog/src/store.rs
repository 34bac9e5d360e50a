use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use moobot_model::ChatMessage;

use crate::error::Result;

/// One completed exchange. `jid` is absent for transport-less turns
/// (e.g. the CLI test surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatLogEntry {
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    pub user: String,
    pub assistant: String,
}

/// Replace anything outside `[A-Za-z0-9._-]` so a jid is safe as a file
/// name component. An empty or dot-only result (`.`, `..`) would be path
/// navigation rather than a name; the group paths use the output as a bare
/// directory segment, so those degrade to underscores.
pub fn safe_jid(jid: &str) -> String {
    let mapped: String = jid
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if mapped.bytes().all(|b| b == b'.') {
        return "_".repeat(mapped.len().max(1));
    }
    mapped
}

/// Writer/reader over the workspace chat-log layout.
#[derive(Debug, Clone)]
pub struct ChatLog {
    workspace: PathBuf,
}

impl ChatLog {
    pub fn new(workspace_dir: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace_dir.into(),
        }
    }

    /// Append to the per-chat file (when `jid` is set) and the per-day
    /// aggregate.
    pub fn append(&self, entry: &ChatLogEntry) -> Result<()> {
        if let Some(ref jid) = entry.jid {
            let private = self
                .workspace
                .join("chat-log")
                .join("private")
                .join(format!("{}.jsonl", safe_jid(jid)));
            append_line(&private, entry)?;
        }
        let day = self
            .workspace
            .join("chat-log")
            .join(format!("{}.jsonl", entry.ts.format("%Y-%m-%d")));
        append_line(&day, entry)?;
        debug!(jid = entry.jid.as_deref().unwrap_or("-"), "exchange logged");
        Ok(())
    }

    /// Append a group exchange. Group traffic only ever lands under
    /// `group-chat-log/`, never the private tail nor the aggregate.
    pub fn append_group(&self, group_id: &str, entry: &ChatLogEntry) -> Result<()> {
        let path = self
            .workspace
            .join("group-chat-log")
            .join(safe_jid(group_id))
            .join(format!("{}.jsonl", entry.ts.format("%Y-%m-%d")));
        append_line(&path, entry)
    }

    /// Last `n` exchanges for `jid`, expanded to alternating user/assistant
    /// messages for history injection.
    pub fn read_last_private(&self, jid: &str, n: usize) -> Result<Vec<ChatMessage>> {
        let path = self
            .workspace
            .join("chat-log")
            .join("private")
            .join(format!("{}.jsonl", safe_jid(jid)));
        Ok(expand(tail_entries(&path, n)?))
    }

    /// Last `n` exchanges in a group, today's file first, reaching back one
    /// day when today alone cannot fill `n`.
    pub fn read_last_group(&self, group_id: &str, n: usize) -> Result<Vec<ChatMessage>> {
        let dir = self.workspace.join("group-chat-log").join(safe_jid(group_id));
        let today = Utc::now();
        let mut entries = Vec::new();
        for days_back in (0..2).rev() {
            let day = today - chrono::Duration::days(days_back);
            let path = dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")));
            entries.extend(tail_entries(&path, n)?);
        }
        let skip = entries.len().saturating_sub(n);
        Ok(expand(entries.into_iter().skip(skip).collect()))
    }

    /// Timestamp of the most recent exchange in a private chat, for the
    /// idle-wake silence check.
    pub fn last_activity(&self, jid: &str) -> Result<Option<DateTime<Utc>>> {
        let path = self
            .workspace
            .join("chat-log")
            .join("private")
            .join(format!("{}.jsonl", safe_jid(jid)));
        Ok(tail_entries(&path, 1)?.last().map(|e| e.ts))
    }
}

fn append_line(path: &Path, entry: &ChatLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Read the trailing `n` records. Unparseable lines are skipped, not fatal.
fn tail_entries(path: &Path, n: usize) -> Result<Vec<ChatLogEntry>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let entries: Vec<ChatLogEntry> = raw
        .lines()
        .filter_map(|line| serde_json::from_str(line).ok())
        .collect();
    let skip = entries.len().saturating_sub(n);
    Ok(entries.into_iter().skip(skip).collect())
}

fn expand(entries: Vec<ChatLogEntry>) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(entries.len() * 2);
    for entry in entries {
        out.push(ChatMessage::user(entry.user));
        out.push(ChatMessage::assistant(entry.assistant));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use moobot_model::Role;

    fn entry(jid: Option<&str>, user: &str, assistant: &str) -> ChatLogEntry {
        ChatLogEntry {
            ts: Utc::now(),
            jid: jid.map(String::from),
            user: user.to_string(),
            assistant: assistant.to_string(),
        }
    }

    #[test]
    fn round_trip_most_recent_pair() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChatLog::new(dir.path());
        log.append(&entry(Some("491700@s.whatsapp.net"), "old q", "old a"))
            .unwrap();
        log.append(&entry(Some("491700@s.whatsapp.net"), "ping", "pong"))
            .unwrap();

        let history = log.read_last_private("491700@s.whatsapp.net", 2).unwrap();
        assert_eq!(history.len(), 4);
        let last_pair = &history[2..];
        assert_eq!(last_pair[0].role, Role::User);
        assert_eq!(last_pair[0].content, "ping");
        assert_eq!(last_pair[1].role, Role::Assistant);
        assert_eq!(last_pair[1].content, "pong");
    }

    #[test]
    fn group_entries_stay_out_of_private_paths() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChatLog::new(dir.path());
        log.append_group("120363-group@g.us", &entry(Some("member"), "hi", "hello"))
            .unwrap();

        assert!(dir.path().join("group-chat-log/120363-group_g.us").is_dir());
        let private = dir.path().join("chat-log/private");
        let aggregate_entries: Vec<_> = std::fs::read_dir(dir.path().join("chat-log"))
            .map(|rd| rd.filter_map(|e| e.ok()).collect())
            .unwrap_or_default();
        assert!(!private.exists() || std::fs::read_dir(&private).unwrap().next().is_none());
        // chat-log/ must contain no day aggregate for group traffic
        assert!(aggregate_entries
            .iter()
            .all(|e| e.file_name().to_string_lossy() == "private"));
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChatLog::new(dir.path());
        assert!(log.read_last_private("nobody", 5).unwrap().is_empty());
        assert!(log.last_activity("nobody").unwrap().is_none());
    }

    #[test]
    fn jid_sanitisation() {
        assert_eq!(safe_jid("49170@s.whatsapp.net"), "49170_s.whatsapp.net");
        assert_eq!(safe_jid("123456789"), "123456789");
        assert_eq!(safe_jid("../../etc/passwd"), ".._.._etc_passwd");
        // Dot-only ids must never survive as path-navigation segments.
        assert_eq!(safe_jid(".."), "__");
        assert_eq!(safe_jid("."), "_");
        assert_eq!(safe_jid(""), "_");
    }

    #[test]
    fn dot_only_group_id_stays_inside_group_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChatLog::new(dir.path());
        log.append_group("..", &entry(Some("member"), "hi", "hello"))
            .unwrap();

        // The exchange landed under the sanitised segment, one level down.
        assert!(dir.path().join("group-chat-log/__").is_dir());
        let escaped: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("jsonl"))
            .collect();
        assert!(escaped.is_empty(), "group log escaped to the workspace root");
        assert!(log.read_last_group("..", 1).unwrap().len() == 2);
    }

    #[test]
    fn tail_respects_n() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChatLog::new(dir.path());
        for i in 0..10 {
            log.append(&entry(Some("j"), &format!("q{i}"), &format!("a{i}")))
                .unwrap();
        }
        let history = log.read_last_private("j", 3).unwrap();
        assert_eq!(history.len(), 6);
        assert_eq!(history[0].content, "q7");
    }
}
