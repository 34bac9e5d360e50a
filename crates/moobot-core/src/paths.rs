//! Per-user state directory layout.
//!
//! Everything the assistant persists lives under one directory:
//! `$MOOBOT_STATE_DIR` when set (the test harness), otherwise `~/.moobot`.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Environment override for the state directory. The only env var that is
/// part of the public contract.
pub const STATE_DIR_ENV: &str = "MOOBOT_STATE_DIR";

/// Resolved locations inside the state directory.
#[derive(Debug, Clone)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Resolve from the environment, falling back to `~/.moobot`.
    pub fn resolve() -> Self {
        let root = match std::env::var(STATE_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                Path::new(&home).join(".moobot")
            }
        };
        Self { root }
    }

    /// Build from an explicit root (tests).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create every directory the subsystems expect.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.auth_dir(),
            self.workspace_dir(),
            self.workspace_dir().join("memory"),
            self.workspace_dir().join("chat-log").join("private"),
            self.workspace_dir().join("group-chat-log"),
            self.uploads_dir(),
        ] {
            std::fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.json")
    }

    /// Transport credential blobs (linked-device session keys, etc.).
    pub fn auth_dir(&self) -> PathBuf {
        self.root.join("auth")
    }

    pub fn cron_store_file(&self) -> PathBuf {
        self.root.join("cron.json")
    }

    /// Notes, chat logs, and anything else the memory index walks.
    pub fn workspace_dir(&self) -> PathBuf {
        self.root.join("workspace")
    }

    pub fn memory_index_file(&self) -> PathBuf {
        self.root.join("memory.sqlite3")
    }

    /// Inbound media saved by transports; generated images and audio.
    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StatePaths::at(dir.path());
        paths.ensure().unwrap();
        assert!(paths.workspace_dir().join("chat-log/private").is_dir());
        assert!(paths.workspace_dir().join("group-chat-log").is_dir());
        assert!(paths.uploads_dir().is_dir());
        assert_eq!(paths.cron_store_file(), dir.path().join("cron.json"));
    }
}
