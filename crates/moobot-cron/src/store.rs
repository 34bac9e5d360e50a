//! JSON-file job store. Every write is a whole-document rewrite through a
//! temp file + rename so a crash mid-write leaves the previous document
//! intact.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{CronError, Result};
use crate::types::CronJob;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    jobs: Vec<CronJob>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            jobs: Vec::new(),
        }
    }
}

/// Single-writer store handle. The mutex serialises read-modify-write
/// cycles; readers get cloned snapshots.
pub struct CronStore {
    path: PathBuf,
    doc: Mutex<StoreDocument>,
}

impl CronStore {
    /// Open (or create) the store at `path`. A missing, empty, or corrupt
    /// file yields the empty document: jobs are user data, but a broken
    /// store must never prevent startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => StoreDocument::default(),
            Ok(raw) => match serde_json::from_str::<StoreDocument>(&raw) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(path = %path.display(), "cron store unreadable ({e}), starting empty");
                    StoreDocument::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(e) => return Err(e.into()),
        };
        info!(jobs = doc.jobs.len(), path = %path.display(), "cron store loaded");
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    /// Snapshot of all jobs.
    pub fn load_jobs(&self) -> Vec<CronJob> {
        self.doc.lock().unwrap().jobs.clone()
    }

    pub fn get_job(&self, id: &str) -> Option<CronJob> {
        self.doc
            .lock()
            .unwrap()
            .jobs
            .iter()
            .find(|j| j.id == id)
            .cloned()
    }

    pub fn add_job(&self, job: CronJob) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        info!(job_id = %job.id, name = %job.name, "job added");
        doc.jobs.push(job);
        self.persist(&doc)
    }

    /// Apply `patch` to the job with `id` and persist. Returns
    /// `JobNotFound` when no job matches.
    pub fn update_job<F>(&self, id: &str, patch: F) -> Result<()>
    where
        F: FnOnce(&mut CronJob),
    {
        let mut doc = self.doc.lock().unwrap();
        match doc.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => patch(job),
            None => return Err(CronError::JobNotFound { id: id.to_string() }),
        }
        self.persist(&doc)
    }

    pub fn remove_job(&self, id: &str) -> Result<()> {
        let mut doc = self.doc.lock().unwrap();
        let before = doc.jobs.len();
        doc.jobs.retain(|j| j.id != id);
        if doc.jobs.len() == before {
            return Err(CronError::JobNotFound { id: id.to_string() });
        }
        info!(job_id = %id, "job removed");
        self.persist(&doc)
    }

    /// Whole-file rewrite: serialise, write `<path>.tmp`, rename over.
    fn persist(&self, doc: &StoreDocument) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(doc)?;
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Schedule;

    fn one_shot(name: &str, at_ms: i64) -> CronJob {
        CronJob::new(name, Schedule::OneShot { at_ms }, "msg", "12345")
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::open(dir.path().join("cron.json")).unwrap();
        assert!(store.load_jobs().is_empty());
    }

    #[test]
    fn corrupt_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.json");
        std::fs::write(&path, "{{{{not json").unwrap();
        let store = CronStore::open(&path).unwrap();
        assert!(store.load_jobs().is_empty());
    }

    #[test]
    fn add_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.json");
        {
            let store = CronStore::open(&path).unwrap();
            store.add_job(one_shot("stretch", 1_700_000_000_000)).unwrap();
        }
        let store = CronStore::open(&path).unwrap();
        let jobs = store.load_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, "stretch");
    }

    #[test]
    fn update_marks_sent() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::open(dir.path().join("cron.json")).unwrap();
        let job = one_shot("a", 1);
        let id = job.id.clone();
        store.add_job(job).unwrap();

        store.update_job(&id, |j| j.sent_at_ms = Some(777)).unwrap();
        assert_eq!(store.get_job(&id).unwrap().sent_at_ms, Some(777));

        assert!(matches!(
            store.update_job("nope", |_| {}),
            Err(CronError::JobNotFound { .. })
        ));
    }

    #[test]
    fn remove_deletes_job() {
        let dir = tempfile::tempdir().unwrap();
        let store = CronStore::open(dir.path().join("cron.json")).unwrap();
        let job = one_shot("a", 1);
        let id = job.id.clone();
        store.add_job(job).unwrap();
        store.remove_job(&id).unwrap();
        assert!(store.load_jobs().is_empty());
        assert!(matches!(
            store.remove_job(&id),
            Err(CronError::JobNotFound { .. })
        ));
    }

    #[test]
    fn document_shape_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cron.json");
        let store = CronStore::open(&path).unwrap();
        store.add_job(one_shot("a", 1)).unwrap();
        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc["version"], 1);
        assert!(doc["jobs"].is_array());
    }
}
