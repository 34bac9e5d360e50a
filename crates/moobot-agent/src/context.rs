//! Per-turn context bundle handed to skill executors.
//!
//! The cron engine runs agent turns, and agent turns schedule cron jobs;
//! the cycle is broken by passing the narrow store handle here instead of
//! wiring the engine and the loop to each other.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono_tz::Tz;

use moobot_cron::CronStore;

/// Outbound side effects a skill wants the transport to honour after the
/// turn: the agent loop passes them through unchanged next to the text
/// reply.
#[derive(Debug, Clone)]
pub enum SidePayload {
    ImageReply {
        path: PathBuf,
        caption: Option<String>,
    },
    VoiceReply {
        path: PathBuf,
    },
}

pub struct AgentContext {
    /// State directory root (uploads live under it).
    pub state_dir: PathBuf,
    /// Workspace with notes and chat logs; file skills resolve against it.
    pub workspace_dir: PathBuf,
    /// Destination chat for this turn. Empty for the CLI test surface.
    pub jid: String,
    pub is_group: bool,
    /// Scheduling handle: the engine notices new jobs on its next poll, so
    /// adding to the store is all a skill needs to do.
    pub cron: Arc<CronStore>,
    pub user_tz: Tz,
    side: Mutex<Vec<SidePayload>>,
}

impl AgentContext {
    pub fn new(
        state_dir: PathBuf,
        workspace_dir: PathBuf,
        jid: String,
        is_group: bool,
        cron: Arc<CronStore>,
        user_tz: Tz,
    ) -> Self {
        Self {
            state_dir,
            workspace_dir,
            jid,
            is_group,
            cron,
            user_tz,
            side: Mutex::new(Vec::new()),
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.state_dir.join("uploads")
    }

    /// Queue a side payload for delivery after the turn.
    pub fn push_side(&self, payload: SidePayload) {
        self.side.lock().unwrap().push(payload);
    }

    /// Drain queued side payloads (called once by the turn owner).
    pub fn take_side(&self) -> Vec<SidePayload> {
        std::mem::take(&mut *self.side.lock().unwrap())
    }
}
