//! Transport bridge: one inbound message → one agent turn → one reply.
//!
//! Turns for different chats run in parallel; turns for the same chat are
//! serialised behind a per-chat lock so history writes and tool effects
//! keep their order. Each chat also carries a small queue-depth cap: when
//! the model is slow the user gets a "busy" note instead of an unbounded
//! backlog.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, error, warn};

use moobot_agent::SidePayload;
use moobot_chatlog::ChatLogEntry;
use moobot_core::transport::{Transport, TransportKind};

use crate::app::{AppState, HISTORY_EXCHANGES};

/// Maximum in-flight + queued turns per chat before we answer "busy".
const MAX_QUEUE_DEPTH: usize = 8;

const BUSY_REPLY: &str =
    "I'm still working through your earlier messages. Give me a moment and try again.";
const MODEL_DOWN_REPLY: &str = "I couldn't reach the model right now. Please try again shortly.";

pub struct Bridge {
    state: Arc<AppState>,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    depth: DashMap<String, Arc<AtomicUsize>>,
}

impl Bridge {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            locks: DashMap::new(),
            depth: DashMap::new(),
        }
    }

    /// Ingest one message, produce (and deliver) the reply. The returned
    /// text is what was (or would have been) sent.
    pub async fn handle_inbound(&self, jid: &str, text: &str, is_group: bool) -> String {
        let depth = self
            .depth
            .entry(jid.to_string())
            .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
            .clone();
        if depth.fetch_add(1, Ordering::SeqCst) >= MAX_QUEUE_DEPTH {
            depth.fetch_sub(1, Ordering::SeqCst);
            warn!(jid, "per-chat queue full, refusing turn");
            self.send_text(jid, BUSY_REPLY).await;
            return BUSY_REPLY.to_string();
        }

        let lock = self
            .locks
            .entry(jid.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let reply = self.run_one_turn(jid, text, is_group).await;
        depth.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    async fn run_one_turn(&self, jid: &str, text: &str, is_group: bool) -> String {
        let history = if is_group {
            self.state.chatlog.read_last_group(jid, HISTORY_EXCHANGES)
        } else if jid.is_empty() {
            Ok(Vec::new())
        } else {
            self.state.chatlog.read_last_private(jid, HISTORY_EXCHANGES)
        }
        .unwrap_or_else(|e| {
            warn!(jid, "history unavailable: {e}");
            Vec::new()
        });

        let (reply, side) = match self.state.agent_turn(jid, is_group, &history, text).await {
            Ok(out) => out,
            Err(e) => {
                error!(jid, "agent turn failed: {e}");
                (MODEL_DOWN_REPLY.to_string(), Vec::new())
            }
        };

        let entry = ChatLogEntry {
            ts: Utc::now(),
            jid: (!jid.is_empty()).then(|| jid.to_string()),
            user: text.to_string(),
            assistant: reply.clone(),
        };
        let logged = if is_group {
            self.state.chatlog.append_group(jid, &entry)
        } else {
            self.state.chatlog.append(&entry)
        };
        if let Err(e) = logged {
            warn!(jid, "chat log append failed: {e}");
        }

        self.send_text(jid, &reply).await;
        for payload in side {
            self.send_side(jid, payload).await;
        }
        reply
    }

    fn transport_for(&self, jid: &str) -> Option<&Arc<dyn Transport>> {
        let kind = TransportKind::for_jid(jid);
        self.state.transports.iter().find(|t| t.kind() == kind)
    }

    async fn send_text(&self, jid: &str, text: &str) {
        if jid.is_empty() {
            return;
        }
        match self.transport_for(jid) {
            Some(transport) => {
                // Platforms cap message length, so long replies go out in
                // bounded chunks. Live-chat sends are not retried; a
                // failure is logged only, and the rest of the reply is
                // dropped rather than delivered with a hole in the middle.
                for chunk in crate::send::split_outbound(text) {
                    if let Err(e) = transport.send_text(jid, &chunk).await {
                        error!(jid, "send failed: {e}");
                        break;
                    }
                }
            }
            None => debug!(jid, "no transport wired, reply not delivered"),
        }
    }

    async fn send_side(&self, jid: &str, payload: SidePayload) {
        if jid.is_empty() {
            return;
        }
        let Some(transport) = self.transport_for(jid) else {
            debug!(jid, "no transport wired, side payload dropped");
            return;
        };
        let result = match &payload {
            SidePayload::ImageReply { path, caption } => {
                transport.send_image(jid, path, caption.as_deref()).await
            }
            SidePayload::VoiceReply { path } => transport.send_voice(jid, path).await,
        };
        if let Err(e) = result {
            error!(jid, "side payload send failed: {e}");
        }
    }
}
