//! Tide: the periodic idle-wake scheduler.
//!
//! Every cooldown interval it asks, per tracked chat: are we outside the
//! quiet window, and has nobody (including Tide itself) said anything for
//! a full cooldown? Only then does the agent get to produce one short
//! nudge. Chat selection is explicit config; with `tide.jid` unset Tide
//! stays idle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use moobot_agent::run_turn;
use moobot_core::config::TideConfig;
use moobot_core::transport::TransportKind;

use crate::app::{AppState, HISTORY_EXCHANGES};

/// The model answers this when it has nothing worth saying.
const PASS_MARKER: &str = "PASS";

pub struct Tide {
    state: Arc<AppState>,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

/// Cooldown as a duration; the seconds override exists for tests.
pub fn cooldown(cfg: &TideConfig) -> Duration {
    match cfg.silence_cooldown_secs {
        Some(secs) => Duration::from_secs(secs.max(1)),
        None => Duration::from_secs(cfg.silence_cooldown_minutes.max(1) * 60),
    }
}

/// Is `now` inside `[start, end]`? The window wraps midnight when
/// `end < start` (e.g. 23:00 → 08:00).
pub fn in_quiet_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        now >= start && now <= end
    } else {
        now >= start || now <= end
    }
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

impl Tide {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let cfg = self.state.config.tide.clone();
        if !cfg.enabled {
            return;
        }
        let Some(jid) = cfg.jid.clone() else {
            info!("tide enabled but tide.jid unset; staying idle");
            return;
        };

        let period = cooldown(&cfg);
        info!(jid = %jid, period_secs = period.as_secs(), "tide running");
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // the immediate first tick is not a wake
        loop {
            tokio::select! {
                _ = interval.tick() => self.wake(&cfg, &jid).await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    async fn wake(&self, cfg: &TideConfig, jid: &str) {
        let now = Utc::now();
        let local = now.with_timezone(&self.state.user_tz).time();
        let (Some(start), Some(end)) = (
            parse_hhmm(&cfg.inactive_start),
            parse_hhmm(&cfg.inactive_end),
        ) else {
            warn!("tide quiet window unparseable, skipping wake");
            return;
        };
        if in_quiet_window(local, start, end) {
            debug!(jid, "inside quiet window, skipping");
            return;
        }

        // Anything newer than one cooldown (inbound, outbound, or our own
        // last nudge) counts as recent activity.
        let cutoff = now
            - chrono::Duration::from_std(cooldown(cfg)).unwrap_or(chrono::Duration::minutes(30));
        let last_chat = self.state.chatlog.last_activity(jid).unwrap_or(None);
        let last_tide = self.last_sent.lock().unwrap().get(jid).copied();
        let last = [last_chat, last_tide].into_iter().flatten().max();
        if let Some(last) = last {
            if last > cutoff {
                debug!(jid, "recent activity, skipping");
                return;
            }
        } else {
            // A chat with no history yet has nothing to pick back up.
            debug!(jid, "no history, skipping");
            return;
        }

        self.nudge(jid).await;
    }

    async fn nudge(&self, jid: &str) {
        let history = self
            .state
            .chatlog
            .read_last_private(jid, HISTORY_EXCHANGES)
            .unwrap_or_default();
        let ctx = self.state.agent_context(jid, false);
        let system = self.state.prompt.tide_prompt(Utc::now());

        let reply = match run_turn(
            self.state.model.as_ref(),
            &self.state.registry,
            &ctx,
            &system,
            &history,
            "(no new message from the user; idle check)",
        )
        .await
        {
            Ok(reply) => reply,
            Err(e) => {
                warn!(jid, "tide turn failed: {e}");
                return;
            }
        };

        if reply.trim().eq_ignore_ascii_case(PASS_MARKER) || reply.trim().is_empty() {
            debug!(jid, "model passed on nudging");
            return;
        }

        let kind = TransportKind::for_jid(jid);
        let Some(transport) = self.state.transports.iter().find(|t| t.kind() == kind) else {
            warn!(jid, "tide has no transport for {kind}, nudge dropped");
            return;
        };
        // Nudges are prompted to be short, but the cap is enforced anyway.
        for chunk in crate::send::split_outbound(&reply) {
            match transport.send_text(jid, &chunk).await {
                Ok(()) => {
                    info!(jid, "tide nudge sent");
                    self.last_sent
                        .lock()
                        .unwrap()
                        .insert(jid.to_string(), Utc::now());
                }
                Err(e) => {
                    warn!(jid, "tide send failed: {e}");
                    return;
                }
            }
        }
    }
}
