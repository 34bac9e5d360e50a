//! Scheduler + executor. Polls the store once a second, runs due jobs, and
//! enforces the at-most-once discipline for one-shots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{error, info, warn};

use moobot_core::transport::{Transport, TransportKind};

use crate::schedule::next_occurrence;
use crate::store::CronStore;
use crate::types::{CronJob, Schedule};

/// Produces the outbound text for a fired job, in practice one agent turn
/// with `job.message` as the user text. Kept as a narrow seam so the cron
/// engine never depends on the agent loop crate directly.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run_job(&self, job: &CronJob) -> std::result::Result<String, String>;
}

pub struct CronEngine {
    store: Arc<CronStore>,
    runner: Arc<dyn JobRunner>,
    transports: Vec<Arc<dyn Transport>>,
    /// Waits before attempt 2 and attempt 3.
    retry_delays: [Duration; 2],
}

impl CronEngine {
    pub fn new(
        store: Arc<CronStore>,
        runner: Arc<dyn JobRunner>,
        transports: Vec<Arc<dyn Transport>>,
    ) -> Self {
        Self {
            store,
            runner,
            transports,
            retry_delays: [Duration::from_secs(5), Duration::from_secs(15)],
        }
    }

    /// Shrink the retry waits (tests).
    pub fn with_retry_delays(mut self, delays: [Duration; 2]) -> Self {
        self.retry_delays = delays;
        self
    }

    /// Main loop. Recovers startup work, then polls every second until
    /// `shutdown` broadcasts `true`.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!("cron engine started");
        self.startup_pass().await;

        let mut next_due: HashMap<String, DateTime<Utc>> = HashMap::new();
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(&mut next_due).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("cron engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Startup scan: one-shots already marked sent are skipped entirely;
    /// overdue unmarked one-shots run now, sequentially, each observing the
    /// mark-before-run order. Recurring jobs just wait for their next tick;
    /// a fire missed while the process was down stays missed.
    async fn startup_pass(&self) {
        let now = Utc::now();
        for job in self.store.load_jobs() {
            if !job.enabled || job.schedule.is_recurring() {
                continue;
            }
            if job.sent_at_ms.is_some() {
                info!(job_id = %job.id, name = %job.name, "one-shot already delivered, skipping");
                continue;
            }
            if job.schedule.one_shot_at().is_some_and(|at| at <= now) {
                warn!(job_id = %job.id, name = %job.name, "overdue one-shot, executing now");
                self.execute_one_shot(&job).await;
            }
        }
    }

    async fn tick(&self, next_due: &mut HashMap<String, DateTime<Utc>>) {
        let now = Utc::now();
        let jobs = self.store.load_jobs();

        // Forget schedule state for jobs that were removed.
        next_due.retain(|id, _| jobs.iter().any(|j| &j.id == id));

        for job in jobs {
            if !job.enabled {
                continue;
            }
            match &job.schedule {
                Schedule::OneShot { .. } => {
                    if job.sent_at_ms.is_none()
                        && job.schedule.one_shot_at().is_some_and(|at| at <= now)
                    {
                        self.execute_one_shot(&job).await;
                    }
                }
                Schedule::Recurring { .. } => {
                    let due = match next_due.entry(job.id.clone()) {
                        std::collections::hash_map::Entry::Occupied(e) => *e.get(),
                        std::collections::hash_map::Entry::Vacant(slot) => {
                            match next_occurrence(&job.schedule, now) {
                                Ok(Some(next)) => *slot.insert(next),
                                Ok(None) => continue,
                                Err(e) => {
                                    error!(job_id = %job.id, "bad recurring schedule: {e}");
                                    continue;
                                }
                            }
                        }
                    };
                    if due <= now {
                        // Recurring ticks are fire-and-forget.
                        match next_occurrence(&job.schedule, now) {
                            Ok(Some(next)) => {
                                next_due.insert(job.id.clone(), next);
                            }
                            _ => {
                                next_due.remove(&job.id);
                            }
                        }
                        let engine = self.clone_for_task();
                        tokio::spawn(async move {
                            engine.deliver_and_report(&job).await;
                        });
                    }
                }
            }
        }
    }

    fn clone_for_task(&self) -> Arc<EngineTask> {
        Arc::new(EngineTask {
            runner: Arc::clone(&self.runner),
            transports: self.transports.clone(),
            retry_delays: self.retry_delays,
        })
    }

    /// One-shot execution: mark delivered BEFORE running, so a crash during
    /// the run can never double-send after restart. Success removes the
    /// job; final failure leaves it marked and sends the apology.
    async fn execute_one_shot(&self, job: &CronJob) {
        let now_ms = Utc::now().timestamp_millis();
        if let Err(e) = self.store.update_job(&job.id, |j| j.sent_at_ms = Some(now_ms)) {
            // Without a persisted mark, running would risk a duplicate on
            // restart. Leave the job for the next tick.
            error!(job_id = %job.id, "could not mark one-shot, deferring: {e}");
            return;
        }

        let task = self.clone_for_task();
        if task.deliver_and_report(job).await {
            if let Err(e) = self.store.remove_job(&job.id) {
                warn!(job_id = %job.id, "delivered but not removed: {e}");
            }
        }
    }
}

/// The transport-facing half of the engine, shared with spawned recurring
/// deliveries.
struct EngineTask {
    runner: Arc<dyn JobRunner>,
    transports: Vec<Arc<dyn Transport>>,
    retry_delays: [Duration; 2],
}

impl EngineTask {
    /// Run + send with the retry ladder. Returns whether delivery succeeded.
    async fn deliver_and_report(&self, job: &CronJob) -> bool {
        let mut last_err = String::new();
        for attempt in 0u32..3 {
            if attempt > 0 {
                tokio::time::sleep(self.retry_delays[(attempt - 1) as usize]).await;
            }
            match self.deliver_once(job).await {
                Ok(()) => {
                    info!(job_id = %job.id, name = %job.name, attempt = attempt + 1, "job delivered");
                    return true;
                }
                Err(e) => {
                    warn!(job_id = %job.id, attempt = attempt + 1, "job delivery failed: {e}");
                    last_err = e;
                }
            }
        }

        error!(job_id = %job.id, name = %job.name, "job failed after retries: {last_err}");
        self.send_apology(job, &last_err).await;
        false
    }

    async fn deliver_once(&self, job: &CronJob) -> std::result::Result<(), String> {
        let text = self.runner.run_job(job).await?;
        let transport = self.transport_for(&job.jid)?;
        transport
            .send_text(&job.jid, &text)
            .await
            .map_err(|e| e.to_string())
    }

    /// Best-effort; its own failure is only logged.
    async fn send_apology(&self, job: &CronJob, err: &str) {
        let apology = format!(
            "[Bot] Moo — reminder '{}' didn't go through: {}",
            job.name, err
        );
        match self.transport_for(&job.jid) {
            Ok(transport) => {
                if let Err(e) = transport.send_text(&job.jid, &apology).await {
                    warn!(job_id = %job.id, "apology not delivered: {e}");
                }
            }
            Err(e) => warn!(job_id = %job.id, "apology not delivered: {e}"),
        }
    }

    fn transport_for(&self, jid: &str) -> std::result::Result<&Arc<dyn Transport>, String> {
        let kind = TransportKind::for_jid(jid);
        self.transports
            .iter()
            .find(|t| t.kind() == kind)
            .ok_or_else(|| format!("no transport wired for {kind}"))
    }
}
