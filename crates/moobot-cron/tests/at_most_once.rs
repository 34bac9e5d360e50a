//! Crash/restart behaviour of one-shot jobs: for any sequence of restarts,
//! a one-shot produces at most one outbound message.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use moobot_core::transport::{Transport, TransportKind};
use moobot_core::Result as CoreResult;
use moobot_cron::{CronEngine, CronJob, CronStore, JobRunner, Schedule};

struct EchoRunner {
    fail: AtomicBool,
}

#[async_trait]
impl JobRunner for EchoRunner {
    async fn run_job(&self, job: &CronJob) -> Result<String, String> {
        if self.fail.load(Ordering::SeqCst) {
            Err("model unreachable".to_string())
        } else {
            Ok(format!("reminder: {}", job.message))
        }
    }
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::BotApi
    }

    async fn send_text(&self, jid: &str, text: &str) -> CoreResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((jid.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_image(&self, _: &str, _: &Path, _: Option<&str>) -> CoreResult<()> {
        Ok(())
    }

    async fn send_voice(&self, _: &str, _: &Path) -> CoreResult<()> {
        Ok(())
    }
}

fn engine(
    store: &Arc<CronStore>,
    runner: &Arc<EchoRunner>,
    transport: &Arc<RecordingTransport>,
) -> Arc<CronEngine> {
    Arc::new(
        CronEngine::new(
            Arc::clone(store),
            Arc::clone(runner) as Arc<dyn JobRunner>,
            vec![Arc::clone(transport) as Arc<dyn Transport>],
        )
        .with_retry_delays([Duration::from_millis(5), Duration::from_millis(15)]),
    )
}

async fn run_until_settled(engine: Arc<CronEngine>) {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(engine.run(shutdown_rx));
    tokio::time::sleep(Duration::from_secs(3)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn overdue_one_shot_fires_once_then_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CronStore::open(dir.path().join("cron.json")).unwrap());
    let runner = Arc::new(EchoRunner {
        fail: AtomicBool::new(false),
    });
    let transport = Arc::new(RecordingTransport::default());

    let job = CronJob::new(
        "execute test",
        Schedule::OneShot {
            at_ms: Utc::now().timestamp_millis() - 60_000,
        },
        "Reply with exactly: execute test OK",
        "12345",
    );
    store.add_job(job).unwrap();

    run_until_settled(engine(&store, &runner, &transport)).await;

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("execute test OK"));
    assert!(store.load_jobs().is_empty());

    // "Restart": a second engine over the same (now empty) store sends nothing.
    run_until_settled(engine(&store, &runner, &transport)).await;
    assert_eq!(transport.sent.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn marked_one_shot_is_never_resent_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CronStore::open(dir.path().join("cron.json")).unwrap());
    let runner = Arc::new(EchoRunner {
        fail: AtomicBool::new(false),
    });
    let transport = Arc::new(RecordingTransport::default());

    // A crash after mark-before-run but before removal leaves exactly this.
    let mut job = CronJob::new(
        "check lock",
        Schedule::OneShot {
            at_ms: Utc::now().timestamp_millis() - 60_000,
        },
        "check the lock",
        "12345",
    );
    job.sent_at_ms = Some(Utc::now().timestamp_millis() - 30_000);
    store.add_job(job).unwrap();

    run_until_settled(engine(&store, &runner, &transport)).await;

    assert!(transport.sent.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn final_failure_marks_job_and_sends_apology() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CronStore::open(dir.path().join("cron.json")).unwrap());
    let runner = Arc::new(EchoRunner {
        fail: AtomicBool::new(true),
    });
    let transport = Arc::new(RecordingTransport::default());

    let job = CronJob::new(
        "standup",
        Schedule::OneShot {
            at_ms: Utc::now().timestamp_millis() - 1_000,
        },
        "standup time",
        "12345",
    );
    let id = job.id.clone();
    store.add_job(job).unwrap();

    run_until_settled(engine(&store, &runner, &transport)).await;

    // Only the apology went out.
    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("Moo"));
    assert!(sent[0].1.contains("standup"));

    // The job stays, marked, so a restart cannot re-send it.
    let remaining = store.get_job(&id).unwrap();
    assert!(remaining.sent_at_ms.is_some());

    run_until_settled(engine(&store, &runner, &transport)).await;
    assert_eq!(transport.sent.lock().unwrap().len(), 1);
}

// Real time on purpose: due-ness compares wall-clock timestamps, which a
// paused tokio clock would never reach.
#[tokio::test]
async fn future_one_shot_fires_from_tick_loop() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CronStore::open(dir.path().join("cron.json")).unwrap());
    let runner = Arc::new(EchoRunner {
        fail: AtomicBool::new(false),
    });
    let transport = Arc::new(RecordingTransport::default());

    let job = CronJob::new(
        "soon",
        Schedule::OneShot {
            at_ms: Utc::now().timestamp_millis() + 1_000,
        },
        "it is time",
        "12345",
    );
    store.add_job(job).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(engine(&store, &runner, &transport).run(shutdown_rx));
    tokio::time::sleep(Duration::from_secs(4)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let sent = transport.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].1.contains("it is time"));
    assert!(store.load_jobs().is_empty());
}
