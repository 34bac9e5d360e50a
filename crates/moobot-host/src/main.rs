use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

mod app;
mod bridge;
mod send;
mod tide;
mod transports;

use app::{AgentJobRunner, AppState};
use bridge::Bridge;
use moobot_core::transport::TransportKind;
use moobot_core::{config::MoobotConfig, StatePaths};
use moobot_cron::CronEngine;
use tide::Tide;

/// Personal chat assistant daemon.
#[derive(Parser)]
#[command(name = "moobot", version)]
struct Cli {
    /// Run exactly one agent turn for this message, print the reply
    /// between E2E_REPLY_START / E2E_REPLY_END, and exit.
    #[arg(long)]
    message: Option<String>,

    /// Chat id for --message (defaults to a transport-less turn).
    #[arg(long)]
    jid: Option<String>,

    /// Treat the --message turn as a group message.
    #[arg(long)]
    group: bool,

    /// Config file path (defaults to <state>/config.json).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moobot=info,moobot_cron=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // State dir: MOOBOT_STATE_DIR override (the test harness) or ~/.moobot.
    let paths = StatePaths::resolve();
    let config_path = cli.config.unwrap_or_else(|| paths.config_file());
    let config = MoobotConfig::load(&config_path)?;

    let mut state = AppState::initialise(paths, config)?;
    for kind in [TransportKind::BotApi, TransportKind::LinkedDevice] {
        state.register_transport(Arc::new(transports::ConsoleTransport::new(kind)));
    }
    let state = Arc::new(state);

    match cli.message {
        Some(text) => run_single_message(state, &text, cli.jid.as_deref(), cli.group).await,
        None => serve(state).await,
    }
}

/// CLI test surface: one turn, reply between literal markers on stdout.
async fn run_single_message(
    state: Arc<AppState>,
    text: &str,
    jid: Option<&str>,
    is_group: bool,
) -> anyhow::Result<()> {
    if let Some(memory) = &state.memory {
        // Pick up notes the harness dropped into the workspace.
        if let Err(e) = memory.sync().await {
            warn!("memory sync failed: {e}");
        }
    }

    let bridge = Bridge::new(Arc::clone(&state));
    let reply = bridge
        .handle_inbound(jid.unwrap_or(""), text, is_group)
        .await;

    println!("E2E_REPLY_START");
    println!("{reply}");
    println!("E2E_REPLY_END");
    Ok(())
}

/// Daemon mode: cron engine + tide + periodic memory sync, until ctrl-c.
async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let engine = Arc::new(CronEngine::new(
        Arc::clone(&state.cron_store),
        Arc::new(AgentJobRunner::new(Arc::clone(&state))),
        state.transports.clone(),
    ));
    let cron_task = tokio::spawn(engine.run(shutdown_rx.clone()));

    let tide_task = tokio::spawn(Arc::new(Tide::new(Arc::clone(&state))).run(shutdown_rx.clone()));

    let sync_task = {
        let state = Arc::clone(&state);
        let mut shutdown = shutdown_rx;
        tokio::spawn(async move {
            let Some(memory) = state.memory.clone() else {
                return;
            };
            let period =
                Duration::from_secs(state.config.memory.sync.interval_minutes.max(1) * 60);
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = memory.sync().await {
                            warn!("memory sync failed: {e}");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    };

    info!("moobot running; press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(cron_task, tide_task, sync_task);
    Ok(())
}
