//! Startup wiring: config → paths → model client → memory → registry →
//! cron. Everything downstream borrows this one `AppState`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use chrono_tz::Tz;
use tracing::{info, warn};

use moobot_agent::{
    registry::SkillDeps, run_turn, AgentContext, PromptBuilder, SidePayload, SkillRegistry,
};
use moobot_chatlog::ChatLog;
use moobot_core::{config::MoobotConfig, MoobotError, StatePaths, Transport};
use moobot_cron::{CronJob, CronStore, JobRunner};
use moobot_memory::MemoryIndex;
use moobot_model::{ChatMessage, Embedder, ModelClient};

pub struct AppState {
    pub config: MoobotConfig,
    pub paths: StatePaths,
    pub model: Arc<ModelClient>,
    pub memory: Option<Arc<MemoryIndex>>,
    pub chatlog: ChatLog,
    pub cron_store: Arc<CronStore>,
    pub registry: SkillRegistry,
    pub prompt: PromptBuilder,
    pub user_tz: Tz,
    /// Registered transport adapters. May be empty; the bridge and the
    /// cron executor then refuse sends with a log line.
    pub transports: Vec<Arc<dyn Transport>>,
}

impl AppState {
    pub fn initialise(paths: StatePaths, config: MoobotConfig) -> Result<Self, MoobotError> {
        paths.ensure()?;

        let user_tz: Tz = config
            .agents
            .defaults
            .user_timezone
            .parse()
            .map_err(|_| {
                MoobotError::Config(format!(
                    "unknown agents.defaults.user_timezone \"{}\"",
                    config.agents.defaults.user_timezone
                ))
            })?;

        let model = Arc::new(
            ModelClient::from_config(&config.llm, config.memory.embedding.model_id.as_deref())
                .map_err(|e| MoobotError::Config(e.to_string()))?,
        );

        let workspace = match &config.memory.workspace_dir {
            Some(dir) => std::path::PathBuf::from(dir),
            None => paths.workspace_dir(),
        };

        let memory = if config.memory.enabled {
            let index_path = match &config.memory.index_path {
                Some(p) => std::path::PathBuf::from(p),
                None => paths.memory_index_file(),
            };
            let index = MemoryIndex::open(
                &index_path,
                workspace.clone(),
                Arc::clone(&model) as Arc<dyn Embedder>,
                &config.memory,
                user_tz,
            )
            .map_err(|e| MoobotError::Config(e.to_string()))?;
            Some(Arc::new(index))
        } else {
            None
        };

        let registry = SkillRegistry::build(
            &config.skills.enabled,
            &SkillDeps {
                model: Arc::clone(&model),
                memory: memory.clone(),
                shell: config.skills.shell.clone(),
            },
        )
        .map_err(|e| MoobotError::Config(e.to_string()))?;

        let prompt = PromptBuilder::new(user_tz, config.agents.defaults.time_format.clone());
        let cron_store = Arc::new(
            CronStore::open(paths.cron_store_file())
                .map_err(|e| MoobotError::Config(e.to_string()))?,
        );
        let chatlog = ChatLog::new(workspace);

        info!(state_dir = %paths.root().display(), "moobot state initialised");
        Ok(Self {
            config,
            paths,
            model,
            memory,
            chatlog,
            cron_store,
            registry,
            prompt,
            user_tz,
            transports: Vec::new(),
        })
    }

    pub fn register_transport(&mut self, transport: Arc<dyn Transport>) {
        self.transports.push(transport);
    }

    fn workspace_dir(&self) -> std::path::PathBuf {
        match &self.config.memory.workspace_dir {
            Some(dir) => std::path::PathBuf::from(dir),
            None => self.paths.workspace_dir(),
        }
    }

    pub fn agent_context(&self, jid: &str, is_group: bool) -> AgentContext {
        AgentContext::new(
            self.paths.root().to_path_buf(),
            self.workspace_dir(),
            jid.to_string(),
            is_group,
            Arc::clone(&self.cron_store),
            self.user_tz,
        )
    }

    /// One full agent turn with the live-chat prompt. Returns the reply
    /// text and any side payloads queued by skills.
    pub async fn agent_turn(
        &self,
        jid: &str,
        is_group: bool,
        history: &[ChatMessage],
        user_text: &str,
    ) -> moobot_agent::Result<(String, Vec<SidePayload>)> {
        let ctx = self.agent_context(jid, is_group);
        let system = self
            .prompt
            .chat_prompt(&self.registry.skill_docs(is_group), Utc::now());
        let reply = run_turn(
            self.model.as_ref(),
            &self.registry,
            &ctx,
            &system,
            history,
            user_text,
        )
        .await?;
        Ok((reply, ctx.take_side()))
    }
}

/// How many past exchanges are replayed into each turn.
pub const HISTORY_EXCHANGES: usize = 10;

/// Cron's view of the agent: run the job message through the same loop and
/// prompt a live message would get.
pub struct AgentJobRunner {
    state: Arc<AppState>,
}

impl AgentJobRunner {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }
}

#[async_trait]
impl JobRunner for AgentJobRunner {
    async fn run_job(&self, job: &CronJob) -> Result<String, String> {
        let history = self
            .state
            .chatlog
            .read_last_private(&job.jid, HISTORY_EXCHANGES)
            .unwrap_or_else(|e| {
                warn!(job_id = %job.id, "history unavailable for cron turn: {e}");
                Vec::new()
            });
        let (reply, side) = self
            .state
            .agent_turn(&job.jid, false, &history, &job.message)
            .await
            .map_err(|e| e.to_string())?;
        if !side.is_empty() {
            // Cron delivery is text-only; media directives are dropped.
            warn!(job_id = %job.id, n = side.len(), "side payloads ignored for cron delivery");
        }
        Ok(reply)
    }
}
