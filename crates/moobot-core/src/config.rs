//! Typed view over the single JSON configuration document.
//!
//! Load order: `config.json` in the state directory, then `MOOBOT_*`
//! environment overrides. String values of the form `"${VAR}"` are resolved
//! from the environment at load time; an unresolved reference is a fatal
//! startup error.

use std::path::Path;

use figment::{
    providers::{Env, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{MoobotError, Result};

/// Top-level config (config.json + MOOBOT_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoobotConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tide: TideConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub owner: OwnerConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ordered provider list. For a given capability the first entry that
    /// advertises it and has credentials wins.
    #[serde(default)]
    pub models: Vec<ModelEntry>,
}

/// One entry in `llm.models`. All current providers speak the
/// OpenAI-compatible HTTP surface; `base_url` selects the actual backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Stable identifier referenced elsewhere in the config
    /// (e.g. `memory.embedding.model_id`).
    pub id: String,
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent in request bodies (e.g. "gpt-4.1-mini").
    pub model: String,
    /// Capabilities this entry advertises.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Embed,
    Vision,
    ImageGen,
    Transcribe,
    Synthesize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    /// Which skills are exposed to the model. Unknown ids are rejected at
    /// registry build time.
    #[serde(default = "default_enabled_skills")]
    pub enabled: Vec<String>,
    #[serde(default)]
    pub shell: ShellSkillConfig,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_skills(),
            shell: ShellSkillConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellSkillConfig {
    /// Command prefixes the shell skill may run. Deny-by-default.
    #[serde(default = "default_shell_allow")]
    pub allow: Vec<String>,
    #[serde(default = "default_shell_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_shell_max_output")]
    pub max_output_bytes: usize,
}

impl Default for ShellSkillConfig {
    fn default() -> Self {
        Self {
            allow: default_shell_allow(),
            timeout_secs: default_shell_timeout_secs(),
            max_output_bytes: default_shell_max_output(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Overrides `<state>/workspace` when set.
    pub workspace_dir: Option<String>,
    /// Overrides `<state>/memory.sqlite3` when set.
    pub index_path: Option<String>,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            workspace_dir: None,
            index_path: None,
            embedding: EmbeddingConfig::default(),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

/// Explicit embedding provider selection: `model_id` must reference an
/// `llm.models` entry advertising the `embed` capability. There is no
/// silent fallback between providers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_chunk_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_k")]
    pub k: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            k: default_search_k(),
            min_score: default_min_score(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_interval")]
    pub interval_minutes: u64,
    /// Extra directories indexed as one-chunk-per-directory listings.
    #[serde(default)]
    pub filesystem_roots: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_sync_interval(),
            filesystem_roots: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TideConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_tide_cooldown")]
    pub silence_cooldown_minutes: u64,
    /// Test override; takes priority over the minutes knob when set.
    pub silence_cooldown_secs: Option<u64>,
    /// Quiet window start, "HH:MM" in the user timezone.
    #[serde(default = "default_inactive_start")]
    pub inactive_start: String,
    /// Quiet window end, "HH:MM". Wraps midnight when end < start.
    #[serde(default = "default_inactive_end")]
    pub inactive_end: String,
    /// The chat Tide may nudge. When unset Tide stays idle.
    pub jid: Option<String>,
}

impl Default for TideConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            silence_cooldown_minutes: default_tide_cooldown(),
            silence_cooldown_secs: None,
            inactive_start: default_inactive_start(),
            inactive_end: default_inactive_end(),
            jid: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_timezone")]
    pub user_timezone: String,
    /// "24h" or "12h"; affects timestamps rendered into prompts.
    #[serde(default = "default_time_format")]
    pub time_format: String,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            user_timezone: default_timezone(),
            time_format: default_time_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerConfig {
    pub telegram_user_id: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    pub bot_token: String,
}

impl MoobotConfig {
    /// Load from `path`, resolve `${VAR}` references, apply `MOOBOT_*`
    /// environment overrides. A missing file yields the default document.
    pub fn load(path: &Path) -> Result<Self> {
        let document = match std::fs::read_to_string(path) {
            Ok(raw) => {
                let mut value: serde_json::Value = serde_json::from_str(&raw)
                    .map_err(|e| MoobotError::Config(format!("{}: {e}", path.display())))?;
                resolve_env_refs(&mut value, "")?;
                value
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "config file missing, using defaults");
                serde_json::json!({})
            }
            Err(e) => return Err(MoobotError::Io(e)),
        };

        Figment::from(Serialized::defaults(MoobotConfig::default()))
            .merge(Serialized::defaults(document))
            .merge(Env::prefixed("MOOBOT_").split("__"))
            .extract()
            .map_err(|e| MoobotError::Config(e.to_string()))
    }

    /// Look up an `llm.models` entry by id.
    pub fn model_entry(&self, id: &str) -> Option<&ModelEntry> {
        self.llm.models.iter().find(|m| m.id == id)
    }
}

/// Walk the document and replace `"${VAR}"` string values with the
/// environment variable's contents. Fails on the first unresolved reference.
fn resolve_env_refs(value: &mut serde_json::Value, key_path: &str) -> Result<()> {
    match value {
        serde_json::Value::String(s) => {
            if let Some(var) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
                match std::env::var(var) {
                    Ok(resolved) => *s = resolved,
                    Err(_) => {
                        return Err(MoobotError::UnresolvedEnv {
                            var: var.to_string(),
                            key: key_path.to_string(),
                        })
                    }
                }
            }
        }
        serde_json::Value::Object(map) => {
            for (k, v) in map.iter_mut() {
                let child = if key_path.is_empty() {
                    k.clone()
                } else {
                    format!("{key_path}.{k}")
                };
                resolve_env_refs(v, &child)?;
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter_mut().enumerate() {
                resolve_env_refs(v, &format!("{key_path}[{i}]"))?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn bool_true() -> bool {
    true
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::Chat]
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_enabled_skills() -> Vec<String> {
    ["memory", "cron", "files"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_shell_allow() -> Vec<String> {
    [
        "ls", "pwd", "cat", "head", "tail", "wc", "date", "whoami", "hostname", "uname", "df",
        "uptime", "git log", "git status", "git diff",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_shell_timeout_secs() -> u64 {
    20
}

fn default_shell_max_output() -> usize {
    16 * 1024
}

fn default_chunk_tokens() -> usize {
    512
}

fn default_overlap_tokens() -> usize {
    32
}

fn default_search_k() -> usize {
    6
}

fn default_min_score() -> f32 {
    0.25
}

fn default_sync_interval() -> u64 {
    10
}

fn default_tide_cooldown() -> u64 {
    30
}

fn default_inactive_start() -> String {
    "23:00".to_string()
}

fn default_inactive_end() -> String {
    "08:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_time_format() -> String {
    "24h".to_string()
}
