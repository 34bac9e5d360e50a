//! Skill trait + the static registry.
//!
//! The registry is built once at startup from `skills.enabled` and is
//! immutable afterwards: a list of skills plus a tool-name → skill map.
//! Dispatch never propagates executor failures; they come back as
//! `{"error": …}` tool-result strings so the model can self-correct.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use moobot_core::config::ShellSkillConfig;
use moobot_memory::MemoryIndex;
use moobot_model::{ModelClient, ToolDefinition};

use crate::context::AgentContext;
use crate::error::{AgentError, Result};
use crate::skills;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text content returned to the LLM.
    pub content: String,
    /// Whether the tool execution failed.
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// A named capability with one or more tools.
#[async_trait]
pub trait Skill: Send + Sync {
    /// Stable skill identifier (matches `skills.enabled` entries).
    fn id(&self) -> &str;

    /// One line injected into the system prompt so the model knows when to
    /// reach for this skill.
    fn doc(&self) -> &str;

    /// Tool schemas this skill exposes. Single-tool skills expose one tool
    /// whose name equals the skill id.
    fn tools(&self) -> Vec<ToolDefinition>;

    /// Skills touching the local machine are kept out of group chats.
    fn allowed_in_group(&self) -> bool {
        true
    }

    /// Execute one tool. Failures are reported through the returned
    /// [`ToolResult`], never by panicking.
    async fn execute(
        &self,
        ctx: &AgentContext,
        tool_name: &str,
        args: &serde_json::Value,
    ) -> ToolResult;
}

/// Everything skill constructors may need.
pub struct SkillDeps {
    pub model: Arc<ModelClient>,
    pub memory: Option<Arc<MemoryIndex>>,
    pub shell: ShellSkillConfig,
}

pub struct SkillRegistry {
    skills: Vec<Arc<dyn Skill>>,
    by_tool: HashMap<String, usize>,
}

impl std::fmt::Debug for SkillRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkillRegistry")
            .field("skills", &self.skills.len())
            .field("by_tool", &self.by_tool)
            .finish()
    }
}

impl SkillRegistry {
    /// Build from the enabled-id list. Unknown ids are a startup error;
    /// a skill whose dependency is switched off (memory) is skipped with a
    /// warning rather than failing the boot.
    pub fn build(enabled: &[String], deps: &SkillDeps) -> Result<Self> {
        let mut skills: Vec<Arc<dyn Skill>> = Vec::new();
        for id in enabled {
            match id.as_str() {
                "memory" => match &deps.memory {
                    Some(index) => {
                        skills.push(Arc::new(skills::memory::MemorySkill::new(Arc::clone(index))))
                    }
                    None => warn!("memory skill enabled but memory.enabled is false, skipping"),
                },
                "cron" => skills.push(Arc::new(skills::cron::CronSkill::new())),
                "files" => skills.push(Arc::new(skills::files::FilesSkill::new())),
                "shell" => skills.push(Arc::new(skills::shell::ShellSkill::new(
                    deps.shell.clone(),
                ))),
                "image" => skills.push(Arc::new(skills::media::ImageSkill::new(Arc::clone(
                    &deps.model,
                )))),
                "voice" => skills.push(Arc::new(skills::media::VoiceSkill::new(Arc::clone(
                    &deps.model,
                )))),
                other => return Err(AgentError::UnknownSkill(other.to_string())),
            }
        }

        let mut by_tool = HashMap::new();
        for (i, skill) in skills.iter().enumerate() {
            for tool in skill.tools() {
                by_tool.insert(tool.name, i);
            }
        }
        Ok(Self { skills, by_tool })
    }

    /// Tool list for one turn, honouring the group filter.
    pub fn tool_definitions(&self, is_group: bool) -> Vec<ToolDefinition> {
        self.skills
            .iter()
            .filter(|s| !is_group || s.allowed_in_group())
            .flat_map(|s| s.tools())
            .collect()
    }

    /// Skill-doc block for the system prompt, filtered the same way.
    pub fn skill_docs(&self, is_group: bool) -> String {
        self.skills
            .iter()
            .filter(|s| !is_group || s.allowed_in_group())
            .map(|s| format!("- {}: {}\n", s.id(), s.doc()))
            .collect()
    }

    /// Dispatch one tool call. Always returns a tool-result string.
    pub async fn dispatch(
        &self,
        ctx: &AgentContext,
        tool_name: &str,
        args: &serde_json::Value,
    ) -> String {
        let Some(&idx) = self.by_tool.get(tool_name) else {
            return error_json(&format!("unknown tool: {tool_name}"));
        };
        let skill = &self.skills[idx];
        if ctx.is_group && !skill.allowed_in_group() {
            return error_json(&format!("tool {tool_name} is not available in group chats"));
        }

        debug!(tool = tool_name, skill = skill.id(), "dispatching tool call");
        let result = skill.execute(ctx, tool_name, args).await;
        if result.is_error {
            error_json(&result.content)
        } else {
            result.content
        }
    }
}

fn error_json(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use moobot_core::config::LlmConfig;
    use moobot_cron::CronStore;

    fn deps() -> SkillDeps {
        SkillDeps {
            model: Arc::new(ModelClient::from_config(&LlmConfig::default(), None).unwrap()),
            memory: None,
            shell: ShellSkillConfig::default(),
        }
    }

    fn ctx(dir: &std::path::Path, is_group: bool) -> AgentContext {
        AgentContext::new(
            dir.to_path_buf(),
            dir.join("workspace"),
            "12345".to_string(),
            is_group,
            Arc::new(CronStore::open(dir.join("cron.json")).unwrap()),
            chrono_tz::UTC,
        )
    }

    #[test]
    fn unknown_skill_id_is_rejected() {
        let err = SkillRegistry::build(&["teleport".to_string()], &deps()).unwrap_err();
        assert!(matches!(err, AgentError::UnknownSkill(_)));
    }

    #[test]
    fn group_filter_hides_file_tools() {
        let registry =
            SkillRegistry::build(&["cron".to_string(), "files".to_string()], &deps()).unwrap();
        let private: Vec<String> = registry
            .tool_definitions(false)
            .into_iter()
            .map(|t| t.name)
            .collect();
        let group: Vec<String> = registry
            .tool_definitions(true)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert!(private.contains(&"file_edit".to_string()));
        assert!(!group.contains(&"file_edit".to_string()));
        assert!(group.contains(&"cron_add".to_string()));
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_result() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::build(&["cron".to_string()], &deps()).unwrap();
        let out = registry
            .dispatch(&ctx(dir.path(), false), "warp_drive", &serde_json::json!({}))
            .await;
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert!(parsed["error"]
            .as_str()
            .unwrap()
            .contains("unknown tool"));
    }

    #[tokio::test]
    async fn group_dispatch_of_private_tool_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let registry = SkillRegistry::build(&["files".to_string()], &deps()).unwrap();
        let out = registry
            .dispatch(
                &ctx(dir.path(), true),
                "file_read",
                &serde_json::json!({"path": "x"}),
            )
            .await;
        assert!(out.contains("not available in group chats"));
    }
}
