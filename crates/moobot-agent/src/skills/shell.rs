//! `shell` skill: run a command from a configured allow-list.
//!
//! The guardrails are data, not scattered checks: an allow-list of command
//! prefixes, a flat refusal of shell operators (so `echo x > file` cannot
//! ride the `echo` prefix), a per-call timeout, and an output cap. The
//! skill is never exposed in group chats.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use moobot_core::config::ShellSkillConfig;
use moobot_model::ToolDefinition;

use crate::context::AgentContext;
use crate::registry::{Skill, ToolResult};

pub struct ShellSkill {
    cfg: ShellSkillConfig,
}

impl ShellSkill {
    pub fn new(cfg: ShellSkillConfig) -> Self {
        Self { cfg }
    }

    /// Allow-list gate. Returns the reason when the command is refused.
    fn check(&self, command: &str) -> Result<(), String> {
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return Err("empty command".to_string());
        }
        if has_shell_operators(trimmed) {
            return Err("shell operators (|, >, ;, &&, $(), `) are not allowed".to_string());
        }
        let lower = trimmed.to_lowercase();
        if !self.cfg.allow.iter().any(|p| lower.starts_with(p.as_str())) {
            return Err(format!(
                "command not in the allow-list: {}",
                trimmed.split_whitespace().next().unwrap_or(trimmed)
            ));
        }
        Ok(())
    }

    async fn run(&self, ctx: &AgentContext, command: &str) -> ToolResult {
        if let Err(reason) = self.check(command) {
            return ToolResult::error(reason);
        }

        let mut parts = command.trim().split_whitespace();
        let program = parts.next().unwrap_or_default().to_string();
        let args: Vec<String> = parts.map(String::from).collect();

        debug!(%program, "shell skill executing");
        let output = tokio::time::timeout(
            Duration::from_secs(self.cfg.timeout_secs),
            tokio::process::Command::new(&program)
                .args(&args)
                .current_dir(&ctx.workspace_dir)
                .output(),
        )
        .await;

        match output {
            Err(_) => ToolResult::error(format!(
                "command timed out after {}s",
                self.cfg.timeout_secs
            )),
            Ok(Err(e)) => ToolResult::error(format!("{program}: {e}")),
            Ok(Ok(out)) => {
                let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
                if !out.stderr.is_empty() {
                    text.push_str(&String::from_utf8_lossy(&out.stderr));
                }
                if text.len() > self.cfg.max_output_bytes {
                    text.truncate(self.cfg.max_output_bytes);
                    text.push_str("\n[output truncated]");
                }
                if out.status.success() {
                    ToolResult::success(if text.is_empty() {
                        "(no output)".to_string()
                    } else {
                        text
                    })
                } else {
                    ToolResult::error(format!("exit status {}: {text}", out.status))
                }
            }
        }
    }
}

fn has_shell_operators(command: &str) -> bool {
    command.contains('|')
        || command.contains('>')
        || command.contains('<')
        || command.contains(';')
        || command.contains("&&")
        || command.contains("$(")
        || command.contains('`')
}

#[async_trait]
impl Skill for ShellSkill {
    fn id(&self) -> &str {
        "shell"
    }

    fn doc(&self) -> &str {
        "runs a read-only command from a small allow-list inside the workspace (shell_run)"
    }

    fn allowed_in_group(&self) -> bool {
        false
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "shell_run".to_string(),
            description: "Run an allow-listed command (no pipes or redirection) and return \
                          its output."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "command": { "type": "string" } },
                "required": ["command"]
            }),
        }]
    }

    async fn execute(&self, ctx: &AgentContext, tool_name: &str, args: &Value) -> ToolResult {
        if tool_name != "shell_run" {
            return ToolResult::error(format!("shell skill has no tool {tool_name}"));
        }
        let Some(command) = args.get("command").and_then(|v| v.as_str()) else {
            return ToolResult::error("'command' is required");
        };
        self.run(ctx, command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skill() -> ShellSkill {
        ShellSkill::new(ShellSkillConfig::default())
    }

    #[test]
    fn allowlisted_plain_command_passes() {
        assert!(skill().check("ls").is_ok());
        assert!(skill().check("date").is_ok());
        assert!(skill().check("git status --short").is_ok());
    }

    #[test]
    fn operators_are_refused_even_with_allowed_prefix() {
        assert!(skill().check("cat foo > /etc/passwd").is_err());
        assert!(skill().check("ls | wc -l").is_err());
        assert!(skill().check("date; rm -rf /").is_err());
        assert!(skill().check("cat `which sh`").is_err());
    }

    #[test]
    fn non_allowlisted_command_is_refused() {
        assert!(skill().check("rm -rf /").is_err());
        assert!(skill().check("curl example.com").is_err());
    }
}
