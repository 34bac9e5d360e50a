//! `files` skill: read, write, and edit workspace files.
//!
//! Not available in groups: a group member must never be able to read or
//! change the owner's workspace.

use async_trait::async_trait;
use serde_json::Value;

use moobot_model::ToolDefinition;

use crate::context::AgentContext;
use crate::registry::{Skill, ToolResult};
use crate::skills::resolve_within;

pub struct FilesSkill;

impl FilesSkill {
    pub fn new() -> Self {
        Self
    }

    fn read(&self, ctx: &AgentContext, args: &Value) -> ToolResult {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let abs = match resolve_within(&ctx.workspace_dir, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let raw = match std::fs::read_to_string(&abs) {
            Ok(raw) => raw,
            Err(e) => return ToolResult::error(format!("{path}: {e}")),
        };
        let from = args
            .get("from")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(1)
            .saturating_sub(1);
        let count = args
            .get("lines")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(200);
        let lines: Vec<&str> = raw.lines().collect();
        let start = from.min(lines.len());
        ToolResult::success(lines[start..(start + count).min(lines.len())].join("\n"))
    }

    fn write(&self, ctx: &AgentContext, args: &Value) -> ToolResult {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let Some(content) = args.get("content").and_then(|v| v.as_str()) else {
            return ToolResult::error("'content' is required");
        };
        let abs = match resolve_within(&ctx.workspace_dir, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        if let Some(parent) = abs.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolResult::error(e.to_string());
            }
        }
        match std::fs::write(&abs, content) {
            Ok(()) => ToolResult::success(format!("Wrote {} bytes to {path}.", content.len())),
            Err(e) => ToolResult::error(format!("{path}: {e}")),
        }
    }

    fn edit(&self, ctx: &AgentContext, args: &Value) -> ToolResult {
        let path = match required_str(args, "path") {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let find = match required_str(args, "find") {
            Ok(f) => f,
            Err(e) => return ToolResult::error(e),
        };
        let Some(replace) = args.get("replace").and_then(|v| v.as_str()) else {
            return ToolResult::error("'replace' is required");
        };
        let abs = match resolve_within(&ctx.workspace_dir, path) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        let raw = match std::fs::read_to_string(&abs) {
            Ok(raw) => raw,
            Err(e) => return ToolResult::error(format!("{path}: {e}")),
        };
        let count = raw.matches(find).count();
        if count == 0 {
            return ToolResult::error(format!("\"{find}\" not found in {path}"));
        }
        let updated = raw.replace(find, replace);
        match std::fs::write(&abs, updated) {
            Ok(()) => ToolResult::success(format!(
                "Replaced {count} occurrence(s) of \"{find}\" in {path}."
            )),
            Err(e) => ToolResult::error(format!("{path}: {e}")),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, String> {
    match args.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(format!("'{key}' is required")),
    }
}

#[async_trait]
impl Skill for FilesSkill {
    fn id(&self) -> &str {
        "files"
    }

    fn doc(&self) -> &str {
        "reads, writes, and edits files inside the workspace (file_read, file_write, \
         file_edit)"
    }

    fn allowed_in_group(&self) -> bool {
        false
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "file_read".to_string(),
                description: "Read a workspace file (optionally a line window).".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "from": { "type": "integer" },
                        "lines": { "type": "integer" }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "file_write".to_string(),
                description: "Write (create or overwrite) a workspace file.".to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }),
            },
            ToolDefinition {
                name: "file_edit".to_string(),
                description: "Replace text in a workspace file. Replaces every occurrence \
                              of 'find' with 'replace'."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "find": { "type": "string" },
                        "replace": { "type": "string" }
                    },
                    "required": ["path", "find", "replace"]
                }),
            },
        ]
    }

    async fn execute(&self, ctx: &AgentContext, tool_name: &str, args: &Value) -> ToolResult {
        match tool_name {
            "file_read" => self.read(ctx, args),
            "file_write" => self.write(ctx, args),
            "file_edit" => self.edit(ctx, args),
            other => ToolResult::error(format!("files skill has no tool {other}")),
        }
    }
}
