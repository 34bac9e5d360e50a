//! `memory` skill: semantic recall over the index.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use moobot_memory::{MemoryIndex, SearchOptions};
use moobot_model::ToolDefinition;

use crate::context::AgentContext;
use crate::registry::{Skill, ToolResult};

pub struct MemorySkill {
    index: Arc<MemoryIndex>,
}

impl MemorySkill {
    pub fn new(index: Arc<MemoryIndex>) -> Self {
        Self { index }
    }

    async fn search(&self, args: &Value) -> ToolResult {
        let query = match args.get("query").and_then(|v| v.as_str()) {
            Some(q) if !q.is_empty() => q,
            _ => return ToolResult::error("'query' is required"),
        };
        let opts = SearchOptions {
            k: args.get("k").and_then(|v| v.as_u64()).map(|k| k as usize),
            min_score: args
                .get("min_score")
                .and_then(|v| v.as_f64())
                .map(|s| s as f32),
            date_from: parse_date(args.get("date_from")),
            date_to: parse_date(args.get("date_to")),
            date_range: args
                .get("date_range")
                .and_then(|v| v.as_str())
                .map(String::from),
        };

        match self.index.search(query, &opts).await {
            Ok(hits) if hits.is_empty() => ToolResult::success("No matching memories."),
            Ok(hits) => match serde_json::to_string_pretty(&hits) {
                Ok(json) => ToolResult::success(json),
                Err(e) => ToolResult::error(e.to_string()),
            },
            Err(e) => ToolResult::error(e.to_string()),
        }
    }

    fn get(&self, args: &Value) -> ToolResult {
        let path = match args.get("path").and_then(|v| v.as_str()) {
            Some(p) if !p.is_empty() => p,
            _ => return ToolResult::error("'path' is required"),
        };
        let from = args.get("from").and_then(|v| v.as_u64()).map(|n| n as usize);
        let lines = args
            .get("lines")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize);
        match self.index.read_file(path, from, lines) {
            Ok(text) if text.is_empty() => ToolResult::success("(empty window)"),
            Ok(text) => ToolResult::success(text),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

fn parse_date(value: Option<&Value>) -> Option<NaiveDate> {
    value
        .and_then(|v| v.as_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

#[async_trait]
impl Skill for MemorySkill {
    fn id(&self) -> &str {
        "memory"
    }

    fn doc(&self) -> &str {
        "semantic search over notes and past conversations (memory_search), plus \
         windowed reads of the underlying files (memory_get)"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "memory_search".to_string(),
                description: "Search notes and chat history semantically. Supports date \
                              filtering via date_from/date_to (YYYY-MM-DD) or date_range \
                              (yesterday, last_week, last_7_days, last_month)."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string" },
                        "k": { "type": "integer" },
                        "min_score": { "type": "number" },
                        "date_from": { "type": "string" },
                        "date_to": { "type": "string" },
                        "date_range": { "type": "string" }
                    },
                    "required": ["query"]
                }),
            },
            ToolDefinition {
                name: "memory_get".to_string(),
                description: "Read a line window from a note or chat-log file returned by \
                              memory_search."
                    .to_string(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "from": { "type": "integer", "description": "1-based first line" },
                        "lines": { "type": "integer" }
                    },
                    "required": ["path"]
                }),
            },
        ]
    }

    async fn execute(&self, _ctx: &AgentContext, tool_name: &str, args: &Value) -> ToolResult {
        match tool_name {
            "memory_search" => self.search(args).await,
            "memory_get" => self.get(args),
            other => ToolResult::error(format!("memory skill has no tool {other}")),
        }
    }
}
