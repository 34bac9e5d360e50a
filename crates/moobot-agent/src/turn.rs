//! The agent loop: one user (or cron/Tide) event in, one reply out.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use moobot_model::{ChatMessage, ChatOutcome, ModelClient, ToolDefinition};

use crate::context::AgentContext;
use crate::error::Result;
use crate::registry::SkillRegistry;

/// Safety cap on model round-trips per turn.
pub const MAX_TOOL_ITERATIONS: usize = 8;
/// Wall-clock bound for a whole turn.
pub const TURN_DEADLINE: Duration = Duration::from_secs(120);

/// The slice of the model client the loop needs; tests substitute a
/// scripted implementation.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> moobot_model::Result<ChatOutcome>;
}

#[async_trait]
impl ChatBackend for ModelClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> moobot_model::Result<ChatOutcome> {
        ModelClient::chat(self, messages, tools, None).await
    }
}

/// Run one agent turn. Returns the final reply text; model transport
/// failures bubble up as errors (the caller decides between a user-facing
/// sentence and the cron retry ladder). The iteration cap and the deadline
/// both produce a finite, non-empty reply instead of an error.
pub async fn run_turn(
    chat: &dyn ChatBackend,
    registry: &SkillRegistry,
    ctx: &AgentContext,
    system_prompt: &str,
    history: &[ChatMessage],
    user_text: &str,
) -> Result<String> {
    match tokio::time::timeout(
        TURN_DEADLINE,
        run_turn_inner(chat, registry, ctx, system_prompt, history, user_text),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            warn!(jid = %ctx.jid, "turn deadline exceeded");
            Ok(format!(
                "Sorry, that took longer than {}s and I had to stop partway through.",
                TURN_DEADLINE.as_secs()
            ))
        }
    }
}

async fn run_turn_inner(
    chat: &dyn ChatBackend,
    registry: &SkillRegistry,
    ctx: &AgentContext,
    system_prompt: &str,
    history: &[ChatMessage],
    user_text: &str,
) -> Result<String> {
    let tools = registry.tool_definitions(ctx.is_group);

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(user_text));

    for iteration in 0..MAX_TOOL_ITERATIONS {
        debug!(iteration, "agent loop iteration");
        match chat.chat(&messages, &tools).await? {
            ChatOutcome::Text(text) => {
                info!(iteration, "agent loop complete");
                return Ok(strip_reply(&text));
            }
            ChatOutcome::ToolCalls { text, calls } => {
                messages.push(ChatMessage::assistant_with_calls(
                    text.unwrap_or_default(),
                    calls.clone(),
                ));
                // Execute in the order the model returned.
                for call in &calls {
                    let result = registry.dispatch(ctx, &call.name, &call.arguments).await;
                    messages.push(ChatMessage::tool_result(&call.id, &call.name, result));
                }
            }
        }
    }

    warn!(max = MAX_TOOL_ITERATIONS, "agent loop hit the iteration cap");
    Ok(format!(
        "I stopped after {MAX_TOOL_ITERATIONS} tool steps without reaching a final answer."
    ))
}

/// Strip provider-specific reasoning blocks and optional prefix markers so
/// the transport only ever sees the reply itself.
pub fn strip_reply(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("<think>") {
        out.push_str(&rest[..open]);
        match rest[open..].find("</think>") {
            Some(close) => rest = &rest[open + close + "</think>".len()..],
            None => {
                // Unterminated block: drop the tail.
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    let mut trimmed = out.trim();
    for marker in ["[Bot]", "Assistant:", "AI:"] {
        if let Some(stripped) = trimmed.strip_prefix(marker) {
            trimmed = stripped.trim_start();
            break;
        }
    }
    trimmed.to_string()
}
