//! `image` and `voice` skills: generation delegated to the model client,
//! delivery queued on the turn's side channel.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use moobot_model::{ModelClient, ToolDefinition};

use crate::context::{AgentContext, SidePayload};
use crate::registry::{Skill, ToolResult};

pub struct ImageSkill {
    model: Arc<ModelClient>,
}

impl ImageSkill {
    pub fn new(model: Arc<ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Skill for ImageSkill {
    fn id(&self) -> &str {
        "image"
    }

    fn doc(&self) -> &str {
        "generates an image from a prompt and attaches it to the reply (image_generate)"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "image_generate".to_string(),
            description: "Generate an image and attach it to the reply.".to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string" },
                    "size": { "type": "string", "description": "e.g. 1024x1024" }
                },
                "required": ["prompt"]
            }),
        }]
    }

    async fn execute(&self, ctx: &AgentContext, tool_name: &str, args: &Value) -> ToolResult {
        if tool_name != "image_generate" {
            return ToolResult::error(format!("image skill has no tool {tool_name}"));
        }
        let Some(prompt) = args.get("prompt").and_then(|v| v.as_str()) else {
            return ToolResult::error("'prompt' is required");
        };
        let size = args
            .get("size")
            .and_then(|v| v.as_str())
            .unwrap_or("1024x1024");

        match self
            .model
            .generate_image(prompt, size, &ctx.uploads_dir())
            .await
        {
            Ok(image) => {
                ctx.push_side(SidePayload::ImageReply {
                    path: image.path.clone(),
                    caption: image.caption.clone(),
                });
                ToolResult::success(
                    "Image generated and attached to the reply. Do not describe it again.",
                )
            }
            Err(e) => ToolResult::error(format!("image generation failed: {e}")),
        }
    }
}

pub struct VoiceSkill {
    model: Arc<ModelClient>,
}

impl VoiceSkill {
    pub fn new(model: Arc<ModelClient>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Skill for VoiceSkill {
    fn id(&self) -> &str {
        "voice"
    }

    fn doc(&self) -> &str {
        "speaks a reply aloud as a voice note (voice_reply)"
    }

    fn tools(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "voice_reply".to_string(),
            description: "Synthesise the given text as a voice note attached to the reply."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            }),
        }]
    }

    async fn execute(&self, ctx: &AgentContext, tool_name: &str, args: &Value) -> ToolResult {
        if tool_name != "voice_reply" {
            return ToolResult::error(format!("voice skill has no tool {tool_name}"));
        }
        let Some(text) = args.get("text").and_then(|v| v.as_str()) else {
            return ToolResult::error("'text' is required");
        };

        match self.model.synthesize(text, &ctx.uploads_dir()).await {
            Ok(path) => {
                ctx.push_side(SidePayload::VoiceReply { path });
                ToolResult::success("Voice note attached to the reply.")
            }
            Err(e) => ToolResult::error(format!("speech synthesis failed: {e}")),
        }
    }
}
