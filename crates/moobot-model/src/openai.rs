//! OpenAI-compatible HTTP provider.
//!
//! Covers chat completions (with tool calling), embeddings, vision via
//! image-URL content parts, image generation, and the two audio endpoints.
//! `base_url` selects the actual backend; any service speaking this surface
//! (OpenAI, Groq, OpenRouter, a local llama.cpp server) plugs in unchanged.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ModelError, Result};
use crate::provider::ChatProvider;
use crate::types::{ChatMessage, ChatOutcome, GeneratedImage, Role, ToolCall, ToolDefinition};

/// Per-request deadline so a stuck backend cannot monopolise a turn.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    provider_name: String,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    /// `base_url` should NOT include a trailing slash.
    pub fn new(
        name: impl Into<String>,
        api_key: Option<String>,
        base_url: String,
        model: String,
    ) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .expect("reqwest client"),
            provider_name: name.into(),
            api_key,
            base_url,
            model,
        }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.post(&url);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        req
    }

    /// Shared non-2xx handling. 429 surfaces the retry-after hint.
    async fn check_status(&self, resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ModelError::RateLimited {
                retry_after_ms: retry,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = %self.provider_name, status, body = %text, "API error");
            return Err(ModelError::Api {
                status,
                message: text,
            });
        }
        Ok(resp)
    }

    async fn chat_raw(&self, body: serde_json::Value) -> Result<ApiChatResponse> {
        let resp = self
            .request("/v1/chat/completions")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        resp.json()
            .await
            .map_err(|e| ModelError::Contract(e.to_string()))
    }
}

#[async_trait]
impl ChatProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<ChatOutcome> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages.iter().map(wire_message).collect::<Vec<_>>(),
            "max_tokens": max_tokens,
        });
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools.iter().map(wire_tool).collect());
        }

        debug!(provider = %self.provider_name, model = %self.model, tools = tools.len(), "chat request");

        let api_resp = self.chat_raw(body).await?;
        parse_chat_response(api_resp)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let resp = self
            .request("/v1/embeddings")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        let api_resp: ApiEmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Contract(e.to_string()))?;

        if api_resp.data.len() != texts.len() {
            return Err(ModelError::Contract(format!(
                "embedding count mismatch: {} inputs, {} vectors",
                texts.len(),
                api_resp.data.len()
            )));
        }
        let mut data = api_resp.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn describe_image(
        &self,
        image_ref: &str,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1024,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": [
                    { "type": "text", "text": prompt },
                    { "type": "image_url", "image_url": { "url": image_ref } },
                ]},
            ],
        });
        let api_resp = self.chat_raw(body).await?;
        match parse_chat_response(api_resp)? {
            ChatOutcome::Text(text) => Ok(text),
            ChatOutcome::ToolCalls { .. } => Err(ModelError::Contract(
                "vision response carried tool calls".to_string(),
            )),
        }
    }

    async fn generate_image(
        &self,
        prompt: &str,
        size: &str,
        out_dir: &Path,
    ) -> Result<GeneratedImage> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "size": size,
            "n": 1,
            "response_format": "b64_json",
        });
        let resp = self
            .request("/v1/images/generations")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        let api_resp: ApiImageResponse = resp
            .json()
            .await
            .map_err(|e| ModelError::Contract(e.to_string()))?;

        let item = api_resp
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Contract("image response had no data".to_string()))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(item.b64_json.as_deref().unwrap_or_default())
            .map_err(|e| ModelError::Contract(format!("bad image base64: {e}")))?;

        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join(format!("gen-{}.png", uuid::Uuid::new_v4()));
        std::fs::write(&path, bytes)?;
        debug!(path = %path.display(), "image saved");

        Ok(GeneratedImage {
            path,
            caption: item.revised_prompt,
        })
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let bytes = std::fs::read(audio_path)?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.ogg".to_string());
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            );

        let resp = self
            .request("/v1/audio/transcriptions")
            .multipart(form)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        let api_resp: ApiTranscription = resp
            .json()
            .await
            .map_err(|e| ModelError::Contract(e.to_string()))?;
        Ok(api_resp.text)
    }

    async fn synthesize(&self, text: &str, out_dir: &Path) -> Result<PathBuf> {
        let body = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": "alloy",
            "response_format": "opus",
        });
        let resp = self
            .request("/v1/audio/speech")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;
        let resp = self.check_status(resp).await?;
        let bytes = resp.bytes().await?;

        std::fs::create_dir_all(out_dir)?;
        let path = out_dir.join(format!("tts-{}.ogg", uuid::Uuid::new_v4()));
        std::fs::write(&path, &bytes)?;
        Ok(path)
    }
}

/// Convert a local file path to a `data:` URI for vision requests.
pub fn path_to_data_uri(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let mime = match path.extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

fn wire_message(msg: &ChatMessage) -> serde_json::Value {
    let role = match msg.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };
    let mut value = serde_json::json!({ "role": role, "content": msg.content });
    if !msg.tool_calls.is_empty() {
        value["tool_calls"] = serde_json::Value::Array(
            msg.tool_calls
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            // Arguments travel as a JSON-encoded string.
                            "arguments": c.arguments.to_string(),
                        },
                    })
                })
                .collect(),
        );
    }
    if let Some(ref id) = msg.tool_call_id {
        value["tool_call_id"] = serde_json::Value::String(id.clone());
    }
    if let Some(ref name) = msg.name {
        value["name"] = serde_json::Value::String(name.clone());
    }
    value
}

fn wire_tool(tool: &ToolDefinition) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}

fn parse_chat_response(resp: ApiChatResponse) -> Result<ChatOutcome> {
    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Contract("response had no choices".to_string()))?;

    let calls: Vec<ToolCall> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|c| {
            // Malformed argument JSON becomes an empty object; the executor
            // reports missing keys back to the model as a tool result.
            let arguments = serde_json::from_str(&c.function.arguments)
                .unwrap_or_else(|_| serde_json::json!({}));
            ToolCall {
                id: c.id,
                name: c.function.name,
                arguments,
            }
        })
        .collect();

    let text = choice.message.content.filter(|t| !t.is_empty());

    if !calls.is_empty() {
        return Ok(ChatOutcome::ToolCalls { text, calls });
    }
    match text {
        Some(t) => Ok(ChatOutcome::Text(t)),
        None => Err(ModelError::Contract(
            "response carried neither text nor tool calls".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct ApiChatResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ApiEmbeddingResponse {
    data: Vec<ApiEmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct ApiEmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiImageResponse {
    data: Vec<ApiImageItem>,
}

#[derive(Debug, Deserialize)]
struct ApiImageItem {
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiTranscription {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_resp(json: serde_json::Value) -> ApiChatResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parse_terminal_text() {
        let resp = chat_resp(serde_json::json!({
            "choices": [{ "message": { "content": "hello" } }]
        }));
        match parse_chat_response(resp).unwrap() {
            ChatOutcome::Text(t) => assert_eq!(t, "hello"),
            _ => panic!("expected text"),
        }
    }

    #[test]
    fn parse_tool_calls() {
        let resp = chat_resp(serde_json::json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "cron_add", "arguments": "{\"in_seconds\":120}" },
                }],
            }}]
        }));
        match parse_chat_response(resp).unwrap() {
            ChatOutcome::ToolCalls { text, calls } => {
                assert!(text.is_none());
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].name, "cron_add");
                assert_eq!(calls[0].arguments["in_seconds"], 120);
            }
            _ => panic!("expected tool calls"),
        }
    }

    #[test]
    fn empty_response_is_contract_error() {
        let resp = chat_resp(serde_json::json!({
            "choices": [{ "message": { "content": null } }]
        }));
        assert!(matches!(
            parse_chat_response(resp),
            Err(ModelError::Contract(_))
        ));
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        let resp = chat_resp(serde_json::json!({
            "choices": [{ "message": {
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "x", "arguments": "{broken" },
                }],
            }}]
        }));
        match parse_chat_response(resp).unwrap() {
            ChatOutcome::ToolCalls { calls, .. } => {
                assert_eq!(calls[0].arguments, serde_json::json!({}));
            }
            _ => panic!("expected tool calls"),
        }
    }

    #[test]
    fn tool_message_wire_shape() {
        let msg = ChatMessage::tool_result("call_9", "memory_search", "{\"error\":\"boom\"}");
        let wire = wire_message(&msg);
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "call_9");
        assert_eq!(wire["name"], "memory_search");
    }
}
