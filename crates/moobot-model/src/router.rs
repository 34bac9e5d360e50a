//! Capability routing over the ordered `llm.models` list.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use moobot_core::config::{Capability, LlmConfig, ModelEntry};

use crate::error::{ModelError, Result};
use crate::openai::OpenAiCompatProvider;
use crate::provider::{ChatProvider, Embedder};
use crate::types::{ChatMessage, ChatOutcome, GeneratedImage, ToolDefinition};

struct Slot {
    entry: ModelEntry,
    provider: Arc<dyn ChatProvider>,
}

/// Provider-agnostic front door for every LLM capability.
///
/// Selection policy: providers are tried in declared order; the first that
/// both advertises the capability and has usable credentials wins. The
/// embedding provider is pinned explicitly via `memory.embedding.model_id`
/// when configured; a dangling reference fails construction.
pub struct ModelClient {
    slots: Vec<Slot>,
    embedding_slot: Option<usize>,
}

impl ModelClient {
    pub fn from_config(llm: &LlmConfig, embedding_model_id: Option<&str>) -> Result<Self> {
        let slots: Vec<Slot> = llm
            .models
            .iter()
            .map(|entry| Slot {
                entry: entry.clone(),
                provider: Arc::new(OpenAiCompatProvider::new(
                    entry.id.clone(),
                    entry.api_key.clone(),
                    entry.base_url.clone(),
                    entry.model.clone(),
                )) as Arc<dyn ChatProvider>,
            })
            .collect();

        let embedding_slot = match embedding_model_id {
            Some(id) => {
                let idx = slots
                    .iter()
                    .position(|s| s.entry.id == id && advertises(&s.entry, Capability::Embed))
                    .ok_or_else(|| ModelError::NoProvider {
                        capability: format!("embed (model_id \"{id}\")"),
                    })?;
                Some(idx)
            }
            None => None,
        };

        info!(providers = slots.len(), "model client ready");
        Ok(Self {
            slots,
            embedding_slot,
        })
    }

    fn slot_for(&self, capability: Capability) -> Result<&Slot> {
        self.slots
            .iter()
            .find(|s| advertises(&s.entry, capability) && has_credentials(&s.entry))
            .ok_or_else(|| ModelError::NoProvider {
                capability: format!("{capability:?}").to_lowercase(),
            })
    }

    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: Option<u32>,
    ) -> Result<ChatOutcome> {
        let slot = self.slot_for(Capability::Chat)?;
        debug!(provider = %slot.entry.id, "chat via selected provider");
        slot.provider
            .chat(
                messages,
                tools,
                max_tokens.unwrap_or(slot.entry.max_tokens),
            )
            .await
    }

    pub async fn describe_image(
        &self,
        image_ref: &str,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String> {
        let slot = self.slot_for(Capability::Vision)?;
        slot.provider
            .describe_image(image_ref, prompt, system_prompt)
            .await
    }

    pub async fn generate_image(
        &self,
        prompt: &str,
        size: &str,
        out_dir: &Path,
    ) -> Result<GeneratedImage> {
        let slot = self.slot_for(Capability::ImageGen)?;
        slot.provider.generate_image(prompt, size, out_dir).await
    }

    pub async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let slot = self.slot_for(Capability::Transcribe)?;
        slot.provider.transcribe(audio_path).await
    }

    pub async fn synthesize(&self, text: &str, out_dir: &Path) -> Result<PathBuf> {
        let slot = self.slot_for(Capability::Synthesize)?;
        slot.provider.synthesize(text, out_dir).await
    }
}

#[async_trait]
impl Embedder for ModelClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let slot = match self.embedding_slot {
            Some(idx) => &self.slots[idx],
            None => self.slot_for(Capability::Embed)?,
        };
        slot.provider.embed(texts).await
    }
}

fn advertises(entry: &ModelEntry, capability: Capability) -> bool {
    entry.capabilities.contains(&capability)
}

/// Local plain-HTTP endpoints (Ollama-style) need no key; everything else
/// does.
fn has_credentials(entry: &ModelEntry) -> bool {
    entry
        .api_key
        .as_deref()
        .map(|k| !k.is_empty())
        .unwrap_or(false)
        || entry.base_url.starts_with("http://")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, caps: Vec<Capability>, key: Option<&str>) -> ModelEntry {
        ModelEntry {
            id: id.to_string(),
            api_key: key.map(String::from),
            base_url: "https://api.openai.com".to_string(),
            model: "test-model".to_string(),
            capabilities: caps,
            max_tokens: 4096,
        }
    }

    #[test]
    fn first_credentialed_provider_wins() {
        let llm = LlmConfig {
            models: vec![
                entry("keyless", vec![Capability::Chat], None),
                entry("main", vec![Capability::Chat], Some("sk-x")),
            ],
        };
        let client = ModelClient::from_config(&llm, None).unwrap();
        let slot = client.slot_for(Capability::Chat).unwrap();
        assert_eq!(slot.entry.id, "main");
    }

    #[test]
    fn missing_capability_is_no_provider() {
        let llm = LlmConfig {
            models: vec![entry("main", vec![Capability::Chat], Some("sk-x"))],
        };
        let client = ModelClient::from_config(&llm, None).unwrap();
        assert!(matches!(
            client.slot_for(Capability::ImageGen),
            Err(ModelError::NoProvider { .. })
        ));
    }

    #[test]
    fn dangling_embedding_reference_fails_construction() {
        let llm = LlmConfig {
            models: vec![entry("main", vec![Capability::Chat], Some("sk-x"))],
        };
        assert!(matches!(
            ModelClient::from_config(&llm, Some("nope")),
            Err(ModelError::NoProvider { .. })
        ));
    }

    #[test]
    fn local_http_endpoint_needs_no_key() {
        let mut e = entry("local", vec![Capability::Chat], None);
        e.base_url = "http://127.0.0.1:11434".to_string();
        assert!(has_credentials(&e));
    }
}
