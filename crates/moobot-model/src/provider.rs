use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{ModelError, Result};
use crate::types::{ChatMessage, ChatOutcome, GeneratedImage, ToolDefinition};

/// Common interface for all LLM providers.
///
/// Only `chat` is mandatory. The media operations default to
/// [`ModelError::Unsupported`] so a chat-only backend stays a one-method
/// implementation; the router never routes a capability to a slot that does
/// not advertise it in config anyway.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Provider name for logging and error messages.
    fn name(&self) -> &str;

    /// One chat completion with optional tool calling.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        max_tokens: u32,
    ) -> Result<ChatOutcome>;

    /// One embedding vector per input text.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let _ = texts;
        Err(self.unsupported("embed"))
    }

    /// Vision: describe `image_ref` (URL or data URI).
    async fn describe_image(
        &self,
        image_ref: &str,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String> {
        let _ = (image_ref, prompt, system_prompt);
        Err(self.unsupported("describe_image"))
    }

    /// Generate an image and save it under `out_dir`.
    async fn generate_image(
        &self,
        prompt: &str,
        size: &str,
        out_dir: &Path,
    ) -> Result<GeneratedImage> {
        let _ = (prompt, size, out_dir);
        Err(self.unsupported("generate_image"))
    }

    /// Speech-to-text for a local audio file.
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let _ = audio_path;
        Err(self.unsupported("transcribe"))
    }

    /// Text-to-speech; returns the saved audio path.
    async fn synthesize(&self, text: &str, out_dir: &Path) -> Result<PathBuf> {
        let _ = (text, out_dir);
        Err(self.unsupported("synthesize"))
    }

    fn unsupported(&self, operation: &str) -> ModelError {
        ModelError::Unsupported {
            provider: self.name().to_string(),
            operation: operation.to_string(),
        }
    }
}

/// Narrow embedding seam consumed by the memory index. Implemented by
/// [`crate::ModelClient`]; tests substitute a deterministic stub.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
