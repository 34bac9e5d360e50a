//! `moobot-model`: uniform access to LLM capabilities irrespective of
//! provider.
//!
//! [`ModelClient`] fronts an ordered list of provider slots built from
//! `llm.models`. For each capability the first slot that advertises it and
//! has usable credentials wins. All current backends speak the
//! OpenAI-compatible HTTP surface ([`openai::OpenAiCompatProvider`]).

pub mod error;
pub mod openai;
pub mod provider;
pub mod router;
pub mod types;

pub use error::{ModelError, Result};
pub use provider::{ChatProvider, Embedder};
pub use router::ModelClient;
pub use types::{ChatMessage, ChatOutcome, GeneratedImage, Role, ToolCall, ToolDefinition};
