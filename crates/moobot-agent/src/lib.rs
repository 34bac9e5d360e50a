//! `moobot-agent`: the tool-using conversation loop and everything it
//! dispatches to.
//!
//! Flow: prompt → LLM → if tool calls → execute skills → inject results →
//! LLM → repeat. Stops on terminal text, the iteration cap, or the turn
//! deadline.

pub mod context;
pub mod error;
pub mod prompt;
pub mod registry;
pub mod skills;
pub mod turn;

pub use context::{AgentContext, SidePayload};
pub use error::{AgentError, Result};
pub use prompt::PromptBuilder;
pub use registry::{SkillRegistry, ToolResult};
pub use turn::run_turn;
