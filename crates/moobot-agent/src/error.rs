use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The model could not be reached outside tool execution.
    #[error("Model error: {0}")]
    Model(#[from] moobot_model::ModelError),

    #[error("Unknown skill id in skills.enabled: {0}")]
    UnknownSkill(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
