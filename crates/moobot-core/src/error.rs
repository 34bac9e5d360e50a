use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoobotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unresolved environment reference: {var} (referenced by {key})")]
    UnresolvedEnv { var: String, key: String },

    #[error("Transport error ({kind}): {reason}")]
    Transport { kind: String, reason: String },

    #[error("No transport wired for {kind}")]
    TransportNotWired { kind: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MoobotError>;
