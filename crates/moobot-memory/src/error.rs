use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Embedding error: {0}")]
    Embedding(#[from] moobot_model::ModelError),

    #[error("Embedding dimension changed: index has {stored}, provider returned {got}")]
    DimensionMismatch { stored: usize, got: usize },

    #[error("Path not readable through memory: {0}")]
    NotReadable(String),

    #[error("Invalid date filter: {0}")]
    InvalidDateFilter(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
