use thiserror::Error;

#[derive(Debug, Error)]
pub enum CronError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CronError>;
