use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The response violated the chat contract (neither text nor tool calls,
    /// or an unparseable body).
    #[error("Contract error: {0}")]
    Contract(String),

    #[error("No provider configured for capability {capability}")]
    NoProvider { capability: String },

    #[error("Provider {provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ModelError>;
