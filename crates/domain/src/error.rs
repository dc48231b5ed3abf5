/// Shared error type used across all MGX crates.
///
/// The variants mirror the failure classes the runtime distinguishes:
/// invariant violations abort a run, persistence and model errors are
/// retried with bounded back-off, tool errors are surfaced to the LLM as
/// tool results, auth errors never leave the HTTP layer.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invariant: {0}")]
    Invariant(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("tool {tool}: {message}")]
    Tool { tool: String, message: String },

    #[error("model {provider}: {message}")]
    Model { provider: String, message: String },

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("agent context not set for this task")]
    ContextNotSet,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a retry with back-off is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Persistence(_) | Error::Model { .. } | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
