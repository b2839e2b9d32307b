//! Error types for the financial Q&A agent

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Pipeline Stage Errors
    // =============================

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Synthesis error: {0}")]
    SynthesisError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Completion error: {0}")]
    CompletionError(String),

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Snapshot error: {0}")]
    SnapshotError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Fatal per-request path: the embedding provider or chunk index was
    /// unreachable for every retrieval attempt of a query.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
