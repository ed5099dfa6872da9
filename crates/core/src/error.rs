//! Error types for DashLens.
//!
//! A single error enum covers every failure category in the workspace:
//! configuration, I/O, language-model calls, embeddings, the context store,
//! the vector index, relevance selection and dashboard summarization.

use thiserror::Error;

/// Unified error type for DashLens.
///
/// All fallible functions return `Result<T, AppError>`.
/// Library code never panics; failures are represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// LLM provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Embedding provider errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Context store errors (malformed records, bad ids)
    #[error("Context store error: {0}")]
    Store(String),

    /// Vector index errors
    #[error("Index error: {0}")]
    Index(String),

    /// Relevance ranking errors
    #[error("Selection error: {0}")]
    Selection(String),

    /// Dashboard capture and summarization errors
    #[error("Summarize error: {0}")]
    Summarize(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Operation exceeded its time budget
    #[error("Timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Build a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        AppError::Timeout {
            operation: operation.into(),
            secs,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
