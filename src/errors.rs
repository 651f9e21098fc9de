// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types shared by the embedding, distance and ranking layers.

/// Errors surfaced to callers of the library.
///
/// Every variant is recoverable at the orchestrator/engine boundary; the
/// transport in front of the library decides how to report it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Embedding failed for input {position}{}: {message}", id_suffix(.id))]
    EmbeddingFailure {
        position: usize,
        id: Option<String>,
        message: String,
    },

    #[error("Invalid structure at input {position}: {message}")]
    InvalidStructure { position: usize, message: String },

    #[error("Structure at input {position} has {length} nodes, shorter than window length {window}")]
    TooShort {
        position: usize,
        length: usize,
        window: usize,
    },

    #[error("Vector format error: {0}")]
    VectorFormat(String),

    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }

    /// Attaches an identifier to an embedding failure. Other variants pass through.
    pub fn with_id(self, record_id: &str) -> Self {
        match self {
            Error::EmbeddingFailure {
                position, message, ..
            } => Error::EmbeddingFailure {
                position,
                id: Some(record_id.to_string()),
                message,
            },
            other => other,
        }
    }
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_ref().map(|id| format!(" ({})", id)).unwrap_or_default()
}
