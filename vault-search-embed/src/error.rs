//! Error types for the embedding system

use vault_search_context::SplitterError;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Error type for all embedding operations.
///
/// Messages are built so that they never contain the provider credential; they are safe to
/// log and to show to the user.
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// Error when the provider configuration is unusable
    #[error("Invalid embedding configuration: {message}")]
    InvalidConfig { message: String },

    /// The provider call failed (transport, HTTP status, or malformed response)
    #[error("Embedding generation failed: {message}")]
    EmbeddingGeneration {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The number of vectors does not match the number of chunks
    #[error("Embedding count mismatch: {chunks} chunks but {vectors} vectors")]
    CountMismatch { chunks: usize, vectors: usize },

    /// The splitter could not be built
    #[error("Text splitter error: {source}")]
    Splitter {
        #[from]
        source: SplitterError,
    },

    /// Generic errors from other libraries
    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Create an embedding generation error from any error type.
    pub fn embedding_gen<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::EmbeddingGeneration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an embedding generation error that has no underlying error value.
    pub fn embedding_gen_msg(message: impl Into<String>) -> Self {
        Self::EmbeddingGeneration {
            message: message.into(),
            source: None,
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
