//! Error types for text splitting

/// Result type for splitter operations.
pub type Result<T> = std::result::Result<T, SplitterError>;

/// Errors raised while configuring a splitter or its token counter.
///
/// Splitting itself never fails once a [`RecursiveTextSplitter`](crate::RecursiveTextSplitter)
/// has been built; every error surfaces at construction time.
#[derive(Debug, thiserror::Error)]
pub enum SplitterError {
    /// Chunk size, overlap or separator list is unusable
    #[error("Invalid splitter configuration: {message}")]
    InvalidConfig { message: String },

    /// A separator is not a valid regular expression
    #[error("Invalid separator pattern {pattern:?}: {source}")]
    InvalidSeparator {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The BPE tables could not be loaded
    #[error("Tokenizer initialization failed: {message}")]
    Tokenizer { message: String },
}

impl SplitterError {
    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
