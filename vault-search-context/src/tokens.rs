//! Length functions used by the splitter.
//!
//! Chunk budgets are expressed in the units of the embedding model, not in bytes or
//! characters. [`TiktokenCounter`] measures text with the `cl100k_base` encoding used by
//! the OpenAI `text-embedding-3-*` family. The other counters are cheap stand-ins for
//! tests and offline tooling.

use crate::error::{Result, SplitterError};
use tiktoken_rs::CoreBPE;

/// Measures the length of a piece of text in some model-specific unit.
pub trait TokenCounter: Send + Sync {
    /// Number of units in `text`
    fn count(&self, text: &str) -> usize;

    /// Short name used in logs and by the chunking CLI
    fn name(&self) -> &str;
}

/// BPE token counter backed by `tiktoken-rs`.
pub struct TiktokenCounter {
    bpe: CoreBPE,
    encoding: &'static str,
}

impl TiktokenCounter {
    /// Counter for the `cl100k_base` encoding.
    ///
    /// Building the BPE tables takes a noticeable amount of time, so construct one counter
    /// and share it (it is `Send + Sync`).
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| SplitterError::Tokenizer {
            message: e.to_string(),
        })?;
        Ok(Self {
            bpe,
            encoding: "cl100k_base",
        })
    }
}

impl std::fmt::Debug for TiktokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenCounter")
            .field("encoding", &self.encoding)
            .finish()
    }
}

impl TokenCounter for TiktokenCounter {
    fn count(&self, text: &str) -> usize {
        self.bpe.encode_ordinary(text).len()
    }

    fn name(&self) -> &str {
        self.encoding
    }
}

/// Counts Unicode scalar values.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharCounter;

impl TokenCounter for CharCounter {
    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }

    fn name(&self) -> &str {
        "chars"
    }
}

/// Counts whitespace separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceCounter;

impl TokenCounter for WhitespaceCounter {
    fn count(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn name(&self) -> &str {
        "words"
    }
}
