//! Recursive, separator-prioritised text splitting.
//!
//! The splitter turns a document into chunks that fit an embedding model's input budget.
//! Budgets are measured with a [`TokenCounter`], so the same code can chunk by BPE tokens in
//! production and by words or characters in tests.
//!
//! # Algorithm
//!
//! 1. Pick the first separator (most significant first) that occurs in the text. The empty
//!    separator means "split between characters" and always applies.
//! 2. Split the text at every occurrence, keeping the separator at the start of the piece
//!    that follows it, so no text is lost.
//! 3. Pieces under the budget are merged greedily into chunks of at most `chunk_size`
//!    units. When a chunk is emitted, a tail of at most `chunk_overlap` units is carried into
//!    the next chunk so context survives the boundary.
//! 4. Pieces at or over the budget are split again with the remaining, less significant
//!    separators.
//!
//! Emitted chunks are trimmed and empty chunks are dropped.
//!
//! ```
//! use std::sync::Arc;
//! use vault_search_context::{RecursiveTextSplitter, SplitterConfig, WhitespaceCounter};
//!
//! let splitter = RecursiveTextSplitter::new(
//!     SplitterConfig::new(4, 0),
//!     Arc::new(WhitespaceCounter),
//! ).unwrap();
//!
//! let chunks = splitter.split_text("alpha beta gamma\n\ndelta epsilon zeta");
//! assert_eq!(chunks, vec!["alpha beta gamma", "delta epsilon zeta"]);
//! ```

use crate::error::{Result, SplitterError};
use crate::tokens::TokenCounter;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Default token budget per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default number of tokens shared by consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// Default separators, most significant first: paragraph break, line break, space, and the
/// empty separator (character boundary).
pub const DEFAULT_SEPARATORS: &[&str] = &[
    r"\n\n", // Paragraphs
    r"\n",   // Line breaks
    r" ",    // Words
    "",      // Characters
];

/// Configuration for [`RecursiveTextSplitter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Maximum chunk length in counter units
    pub chunk_size: usize,
    /// Units carried from the end of one chunk into the next
    pub chunk_overlap: usize,
    /// Regular expressions tried in order; `""` splits between characters
    pub separators: Vec<String>,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)
    }
}

impl SplitterConfig {
    /// Configuration with the default separators.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the separator list (builder style)
    pub fn with_separators<I, S>(self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            separators: separators.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    /// Check the size/overlap relationship and the separator list.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SplitterError::invalid_config("chunk_size must be positive"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(SplitterError::invalid_config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.separators.is_empty() {
            return Err(SplitterError::invalid_config(
                "at least one separator is required",
            ));
        }
        Ok(())
    }
}

/// 1-based, inclusive line span of a chunk within its source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub from: usize,
    pub to: usize,
}

/// A contiguous span of a document's text.
///
/// Chunks carry no identity beyond their position in the source; they are regenerated,
/// never diffed, whenever a document is re-embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position of this chunk in the document (0-indexed)
    pub sequence: usize,
    /// The chunk text
    pub text: String,
    /// Where the chunk sits in the source text
    pub lines: LineRange,
}

/// A compiled separator. `None` means the character-boundary separator.
#[derive(Debug, Clone)]
struct Separator {
    pattern: Option<Regex>,
}

impl Separator {
    fn compile(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Ok(Self { pattern: None });
        }
        let regex = Regex::new(pattern).map_err(|source| SplitterError::InvalidSeparator {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            pattern: Some(regex),
        })
    }

    fn is_char_boundary(&self) -> bool {
        self.pattern.is_none()
    }

    fn occurs_in(&self, text: &str) -> bool {
        self.pattern.as_ref().is_some_and(|p| p.is_match(text))
    }

    /// Split so that every piece after the first starts with the separator match.
    fn split<'t>(&self, text: &'t str) -> Vec<&'t str> {
        let Some(pattern) = &self.pattern else {
            return text
                .char_indices()
                .map(|(idx, c)| &text[idx..idx + c.len_utf8()])
                .collect();
        };

        let mut pieces = Vec::new();
        let mut start = 0;
        for mat in pattern.find_iter(text) {
            if mat.start() > start {
                pieces.push(&text[start..mat.start()]);
                start = mat.start();
            }
        }
        if start < text.len() {
            pieces.push(&text[start..]);
        }
        pieces
    }
}

/// Splits text into overlapping chunks bounded by a token budget.
#[derive(Clone)]
pub struct RecursiveTextSplitter {
    config: SplitterConfig,
    separators: Vec<Separator>,
    counter: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for RecursiveTextSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveTextSplitter")
            .field("config", &self.config)
            .field("counter", &self.counter.name())
            .finish()
    }
}

impl RecursiveTextSplitter {
    /// Build a splitter, validating the configuration and compiling the separators.
    pub fn new(config: SplitterConfig, counter: Arc<dyn TokenCounter>) -> Result<Self> {
        config.validate()?;
        let separators = config
            .separators
            .iter()
            .map(|pattern| Separator::compile(pattern))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config,
            separators,
            counter,
        })
    }

    /// The configuration this splitter was built with
    pub fn config(&self) -> &SplitterConfig {
        &self.config
    }

    /// The counter used to measure chunk length
    pub fn counter(&self) -> &Arc<dyn TokenCounter> {
        &self.counter
    }

    /// Split `text` into trimmed, non-empty chunks.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_with(text, &self.separators)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    /// Split `text` and locate every chunk in the source.
    pub fn create_chunks(&self, text: &str) -> Vec<TextChunk> {
        let pieces = self.split_text(text);
        let mut chunks = Vec::with_capacity(pieces.len());
        let mut previous_start: Option<usize> = None;
        let mut previous_from = 1;

        for (sequence, piece) in pieces.into_iter().enumerate() {
            let search_from = previous_start
                .map(|start| next_char_boundary(text, start))
                .unwrap_or(0);
            let position = text[search_from..]
                .find(piece.as_str())
                .map(|offset| search_from + offset)
                .or_else(|| text.find(piece.as_str()));

            let from = match position {
                Some(position) => 1 + count_newlines(&text[..position]),
                None => previous_from,
            };
            let to = from + count_newlines(&piece);

            if position.is_some() {
                previous_start = position;
            }
            previous_from = from;

            chunks.push(TextChunk {
                sequence,
                text: piece,
                lines: LineRange { from, to },
            });
        }

        tracing::debug!(
            "Split {} units of text into {} chunks (size {}, overlap {}, counter {})",
            self.counter.count(text),
            chunks.len(),
            self.config.chunk_size,
            self.config.chunk_overlap,
            self.counter.name()
        );

        chunks
    }

    fn split_with<'t>(&self, text: &'t str, separators: &[Separator]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // Most significant separator present in the text; the character separator always
        // matches. When nothing matches, fall back to the last one with nothing left to
        // recurse into.
        let mut chosen = separators.len().saturating_sub(1);
        let mut remaining: &[Separator] = &[];
        for (idx, separator) in separators.iter().enumerate() {
            if separator.is_char_boundary() {
                chosen = idx;
                break;
            }
            if separator.occurs_in(text) {
                chosen = idx;
                remaining = &separators[idx + 1..];
                break;
            }
        }

        let Some(separator) = separators.get(chosen) else {
            return vec![text.to_string()];
        };

        let mut small_pieces: Vec<&'t str> = Vec::new();
        for piece in separator.split(text) {
            if self.counter.count(piece) < self.config.chunk_size {
                small_pieces.push(piece);
                continue;
            }

            if !small_pieces.is_empty() {
                final_chunks.extend(self.merge_pieces(&small_pieces));
                small_pieces.clear();
            }

            if remaining.is_empty() {
                tracing::warn!(
                    "Emitting indivisible piece of {} units over the chunk budget of {}",
                    self.counter.count(piece),
                    self.config.chunk_size
                );
                final_chunks.push(piece.to_string());
            } else {
                final_chunks.extend(self.split_with(piece, remaining));
            }
        }

        if !small_pieces.is_empty() {
            final_chunks.extend(self.merge_pieces(&small_pieces));
        }

        final_chunks
    }

    /// Greedily merge pieces into chunks, keeping an overlapping tail between chunks.
    fn merge_pieces(&self, pieces: &[&str]) -> Vec<String> {
        let chunk_size = self.config.chunk_size;
        let chunk_overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<(&str, usize)> = VecDeque::new();
        let mut total = 0usize;

        for &piece in pieces {
            let length = self.counter.count(piece);

            if total + length > chunk_size && !window.is_empty() {
                if total > chunk_size {
                    tracing::warn!(
                        "Created a chunk of {} units, which is longer than the budget of {}",
                        total,
                        chunk_size
                    );
                }
                push_joined(&window, &mut chunks);

                // Drop from the front until only the overlap remains and the new piece fits
                while total > chunk_overlap || (total + length > chunk_size && total > 0) {
                    match window.pop_front() {
                        Some((_, dropped)) => total -= dropped,
                        None => break,
                    }
                }
            }

            window.push_back((piece, length));
            total += length;
        }

        push_joined(&window, &mut chunks);
        chunks
    }
}

fn push_joined(window: &VecDeque<(&str, usize)>, chunks: &mut Vec<String>) {
    let joined: String = window.iter().map(|(piece, _)| *piece).collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

fn next_char_boundary(text: &str, index: usize) -> usize {
    text[index..]
        .chars()
        .next()
        .map(|c| index + c.len_utf8())
        .unwrap_or(text.len())
}
