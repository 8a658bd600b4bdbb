//! Token-aware text chunking for vault documents.
//!
//! [`RecursiveTextSplitter`] breaks a document into overlapping chunks bounded by a
//! [`TokenCounter`] budget. Each [`TextChunk`] records its position in the document and the
//! lines it spans.

pub mod error;
pub mod splitter;
pub mod tokens;

pub use error::{Result, SplitterError};
pub use splitter::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATORS, LineRange,
    RecursiveTextSplitter, SplitterConfig, TextChunk,
};
pub use tokens::{CharCounter, TiktokenCounter, TokenCounter, WhitespaceCounter};
