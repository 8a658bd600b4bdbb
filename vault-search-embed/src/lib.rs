//! # vault-search-embed
//!
//! Embedding generation for vault search: an async [`EmbeddingProvider`] abstraction over
//! remote embedding APIs, and the [`EmbeddingAdapter`] that chunks a document with
//! `vault-search-context` and embeds every chunk in one batched call.
//!
//! ## Quick Start
//!
//! ```no_run
//! use vault_search_embed::{EmbedConfig, EmbeddingAdapter, OpenAiEmbedder};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let embedder = OpenAiEmbedder::from_config(&EmbedConfig::openai("sk-..."))?;
//!
//! let result = embedder
//!     .generate_chunks_and_embeddings("# Notes\n\nSome text worth finding later.")
//!     .await?;
//!
//! println!("{} chunks, {} vectors", result.chunks.len(), result.vectors.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: provider and chunking configuration
//! - [`provider`]: the provider trait and the OpenAI-compatible HTTP implementation
//! - [`adapter`]: chunk-then-embed adapters
//! - [`error`]: error types and result handling
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`] using the crate's [`EmbedError`] type. Provider
//! failures are reported once and never retried here.

pub mod adapter;
pub mod config;
pub mod error;
pub mod provider;

// Re-export main types for easy access
pub use adapter::{ChunkedEmbeddings, ChunkingEmbedder, EmbeddingAdapter, OpenAiEmbedder};
pub use config::{DEFAULT_BASE_URL, DEFAULT_MODEL, EmbedConfig, EmbedConfigBuilder};
pub use error::{EmbedError, Result};
pub use provider::{EmbeddingProvider, OpenAiProvider};
