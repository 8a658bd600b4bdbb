//! Chunk-then-embed adapters.
//!
//! An [`EmbeddingAdapter`] is what the indexer and the query path talk to: it takes a whole
//! document (or a query), splits it, and returns the chunks together with one vector per
//! chunk.

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use crate::provider::{EmbeddingProvider, OpenAiProvider};
use async_trait::async_trait;
use std::sync::Arc;
use vault_search_context::{RecursiveTextSplitter, TextChunk, TiktokenCounter};

/// Chunks of a text and their embeddings; `vectors[i]` belongs to `chunks[i]`.
#[derive(Debug, Clone, Default)]
pub struct ChunkedEmbeddings {
    pub chunks: Vec<TextChunk>,
    pub vectors: Vec<Vec<f32>>,
}

impl ChunkedEmbeddings {
    /// Number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Turns text into chunks plus embeddings.
#[async_trait]
pub trait EmbeddingAdapter: Send + Sync {
    /// Split `text` and embed every chunk with a single provider call.
    ///
    /// The result always has as many vectors as chunks.
    async fn generate_chunks_and_embeddings(&self, text: &str) -> Result<ChunkedEmbeddings>;

    /// Name used in logs
    fn adapter_name(&self) -> &str;
}

/// Combines a [`RecursiveTextSplitter`] with any [`EmbeddingProvider`].
#[derive(Debug)]
pub struct ChunkingEmbedder<P> {
    splitter: RecursiveTextSplitter,
    provider: P,
}

/// The production adapter: `cl100k_base` token budget in front of the OpenAI provider.
pub type OpenAiEmbedder = ChunkingEmbedder<OpenAiProvider>;

impl<P: EmbeddingProvider> ChunkingEmbedder<P> {
    pub fn new(splitter: RecursiveTextSplitter, provider: P) -> Self {
        Self { splitter, provider }
    }

    pub fn splitter(&self) -> &RecursiveTextSplitter {
        &self.splitter
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl ChunkingEmbedder<OpenAiProvider> {
    /// Build the OpenAI adapter described by `config`.
    pub fn from_config(config: &EmbedConfig) -> Result<Self> {
        let provider = OpenAiProvider::new(config)?;
        let counter = Arc::new(TiktokenCounter::cl100k()?);
        let splitter = RecursiveTextSplitter::new(config.splitter_config(), counter)?;
        tracing::info!(
            "Created OpenAI embedder for model {} (chunk size {}, overlap {})",
            config.model_name,
            config.chunk_size,
            config.chunk_overlap
        );
        Ok(Self::new(splitter, provider))
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingAdapter for ChunkingEmbedder<P> {
    async fn generate_chunks_and_embeddings(&self, text: &str) -> Result<ChunkedEmbeddings> {
        let chunks = self.splitter.create_chunks(text);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let vectors = self.provider.embed_texts(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(EmbedError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        tracing::debug!(
            "Embedded {} chunks with {}",
            chunks.len(),
            self.provider.provider_name()
        );
        Ok(ChunkedEmbeddings { chunks, vectors })
    }

    fn adapter_name(&self) -> &str {
        self.provider.provider_name()
    }
}
