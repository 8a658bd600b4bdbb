//! Shared fixtures: an offline embedder and a factory that uses it.

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use vault_search_context::{RecursiveTextSplitter, SplitterConfig, WhitespaceCounter};
use vault_search_embed::{ChunkingEmbedder, EmbedError, EmbeddingAdapter, EmbeddingProvider};
use vault_search_retriever::config::Settings;
use vault_search_retriever::retrieval::{ActiveAdapters, AdapterFactory, AdapterRegistry};

pub const DIMENSIONS: usize = 64;

/// Word the provider refuses to embed
pub const POISON: &str = "unembeddable";

/// Bag-of-words vectors: each lowercase word bumps one of 64 hashed buckets.
#[derive(Debug, Default)]
pub struct HashingProvider {
    pub calls: AtomicUsize,
}

impl HashingProvider {
    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let hash = blake3::hash(word.to_lowercase().as_bytes());
            vector[hash.as_bytes()[0] as usize % DIMENSIONS] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    async fn embed_texts(&self, texts: &[String]) -> vault_search_embed::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if texts.iter().any(|text| text.contains(POISON)) {
            return Err(EmbedError::embedding_gen_msg("provider rejected input"));
        }
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }

    fn provider_name(&self) -> &str {
        "hashing"
    }
}

/// Chunks of at most `chunk_size` words with `chunk_overlap` words of overlap.
pub fn embedder(chunk_size: usize, chunk_overlap: usize) -> Arc<dyn EmbeddingAdapter> {
    let splitter = RecursiveTextSplitter::new(
        SplitterConfig::new(chunk_size, chunk_overlap),
        Arc::new(WhitespaceCounter),
    )
    .unwrap();
    Arc::new(ChunkingEmbedder::new(splitter, HashingProvider::default()))
}

/// Offline embedder plus the production store selection.
///
/// The embedder is present whenever the provider key is set, like the real registry.
pub struct TestFactory {
    registry: AdapterRegistry,
    pub builds: AtomicUsize,
}

impl TestFactory {
    pub fn new(base: &Path) -> Self {
        Self {
            registry: AdapterRegistry::new(base),
            builds: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AdapterFactory for TestFactory {
    async fn build(&self, settings: &Settings) -> ActiveAdapters {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let embedder = settings.has_embedding_provider().then(|| embedder(12, 4));
        ActiveAdapters::new(embedder, self.registry.build_store(settings).await)
    }
}

/// Settings that enable the offline embedder and a local store at `path`.
pub fn local_settings(path: &str) -> Settings {
    Settings {
        embedding_provider_key: "sk-test".to_string(),
        local_store_path: Some(path.into()),
        ..Default::default()
    }
}

/// A temporary vault holding `files`.
pub fn vault(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        write(dir.path(), name, contents);
    }
    dir
}

pub fn write(root: &Path, name: &str, contents: &str) {
    let path = root.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
