//! Builds the active adapters from settings.
//!
//! Selection rules:
//!
//! - Embedding adapter: the OpenAI embedder whenever a provider key is present.
//! - Vector store: Zilliz when URL, collection name and key are all present; otherwise the
//!   local SQLite store when `localStorePath` is set; otherwise none.
//!
//! A missing field is not an error, it simply leaves that half disabled. A store or
//! embedder that fails to build is logged and also left disabled.

use crate::config::Settings;
use crate::storage::sqlite_store::SqliteStore;
use crate::storage::zilliz_store::ZillizStore;
use crate::storage::{AdapterIdentity, VectorStoreAdapter};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use vault_search_embed::{EmbeddingAdapter, OpenAiEmbedder};

/// The adapters currently in use; either half may be missing.
#[derive(Clone, Default)]
pub struct ActiveAdapters {
    pub embedder: Option<Arc<dyn EmbeddingAdapter>>,
    pub store: Option<Arc<dyn VectorStoreAdapter>>,
}

impl std::fmt::Debug for ActiveAdapters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveAdapters")
            .field("embedder", &self.embedder.as_ref().map(|e| e.adapter_name()))
            .field("store", &self.store.as_ref().map(|s| s.identity()))
            .finish()
    }
}

impl ActiveAdapters {
    pub fn new(
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
        store: Option<Arc<dyn VectorStoreAdapter>>,
    ) -> Self {
        Self { embedder, store }
    }

    /// Both adapters, or nothing
    pub fn ready(&self) -> Option<(Arc<dyn EmbeddingAdapter>, Arc<dyn VectorStoreAdapter>)> {
        match (&self.embedder, &self.store) {
            (Some(embedder), Some(store)) => Some((embedder.clone(), store.clone())),
            _ => None,
        }
    }

    /// Identity of the configured store
    pub fn identity(&self) -> Option<AdapterIdentity> {
        self.store.as_ref().map(|store| store.identity().clone())
    }
}

/// Turns settings into adapters.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn build(&self, settings: &Settings) -> ActiveAdapters;
}

/// The production factory.
#[derive(Debug, Clone)]
pub struct AdapterRegistry {
    base: PathBuf,
}

impl AdapterRegistry {
    /// Relative `localStorePath` values are resolved against `base` (the vault root).
    pub fn new<P: AsRef<Path>>(base: P) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
        }
    }

    pub fn build_embedder(&self, settings: &Settings) -> Option<Arc<dyn EmbeddingAdapter>> {
        let config = settings.embed_config()?;
        match OpenAiEmbedder::from_config(&config) {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                tracing::error!("Embedding adapter disabled: {}", e);
                None
            }
        }
    }

    pub async fn build_store(&self, settings: &Settings) -> Option<Arc<dyn VectorStoreAdapter>> {
        if settings.has_remote_store() {
            return match ZillizStore::new(
                &settings.vector_store_url,
                &settings.vector_store_collection_name,
                &settings.vector_store_api_key,
            ) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::error!("Vector store disabled: {}", e);
                    None
                }
            };
        }

        let path = settings.local_store_path.as_ref()?;
        let path = if path.is_absolute() {
            path.clone()
        } else {
            self.base.join(path)
        };
        match SqliteStore::open(&path).await {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                tracing::error!("Vector store disabled: {}", e);
                None
            }
        }
    }
}

#[async_trait]
impl AdapterFactory for AdapterRegistry {
    async fn build(&self, settings: &Settings) -> ActiveAdapters {
        let adapters = ActiveAdapters::new(
            self.build_embedder(settings),
            self.build_store(settings).await,
        );
        tracing::info!("Configured adapters: {:?}", adapters);
        adapters
    }
}
