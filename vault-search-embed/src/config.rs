//! Configuration for the embedding provider

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use std::time::Duration;
use vault_search_context::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, SplitterConfig};

/// Default OpenAI embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Configuration for an OpenAI-compatible embedding endpoint and the chunking in front of it.
#[derive(Clone, Builder)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Bearer credential for the provider
    pub api_key: String,
    /// Name of the embedding model to use
    #[builder(default = "DEFAULT_MODEL.to_string()")]
    pub model_name: String,
    /// API root, without the trailing `/embeddings`
    #[builder(default = "DEFAULT_BASE_URL.to_string()")]
    pub base_url: String,
    /// Chunk budget in model tokens
    #[builder(default = "DEFAULT_CHUNK_SIZE")]
    pub chunk_size: usize,
    /// Tokens shared by consecutive chunks
    #[builder(default = "DEFAULT_CHUNK_OVERLAP")]
    pub chunk_overlap: usize,
    /// Timeout applied to each provider request
    #[builder(default = "Duration::from_secs(60)")]
    pub request_timeout: Duration,
    /// Requested output dimensionality, for models that support shortening
    #[builder(default)]
    pub dimensions: Option<usize>,
}

impl std::fmt::Debug for EmbedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbedConfig")
            .field("api_key", &"<redacted>")
            .field("model_name", &self.model_name)
            .field("base_url", &self.base_url)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("request_timeout", &self.request_timeout)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}

impl EmbedConfig {
    /// Create a new embedding configuration using the builder
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Configuration for the default OpenAI model with the given key
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model_name: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            request_timeout: Duration::from_secs(60),
            dimensions: None,
        }
    }

    /// Set the model name (builder style)
    pub fn with_model<S: Into<String>>(self, model_name: S) -> Self {
        Self {
            model_name: model_name.into(),
            ..self
        }
    }

    /// Set the API root (builder style)
    pub fn with_base_url<S: Into<String>>(self, base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            ..self
        }
    }

    /// Set chunk size and overlap (builder style)
    pub fn with_chunking(self, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..self
        }
    }

    /// Full URL of the embeddings endpoint
    pub fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }

    /// Splitter configuration matching this model's chunk budget
    pub fn splitter_config(&self) -> SplitterConfig {
        SplitterConfig::new(self.chunk_size, self.chunk_overlap)
    }

    /// Check that the configuration can be used to build a provider
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EmbedError::invalid_config("missing embedding provider key"));
        }
        if self.model_name.trim().is_empty() {
            return Err(EmbedError::invalid_config("missing embedding model name"));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(EmbedError::invalid_config(format!(
                "base URL must be http(s): {}",
                self.base_url
            )));
        }
        self.splitter_config().validate()?;
        Ok(())
    }
}
