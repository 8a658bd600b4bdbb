//! Vector store abstraction for vault-search-retriever
//!
//! A vector store keeps one record per chunk: the chunk text, its embedding, and the name of
//! the document it came from. The document name is both the deletion key (all records of a
//! document are replaced together) and what a search result points back to.
//!
//! ## Key Components
//!
//! - **VectorStoreAdapter**: the capability set every backend implements
//! - **AdapterIdentity**: configuration-derived key that scopes indexing state per store
//! - **ZillizStore**: HTTP backend speaking the Zilliz Cloud REST contract
//! - **SqliteStore**: local backend with in-process cosine ranking
//!
//! ## Architecture
//!
//! ```text
//!                       ┌─ ZillizStore (POST /delete, /insert, /search)
//! VectorStoreAdapter ───┤
//!                       └─ SqliteStore (embeddings table, f16 vectors)
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vault_search_context::TextChunk;

pub mod sqlite_store;
pub mod zilliz_store;

/// Number of matches returned by every similarity search.
pub const SEARCH_LIMIT: usize = 10;

/// Result type for vector store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by vector store backends.
///
/// Messages name the document and describe the backend failure; they never include
/// connection credentials.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Chunks and vectors do not line up; raised before any I/O
    #[error("Can't match embeddings to source material: {chunks} chunks but {vectors} vectors")]
    Mismatch { chunks: usize, vectors: usize },

    /// Removing a document's records failed
    #[error("Error deleting embeddings for {source_name}: {message}")]
    Deletion {
        source_name: String,
        message: String,
    },

    /// Writing a document's records failed; nothing from the call was stored
    #[error("Unable to upload embeddings for {source_name}: {message}")]
    Upload {
        source_name: String,
        message: String,
    },

    /// The similarity query failed
    #[error("Unable to perform search: {message}")]
    Search { message: String },

    /// The store could not be created from its configuration
    #[error("Invalid vector store configuration: {message}")]
    Configuration { message: String },
}

impl StoreError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Configuration-derived key of a vector store.
///
/// Two stores with different connection parameters are different index generations, even
/// when the backend kind is the same. Credentials contribute only through
/// [`credential_fingerprint`], so an identity is safe to log and to persist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdapterIdentity(String);

impl AdapterIdentity {
    /// Join a backend kind and its parameters into an identity (`kind:part:part`).
    ///
    /// `%` and `:` inside a part are percent-encoded, so distinct parameter lists never
    /// produce the same identity.
    pub fn from_parts(kind: &str, parts: &[&str]) -> Self {
        let mut key = escape_identity_part(kind);
        for part in parts {
            key.push(':');
            key.push_str(&escape_identity_part(part));
        }
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Backend kind, i.e. the text before the first `:`
    pub fn kind(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl std::fmt::Display for AdapterIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AdapterIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

fn escape_identity_part(part: &str) -> String {
    part.replace('%', "%25").replace(':', "%3A")
}

/// Short, stable stand-in for a secret: the first 8 bytes of its blake3 hash, hex encoded.
pub fn credential_fingerprint(secret: &str) -> String {
    let hash = blake3::hash(secret.as_bytes());
    hex::encode(&hash.as_bytes()[..8])
}

/// One similarity search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMatch {
    /// Name of the document the chunk came from
    pub filename: String,
    /// The stored chunk text
    pub matching_text: String,
}

/// A record ready to be written to a backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRecord {
    pub text: String,
    pub vector: Vec<f32>,
    pub filename: String,
}

/// Escape a value for interpolation into a double-quoted filter literal.
///
/// Backslashes are doubled and double quotes are backslash-escaped, so `a"b\c` becomes
/// `a\"b\\c`.
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Pair chunks with vectors, dropping records that have nothing to store.
///
/// Fails with [`StoreError::Mismatch`] when the lengths differ. Records with empty text, an
/// empty vector, or an empty source name are skipped silently.
pub fn prepare_records(
    source_name: &str,
    chunks: &[TextChunk],
    vectors: &[Vec<f32>],
) -> Result<Vec<StoredRecord>> {
    if chunks.len() != vectors.len() {
        return Err(StoreError::Mismatch {
            chunks: chunks.len(),
            vectors: vectors.len(),
        });
    }
    if source_name.is_empty() {
        return Ok(Vec::new());
    }

    Ok(chunks
        .iter()
        .zip(vectors)
        .filter(|(chunk, vector)| !chunk.text.is_empty() && !vector.is_empty())
        .map(|(chunk, vector)| StoredRecord {
            text: chunk.text.clone(),
            vector: vector.clone(),
            filename: source_name.to_string(),
        })
        .collect())
}

/// Capability set of a vector store backend.
#[async_trait]
pub trait VectorStoreAdapter: Send + Sync {
    /// Configuration-derived key used to scope indexing state
    fn identity(&self) -> &AdapterIdentity;

    /// Remove every record of `source_name`. Removing nothing is not an error.
    async fn delete_embeddings(&self, source_name: &str) -> Result<()>;

    /// Store one record per chunk, all or nothing.
    ///
    /// Fails fast with [`StoreError::Mismatch`] before any I/O when the lengths differ. When
    /// no record survives filtering the call succeeds without touching the backend.
    async fn save_embeddings(
        &self,
        source_name: &str,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
    ) -> Result<()>;

    /// Up to [`SEARCH_LIMIT`] nearest records, nearest first.
    async fn similarity_search(&self, vector: &[f32]) -> Result<Vec<SearchMatch>>;
}
