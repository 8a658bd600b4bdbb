//! vault-search-retriever: semantic search over a vault of Markdown notes
//!
//! This crate keeps an embedding index of a directory of notes in sync with the files, and
//! answers natural-language queries against it. Embeddings come from `vault-search-embed`;
//! vectors live in a pluggable vector store (a remote Zilliz collection over HTTP, or a local
//! SQLite file).
//!
//! ## Key Modules
//!
//! - **[`config`]**: Settings and the persisted blob (settings plus per-store sync status)
//! - **[`storage`]**: Vector store abstraction with Zilliz and SQLite implementations
//! - **[`retrieval`]**: State tracking, indexing pipeline, query service, debounced search
//!   session, vault enumeration and file watching
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use vault_search_retriever::config::JsonFileStore;
//! use vault_search_retriever::retrieval::{
//!     documents::VaultDirectory, notifier::TracingNotifier, registry::AdapterRegistry,
//!     service::VaultSearch,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let vault = std::path::Path::new("./notes");
//! let service = VaultSearch::open(
//!     Arc::new(JsonFileStore::new(vault.join(".vault-search.json"))),
//!     Arc::new(VaultDirectory::new(vault, ["md"])),
//!     Arc::new(TracingNotifier),
//!     Arc::new(AdapterRegistry::new(vault)),
//! )
//! .await?;
//!
//! service.start().await?;  // Index the vault unless a previous run finished
//! for hit in service.search("what did I write about tokio?").await {
//!     println!("{}: {}", hit.filename, hit.matching_text);
//! }
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! Settings → AdapterRegistry → {EmbeddingAdapter, VectorStoreAdapter}
//!                                   ↓                    ↓
//! VaultWatcher → IndexingPipeline (delete, then save) ───┘
//!                     ↑
//!            IndexingStateTracker (ACTIVE / DONE / INACTIVE per store)
//!
//! SearchSession (debounce, stale discard) → QueryService → similarity search
//! ```

pub mod config;
pub mod retrieval;
pub mod storage;
