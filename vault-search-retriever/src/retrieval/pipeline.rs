//! Indexing pipeline: document text in, stored vectors out.
//!
//! Per document the pipeline reads the full text, chunks and embeds it, deletes the
//! document's old records and saves the new ones. Deleting first means a document that
//! shrank never keeps stale chunks around, at the cost of a short window where the document
//! has no records at all.
//!
//! A full-corpus pass walks every document sequentially, so at most one embedding request
//! and one store request are in flight at a time. Whether a pass runs at all is decided by
//! the [`IndexingStateTracker`](super::sync_state::IndexingStateTracker).

use super::context::SearchContext;
use super::documents::{Document, DocumentError};
use super::notifier::Notice;
use super::sync_state::{StartDecision, SyncStatus};
use crate::config::PersistenceError;
use crate::storage::{StoreError, VectorStoreAdapter};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use vault_search_embed::{EmbedError, EmbeddingAdapter};

/// Errors that stop an indexing step.
#[derive(Debug, thiserror::Error)]
pub enum IndexingError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Embedding(#[from] EmbedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Result of indexing one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutcome {
    /// Old records were replaced by `chunks` new ones
    Indexed { chunks: usize },
    /// Embedding adapter or vector store is missing
    NotConfigured,
    /// A step failed; the user has been notified
    Failed,
}

/// Result of a full-corpus pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorpusOutcome {
    /// Embedding adapter or vector store is missing
    NotConfigured,
    /// The store was already `ACTIVE` or `DONE` and the pass was not forced
    Skipped(SyncStatus),
    Completed {
        indexed: usize,
        failed: usize,
        finished_at: DateTime<Utc>,
    },
}

impl std::fmt::Display for CorpusOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusOutcome::NotConfigured => write!(f, "not configured"),
            CorpusOutcome::Skipped(status) => write!(f, "skipped (store is {status})"),
            CorpusOutcome::Completed {
                indexed,
                failed,
                finished_at,
            } => write!(
                f,
                "indexed {indexed} documents, {failed} failed, finished at {}",
                finished_at.to_rfc3339()
            ),
        }
    }
}

/// Counters for the current process
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingStats {
    pub documents_indexed: usize,
    pub documents_failed: usize,
    pub chunks_stored: usize,
    pub corpus_passes: usize,
}

/// Indexes documents into the active vector store.
#[derive(Clone)]
pub struct IndexingPipeline {
    context: SearchContext,
    stats: Arc<RwLock<ProcessingStats>>,
}

impl IndexingPipeline {
    pub fn new(context: SearchContext) -> Self {
        Self {
            context,
            stats: Arc::new(RwLock::new(ProcessingStats::default())),
        }
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub async fn stats(&self) -> ProcessingStats {
        self.stats.read().await.clone()
    }

    /// Replace the records of one document with freshly embedded chunks.
    ///
    /// Failures are logged and reported to the user naming the document; they never
    /// propagate.
    pub async fn index_document(&self, document: &Document) -> DocumentOutcome {
        let Some((embedder, store)) = self.context.adapters().await.ready() else {
            debug!("Skipping {}: adapters not configured", document.name);
            return DocumentOutcome::NotConfigured;
        };
        self.index_with(document, embedder.as_ref(), store.as_ref())
            .await
    }

    /// Entry point for modification notifications from the host.
    pub async fn on_document_modified(&self, document: &Document) -> DocumentOutcome {
        debug!("Document modified: {}", document.name);
        self.index_document(document).await
    }

    /// Index every document unless the store's status says there is nothing to do.
    ///
    /// The adapters are captured once so the whole pass writes to the store whose identity
    /// was marked `ACTIVE`.
    pub async fn index_corpus(&self, force: bool) -> Result<CorpusOutcome, IndexingError> {
        let Some((embedder, store)) = self.context.adapters().await.ready() else {
            info!("Unable to index the vault without both an embedder and a vector store");
            return Ok(CorpusOutcome::NotConfigured);
        };
        let identity = store.identity().clone();

        match self.context.state.begin_full_index(&identity, force).await? {
            StartDecision::Skip(status) => {
                info!("Skipping embeddings creation for {} ({})", identity, status);
                return Ok(CorpusOutcome::Skipped(status));
            }
            StartDecision::Proceed => {
                info!("Creating embeddings for {} (force: {})", identity, force);
            }
        }

        let documents = match self.context.documents.list_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                error!("Failed to enumerate documents: {}", e);
                self.context.state.abandon_full_index(&identity).await?;
                return Err(e.into());
            }
        };

        let mut indexed = 0;
        let mut failed = 0;
        for document in &documents {
            match self
                .index_with(document, embedder.as_ref(), store.as_ref())
                .await
            {
                DocumentOutcome::Indexed { .. } => indexed += 1,
                _ => failed += 1,
            }
        }

        self.context.state.complete_full_index(&identity).await?;
        self.stats.write().await.corpus_passes += 1;

        let outcome = CorpusOutcome::Completed {
            indexed,
            failed,
            finished_at: Utc::now(),
        };
        info!("Full index of {}: {}", identity, outcome);
        Ok(outcome)
    }

    /// Graceful shutdown: passes this process still runs become `INACTIVE`.
    pub async fn shutdown(&self) -> Result<usize, IndexingError> {
        let interrupted = self.context.state.mark_interrupted().await?;
        if interrupted > 0 {
            info!("Shutdown interrupted {} indexing runs", interrupted);
        }
        Ok(interrupted)
    }

    async fn index_with(
        &self,
        document: &Document,
        embedder: &dyn EmbeddingAdapter,
        store: &dyn VectorStoreAdapter,
    ) -> DocumentOutcome {
        match Self::replace_records(&self.context, document, embedder, store).await {
            Ok(chunks) => {
                {
                    let mut stats = self.stats.write().await;
                    stats.documents_indexed += 1;
                    stats.chunks_stored += chunks;
                }
                self.context.notifier.notify(Notice::info(format!(
                    "Created new embeddings for {}",
                    document.name
                )));
                DocumentOutcome::Indexed { chunks }
            }
            Err(e) => {
                error!("Failed to index {}: {}", document.name, e);
                self.stats.write().await.documents_failed += 1;
                self.context.notifier.notify(Notice::error(format!(
                    "Unable to create embeddings for {}",
                    document.name
                )));
                DocumentOutcome::Failed
            }
        }
    }

    async fn replace_records(
        context: &SearchContext,
        document: &Document,
        embedder: &dyn EmbeddingAdapter,
        store: &dyn VectorStoreAdapter,
    ) -> Result<usize, IndexingError> {
        let text = context.documents.read_document(document).await?;
        let embedded = embedder.generate_chunks_and_embeddings(&text).await?;
        debug!("Embedded {} chunks for {}", embedded.len(), document.name);

        store.delete_embeddings(&document.name).await?;
        store
            .save_embeddings(&document.name, &embedded.chunks, &embedded.vectors)
            .await?;

        Ok(embedded.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryDataStore;
    use crate::retrieval::documents::{DocumentStore, VaultDirectory};
    use crate::retrieval::notifier::{NoticeLevel, RecordingNotifier};
    use crate::retrieval::registry::ActiveAdapters;
    use crate::retrieval::sync_state::IndexingStateTracker;
    use crate::storage::sqlite_store::SqliteStore;
    use async_trait::async_trait;
    use tempfile::tempdir;
    use tracing_test::traced_test;
    use vault_search_context::{LineRange, TextChunk};
    use vault_search_embed::ChunkedEmbeddings;

    /// One chunk per paragraph; refuses any text containing "poison".
    struct ParagraphEmbedder;

    #[async_trait]
    impl EmbeddingAdapter for ParagraphEmbedder {
        async fn generate_chunks_and_embeddings(
            &self,
            text: &str,
        ) -> vault_search_embed::Result<ChunkedEmbeddings> {
            if text.contains("poison") {
                return Err(EmbedError::embedding_gen_msg("provider rejected input"));
            }
            let chunks: Vec<TextChunk> = text
                .split("\n\n")
                .filter(|p| !p.trim().is_empty())
                .enumerate()
                .map(|(sequence, p)| TextChunk {
                    sequence,
                    text: p.to_string(),
                    lines: LineRange { from: 1, to: 1 },
                })
                .collect();
            let vectors = chunks
                .iter()
                .map(|c| vec![c.text.len() as f32, 1.0])
                .collect();
            Ok(ChunkedEmbeddings { chunks, vectors })
        }

        fn adapter_name(&self) -> &str {
            "paragraphs"
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        vault: Arc<VaultDirectory>,
        store: Arc<SqliteStore>,
        notifier: Arc<RecordingNotifier>,
        pipeline: IndexingPipeline,
    }

    async fn fixture(files: &[(&str, &str)]) -> anyhow::Result<Fixture> {
        let dir = tempdir()?;
        for (name, contents) in files {
            std::fs::write(dir.path().join(name), contents)?;
        }
        let vault = Arc::new(VaultDirectory::new(dir.path(), ["md"]));
        let store = Arc::new(SqliteStore::open_memory().await?);
        let notifier = Arc::new(RecordingNotifier::new());
        let state = Arc::new(IndexingStateTracker::load(Arc::new(MemoryDataStore::new())).await?);

        let context = SearchContext::new(
            state,
            vault.clone(),
            notifier.clone(),
            ActiveAdapters::new(Some(Arc::new(ParagraphEmbedder)), Some(store.clone())),
        );
        Ok(Fixture {
            _dir: dir,
            vault,
            store,
            notifier,
            pipeline: IndexingPipeline::new(context),
        })
    }

    #[tokio::test]
    async fn test_reindex_replaces_old_records() -> anyhow::Result<()> {
        let f = fixture(&[("a.md", "one\n\ntwo\n\nthree")]).await?;
        let document = f.vault.resolve(std::path::Path::new("a.md")).unwrap();

        assert_eq!(
            f.pipeline.index_document(&document).await,
            DocumentOutcome::Indexed { chunks: 3 }
        );
        assert_eq!(f.store.record_count(Some("a.md")).await?, 3);

        std::fs::write(&document.path, "only one")?;
        assert_eq!(
            f.pipeline.on_document_modified(&document).await,
            DocumentOutcome::Indexed { chunks: 1 }
        );
        assert_eq!(f.store.record_count(Some("a.md")).await?, 1);

        let stats = f.pipeline.stats().await;
        assert_eq!(stats.documents_indexed, 2);
        assert_eq!(stats.chunks_stored, 4);
        assert_eq!(
            f.notifier.messages(),
            vec![
                "Created new embeddings for a.md",
                "Created new embeddings for a.md"
            ]
        );
        Ok(())
    }

    #[traced_test]
    #[tokio::test]
    async fn test_failure_keeps_old_records_and_notifies() -> anyhow::Result<()> {
        let f = fixture(&[("a.md", "first\n\nsecond")]).await?;
        let document = f.vault.resolve(std::path::Path::new("a.md")).unwrap();
        f.pipeline.index_document(&document).await;

        std::fs::write(&document.path, "poison")?;
        assert_eq!(
            f.pipeline.index_document(&document).await,
            DocumentOutcome::Failed
        );
        // Embedding failed before the delete ran
        assert_eq!(f.store.record_count(Some("a.md")).await?, 2);

        let last = f.notifier.notices().pop().unwrap();
        assert_eq!(last.level, NoticeLevel::Error);
        assert_eq!(last.message, "Unable to create embeddings for a.md");
        assert!(logs_contain("Failed to index a.md"));
        Ok(())
    }

    #[tokio::test]
    async fn test_corpus_pass_runs_once_until_forced() -> anyhow::Result<()> {
        let f = fixture(&[("a.md", "alpha"), ("b.md", "poison"), ("c.md", "gamma")]).await?;
        let identity = f.store.identity().clone();

        match f.pipeline.index_corpus(false).await? {
            CorpusOutcome::Completed {
                indexed, failed, ..
            } => {
                assert_eq!(indexed, 2);
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let state = &f.pipeline.context().state;
        assert_eq!(state.status(&identity).await, Some(SyncStatus::Done));

        assert_eq!(
            f.pipeline.index_corpus(false).await?,
            CorpusOutcome::Skipped(SyncStatus::Done)
        );
        assert!(matches!(
            f.pipeline.index_corpus(true).await?,
            CorpusOutcome::Completed { indexed: 2, .. }
        ));
        assert_eq!(f.pipeline.stats().await.corpus_passes, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_adapters_do_nothing() -> anyhow::Result<()> {
        let f = fixture(&[("a.md", "alpha")]).await?;
        f.pipeline
            .context()
            .set_adapters(ActiveAdapters::new(None, Some(f.store.clone())))
            .await;

        let document = f.vault.resolve(std::path::Path::new("a.md")).unwrap();
        assert_eq!(
            f.pipeline.index_document(&document).await,
            DocumentOutcome::NotConfigured
        );
        assert_eq!(
            f.pipeline.index_corpus(false).await?,
            CorpusOutcome::NotConfigured
        );
        assert!(f.pipeline.context().state.statuses().await.is_empty());
        assert!(f.notifier.notices().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_marks_active_runs_inactive() -> anyhow::Result<()> {
        let f = fixture(&[]).await?;
        let identity = f.store.identity().clone();
        let state = &f.pipeline.context().state;
        state.begin_full_index(&identity, false).await?;

        assert_eq!(f.pipeline.shutdown().await?, 1);
        assert_eq!(state.status(&identity).await, Some(SyncStatus::Inactive));
        Ok(())
    }
}
