//! The top-level facade a host application drives.

use super::context::SearchContext;
use super::documents::{Document, DocumentStore};
use super::notifier::Notifier;
use super::pipeline::{CorpusOutcome, DocumentOutcome, IndexingError, IndexingPipeline, ProcessingStats};
use super::query::QueryService;
use super::registry::{ActiveAdapters, AdapterFactory};
use super::search_session::SearchSession;
use super::sync_state::IndexingStateTracker;
use super::watcher::VaultWatcher;
use crate::config::{DataStore, PersistenceError, Settings};
use crate::storage::SearchMatch;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Semantic search over one vault.
///
/// Lifecycle: [`open`](Self::open) loads the persisted state and builds the adapters,
/// [`start`](Self::start) runs the startup corpus pass, and [`shutdown`](Self::shutdown)
/// marks any unfinished pass as interrupted.
pub struct VaultSearch {
    context: SearchContext,
    factory: Arc<dyn AdapterFactory>,
    pipeline: IndexingPipeline,
    query: QueryService,
}

impl VaultSearch {
    pub async fn open(
        data_store: Arc<dyn DataStore>,
        documents: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        factory: Arc<dyn AdapterFactory>,
    ) -> Result<Self, PersistenceError> {
        let state = Arc::new(IndexingStateTracker::load(data_store).await?);
        let settings = state.settings().await;
        let adapters = factory.build(&settings).await;

        let context = SearchContext::new(state, documents, notifier, adapters);
        let pipeline = IndexingPipeline::new(context.clone());
        let query = QueryService::new(context.clone());

        Ok(Self {
            context,
            factory,
            pipeline,
            query,
        })
    }

    pub fn context(&self) -> &SearchContext {
        &self.context
    }

    pub fn pipeline(&self) -> &IndexingPipeline {
        &self.pipeline
    }

    pub async fn settings(&self) -> Settings {
        self.context.state.settings().await
    }

    pub async fn adapters(&self) -> ActiveAdapters {
        self.context.adapters().await
    }

    pub async fn stats(&self) -> ProcessingStats {
        self.pipeline.stats().await
    }

    /// Startup pass: index the corpus unless the active store is already `ACTIVE` or `DONE`.
    pub async fn start(&self) -> Result<CorpusOutcome, IndexingError> {
        self.pipeline.index_corpus(false).await
    }

    /// Persist new settings, rebuild both adapters from them and run a non-forced pass.
    ///
    /// A store identity seen for the first time is indexed from scratch; returning to a
    /// store that already finished is a no-op.
    pub async fn reconfigure(&self, settings: Settings) -> Result<CorpusOutcome, IndexingError> {
        self.context.state.update_settings(settings.clone()).await?;
        let adapters = self.factory.build(&settings).await;
        self.context.set_adapters(adapters).await;
        self.pipeline.index_corpus(false).await
    }

    pub async fn reindex(&self, force: bool) -> Result<CorpusOutcome, IndexingError> {
        self.pipeline.index_corpus(force).await
    }

    pub async fn search(&self, query: &str) -> Vec<SearchMatch> {
        self.query.search(query).await
    }

    pub async fn on_document_modified(&self, document: &Document) -> DocumentOutcome {
        self.pipeline.on_document_modified(document).await
    }

    /// A debounced session over this vault's query service
    pub fn search_session(&self) -> SearchSession<QueryService> {
        SearchSession::new(Arc::new(self.query.clone()))
    }

    /// Watch `root` and index modified documents as they change.
    pub fn watch(&self, root: &Path, debounce: Duration) -> anyhow::Result<VaultWatcher> {
        VaultWatcher::start(root, Arc::new(self.pipeline.clone()), debounce)
    }

    /// Mark passes this process still owns as `INACTIVE` so the next start resumes them.
    pub async fn shutdown(&self) -> Result<usize, IndexingError> {
        self.pipeline.shutdown().await
    }
}
