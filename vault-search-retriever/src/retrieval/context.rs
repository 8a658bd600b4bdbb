//! The shared context handed to every component.

use super::documents::DocumentStore;
use super::notifier::Notifier;
use super::registry::ActiveAdapters;
use super::sync_state::IndexingStateTracker;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-wide state, built once at startup and cloned into each component.
///
/// Cloning is cheap; all clones see the same tracker, adapter slot, document store and
/// notifier. Swapping adapters through [`set_adapters`](Self::set_adapters) is visible to
/// every holder.
#[derive(Clone)]
pub struct SearchContext {
    pub state: Arc<IndexingStateTracker>,
    pub documents: Arc<dyn DocumentStore>,
    pub notifier: Arc<dyn Notifier>,
    adapters: Arc<RwLock<ActiveAdapters>>,
}

impl std::fmt::Debug for SearchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchContext")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SearchContext {
    pub fn new(
        state: Arc<IndexingStateTracker>,
        documents: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        adapters: ActiveAdapters,
    ) -> Self {
        Self {
            state,
            documents,
            notifier,
            adapters: Arc::new(RwLock::new(adapters)),
        }
    }

    /// Snapshot of the current adapters
    pub async fn adapters(&self) -> ActiveAdapters {
        self.adapters.read().await.clone()
    }

    pub async fn set_adapters(&self, adapters: ActiveAdapters) {
        *self.adapters.write().await = adapters;
    }
}
