//! Filesystem watching: turns debounced change events into modification notifications.

use super::pipeline::IndexingPipeline;
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Quiet period before a burst of writes to one file is reported
pub const WATCH_DEBOUNCE: Duration = Duration::from_secs(2);

/// Receives the paths of modified files.
#[async_trait]
pub trait ModificationHandler: Send + Sync + 'static {
    async fn on_path_modified(&self, path: &Path);
}

#[async_trait]
impl ModificationHandler for IndexingPipeline {
    async fn on_path_modified(&self, path: &Path) {
        // Deletions and directories show up here too
        if !path.is_file() {
            return;
        }
        match self.context().documents.resolve(path) {
            Some(document) => {
                self.on_document_modified(&document).await;
            }
            None => tracing::trace!("Ignoring change to {}", path.display()),
        }
    }
}

/// Watches a vault directory until stopped.
pub struct VaultWatcher {
    root: PathBuf,
    debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    listener: JoinHandle<()>,
}

impl VaultWatcher {
    /// Start watching `root` recursively. Must be called from within a tokio runtime.
    pub fn start<H: ModificationHandler>(
        root: &Path,
        handler: Arc<H>,
        debounce: Duration,
    ) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(128);

        // The listener needs to exist before events start arriving
        let listener = tokio::spawn(Self::listen(events_rx, handler));

        let mut debouncer = notify_debouncer_mini::new_debouncer(
            debounce,
            move |res: notify_debouncer_mini::DebounceEventResult| match res {
                Ok(events) => {
                    for event in events {
                        // Runs on the debouncer's own thread, not in async context
                        if events_tx.blocking_send(event.path).is_err() {
                            tracing::warn!("Watcher listener stopped; dropping change events");
                            return;
                        }
                    }
                }
                Err(e) => tracing::error!("Filesystem watch error: {:?}", e),
            },
        )?;
        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        tracing::info!("Watching {} for changes", root.display());
        Ok(Self {
            root: root.to_path_buf(),
            debouncer,
            listener,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching and let the listener finish the events it already received.
    pub async fn stop(self) {
        let Self {
            root,
            debouncer,
            mut listener,
        } = self;
        drop(debouncer);

        if tokio::time::timeout(Duration::from_secs(5), &mut listener)
            .await
            .is_err()
        {
            tracing::warn!("Watcher listener did not stop in time; aborting");
            listener.abort();
        }
        tracing::info!("Stopped watching {}", root.display());
    }

    /// Feed events to the handler one at a time, in arrival order.
    async fn listen<H: ModificationHandler>(events_rx: mpsc::Receiver<PathBuf>, handler: Arc<H>) {
        let handler = &handler;
        tokio_stream::wrappers::ReceiverStream::new(events_rx)
            .for_each(|path| async move {
                tracing::debug!("Change detected: {}", path.display());
                handler.on_path_modified(&path).await;
            })
            .await;
    }
}
