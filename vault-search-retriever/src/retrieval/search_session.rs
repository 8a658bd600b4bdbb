//! Debounced, race-safe search for interactive front ends.
//!
//! Every keystroke goes through [`SearchSession::on_input`]. A search is issued only after
//! the input has been quiet for the debounce period, and a response is published only if no
//! newer input arrived while it was in flight. In-flight requests are never cancelled; a
//! superseded response is simply dropped.
//!
//! The current view is published on a [`tokio::sync::watch`] channel so a renderer can await
//! changes without polling.

use super::query::QueryService;
use crate::storage::SearchMatch;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Quiet period after the last keystroke
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(300);

/// Anything that can answer a query.
#[async_trait]
pub trait SearchBackend: Send + Sync + 'static {
    async fn search(&self, query: &str) -> Vec<SearchMatch>;
}

#[async_trait]
impl SearchBackend for QueryService {
    async fn search(&self, query: &str) -> Vec<SearchMatch> {
        QueryService::search(self, query).await
    }
}

/// What the search UI should show
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SearchView {
    #[default]
    Empty,
    Searching {
        query: String,
    },
    Results {
        query: String,
        matches: Vec<SearchMatch>,
    },
}

pub struct SearchSession<B> {
    backend: Arc<B>,
    debounce: Duration,
    latest: Arc<AtomicU64>,
    view: Arc<watch::Sender<SearchView>>,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<B: SearchBackend> SearchSession<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_debounce(backend, SEARCH_DEBOUNCE)
    }

    pub fn with_debounce(backend: Arc<B>, debounce: Duration) -> Self {
        let (view, _) = watch::channel(SearchView::Empty);
        Self {
            backend,
            debounce,
            latest: Arc::new(AtomicU64::new(0)),
            view: Arc::new(view),
            pending: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.view.subscribe()
    }

    /// The current view
    pub fn view(&self) -> SearchView {
        self.view.borrow().clone()
    }

    /// Handle a change of the query text.
    ///
    /// Supersedes any earlier input: its pending timer is cancelled and its in-flight
    /// response, if any, will be discarded. Blank input clears the view immediately.
    pub fn on_input(&self, input: &str) {
        let token = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        if let Ok(mut pending) = self.pending.lock() {
            if let Some(timer) = pending.take() {
                timer.abort();
            }

            if input.trim().is_empty() {
                self.view.send_replace(SearchView::Empty);
                return;
            }

            let query = input.to_string();
            let backend = self.backend.clone();
            let latest = self.latest.clone();
            let view = self.view.clone();
            let debounce = self.debounce;

            *pending = Some(tokio::spawn(async move {
                tokio::time::sleep(debounce).await;
                let searching = SearchView::Searching {
                    query: query.clone(),
                };
                if !publish_if_current(&view, &latest, token, searching) {
                    return;
                }

                // Detached so a later keystroke cannot cancel the request, only discard it
                tokio::spawn(async move {
                    let matches = backend.search(&query).await;
                    let results = SearchView::Results {
                        query: query.clone(),
                        matches,
                    };
                    if !publish_if_current(&view, &latest, token, results) {
                        tracing::debug!("Discarding stale results for {:?}", query);
                    }
                });
            }));
        }
    }
}

/// Publish `next` unless input newer than `token` has arrived.
///
/// The token is checked under the channel's lock, so a newer input that already published
/// its own view is never overwritten.
fn publish_if_current(
    view: &watch::Sender<SearchView>,
    latest: &AtomicU64,
    token: u64,
    next: SearchView,
) -> bool {
    view.send_if_modified(|current| {
        if latest.load(Ordering::SeqCst) != token {
            return false;
        }
        *current = next;
        true
    })
}

impl<B> Drop for SearchSession<B> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(timer) = pending.take() {
                timer.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replies after a per-query delay and counts calls.
    struct DelayedBackend {
        calls: Mutex<Vec<String>>,
    }

    impl DelayedBackend {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchBackend for DelayedBackend {
        async fn search(&self, query: &str) -> Vec<SearchMatch> {
            self.calls.lock().unwrap().push(query.to_string());
            let delay = if query == "cat" { 1_000 } else { 100 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            vec![SearchMatch {
                filename: format!("{query}.md"),
                matching_text: query.to_string(),
            }]
        }
    }

    fn filenames(view: &SearchView) -> Vec<String> {
        match view {
            SearchView::Results { matches, .. } => {
                matches.iter().map(|m| m.filename.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_keystrokes_within_quiet_period_coalesce() {
        let backend = Arc::new(DelayedBackend::new());
        let session = SearchSession::new(backend.clone());

        for input in ["d", "do", "dog"] {
            session.on_input(input);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(backend.calls().is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(
            session.view(),
            SearchView::Searching {
                query: "dog".to_string()
            }
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.calls(), vec!["dog"]);
        assert_eq!(filenames(&session.view()), vec!["dog.md"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_response_is_discarded() {
        let backend = Arc::new(DelayedBackend::new());
        let session = SearchSession::new(backend.clone());

        session.on_input("cat");
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(backend.calls(), vec!["cat"]);

        // "cat" is still in flight when "dog" is typed; "dog" finishes first
        session.on_input("dog");
        tokio::time::sleep(Duration::from_millis(450)).await;
        assert_eq!(filenames(&session.view()), vec!["dog.md"]);

        // The late "cat" response must not overwrite it
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.calls(), vec!["cat", "dog"]);
        assert_eq!(filenames(&session.view()), vec!["dog.md"]);
    }

    #[test]
    fn test_superseded_view_is_not_published() {
        let (view, mut updates) = watch::channel(SearchView::Empty);
        let latest = AtomicU64::new(1);
        let searching = SearchView::Searching {
            query: "dog".to_string(),
        };

        assert!(publish_if_current(&view, &latest, 1, searching.clone()));
        assert_eq!(*updates.borrow_and_update(), searching);

        // Blank input arrives after the timer fired but before it published
        latest.store(2, Ordering::SeqCst);
        view.send_replace(SearchView::Empty);
        updates.borrow_and_update();

        assert!(!publish_if_current(&view, &latest, 1, searching));
        assert_eq!(*view.borrow(), SearchView::Empty);
        assert!(!updates.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_clears_without_searching() {
        let backend = Arc::new(DelayedBackend::new());
        let session = SearchSession::new(backend.clone());
        let mut updates = session.subscribe();

        session.on_input("dog");
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(filenames(&session.view()), vec!["dog.md"]);

        session.on_input("   ");
        assert_eq!(session.view(), SearchView::Empty);
        assert!(updates.has_changed().unwrap());
        updates.borrow_and_update();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(backend.calls(), vec!["dog"]);
        assert!(!updates.has_changed().unwrap());
    }
}
