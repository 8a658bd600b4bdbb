//! Indexing and retrieval: everything between the vault on disk and a ranked list of matches.

pub mod context;
pub mod documents;
pub mod notifier;
pub mod pipeline;
pub mod query;
pub mod registry;
pub mod search_session;
pub mod service;
pub mod sync_state;
pub mod watcher;

pub use context::SearchContext;
pub use documents::{Document, DocumentError, DocumentStore, VaultDirectory};
pub use notifier::{Notice, NoticeLevel, Notifier, RecordingNotifier, TracingNotifier};
pub use pipeline::{CorpusOutcome, DocumentOutcome, IndexingError, IndexingPipeline, ProcessingStats};
pub use query::QueryService;
pub use registry::{ActiveAdapters, AdapterFactory, AdapterRegistry};
pub use search_session::{SEARCH_DEBOUNCE, SearchBackend, SearchSession, SearchView};
pub use service::VaultSearch;
pub use sync_state::{IndexingStateTracker, StartDecision, SyncStatus};
pub use watcher::{ModificationHandler, VaultWatcher, WATCH_DEBOUNCE};
