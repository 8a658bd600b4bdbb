//! Query path: embed the query, search the active store.

use super::context::SearchContext;
use super::notifier::Notice;
use crate::storage::SearchMatch;
use tracing::{debug, error};

pub const SEARCH_FAILED_NOTICE: &str = "Something went wrong searching for matches.";

/// Answers natural-language queries against the active vector store.
#[derive(Debug, Clone)]
pub struct QueryService {
    context: SearchContext,
}

impl QueryService {
    pub fn new(context: SearchContext) -> Self {
        Self { context }
    }

    /// Up to ten matches, best first.
    ///
    /// Returns nothing for a blank query or when either adapter is missing. Failures are
    /// reported to the user and also yield an empty list. Only the first chunk of a long query
    /// is used.
    pub async fn search(&self, query: &str) -> Vec<SearchMatch> {
        if query.trim().is_empty() {
            return Vec::new();
        }
        let Some((embedder, store)) = self.context.adapters().await.ready() else {
            debug!("Search skipped: adapters not configured");
            return Vec::new();
        };

        let embedded = match embedder.generate_chunks_and_embeddings(query).await {
            Ok(embedded) => embedded,
            Err(e) => {
                error!("Failed to embed query: {}", e);
                self.context.notifier.notify(Notice::error(SEARCH_FAILED_NOTICE));
                return Vec::new();
            }
        };
        let Some(vector) = embedded.vectors.first() else {
            return Vec::new();
        };
        if embedded.len() > 1 {
            debug!("Query split into {} chunks; using the first", embedded.len());
        }

        match store.similarity_search(vector).await {
            Ok(matches) => {
                debug!("Query returned {} matches", matches.len());
                matches
            }
            Err(e) => {
                error!("Similarity search failed: {}", e);
                self.context.notifier.notify(Notice::error(SEARCH_FAILED_NOTICE));
                Vec::new()
            }
        }
    }
}
