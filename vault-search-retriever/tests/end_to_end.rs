//! Vault on disk → chunks → local vector store → ranked matches, with an offline embedder.

mod common;

use common::{POISON, TestFactory, local_settings, vault, write};
use std::path::Path;
use std::sync::Arc;
use vault_search_retriever::config::JsonFileStore;
use vault_search_retriever::retrieval::{
    CorpusOutcome, DocumentOutcome, RecordingNotifier, SyncStatus, VaultDirectory, VaultSearch,
};

const TOKIO_NOTE: &str = "The tokio runtime schedules async tasks across a pool of worker \
threads. When one worker thread runs out of tasks the scheduler steals work from a busy \
sibling. Blocking calls belong on the dedicated blocking pool so worker threads stay free.";

const GARDEN_NOTE: &str = "Tomatoes want full sun, deep watering and rich compost.";

async fn open(root: &Path, notifier: Arc<RecordingNotifier>) -> VaultSearch {
    VaultSearch::open(
        Arc::new(JsonFileStore::new(root.join(".vault-search.json"))),
        Arc::new(VaultDirectory::new(root, ["md"])),
        notifier,
        Arc::new(TestFactory::new(root)),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_indexed_note_is_found_by_its_content() {
    let dir = vault(&[("notes.md", TOKIO_NOTE), ("garden/tomatoes.md", GARDEN_NOTE)]);
    let notifier = Arc::new(RecordingNotifier::new());
    let service = open(dir.path(), notifier.clone()).await;

    // Nothing is configured yet
    assert_eq!(service.start().await.unwrap(), CorpusOutcome::NotConfigured);
    assert!(service.search("worker threads").await.is_empty());

    let outcome = service.reconfigure(local_settings("index.db")).await.unwrap();
    assert!(matches!(
        outcome,
        CorpusOutcome::Completed {
            indexed: 2,
            failed: 0,
            ..
        }
    ));

    let embedder = common::embedder(12, 4);
    let chunked = embedder
        .generate_chunks_and_embeddings(TOKIO_NOTE)
        .await
        .unwrap();
    assert!(chunked.len() >= 2);
    let last_word = chunked.chunks[0].text.split_whitespace().last().unwrap();
    assert!(chunked.chunks[1].text.contains(last_word));

    let hits = service.search("scheduler steals work from worker threads").await;
    assert!(!hits.is_empty());
    assert_eq!(hits[0].filename, "notes.md");
    let note_hits = hits.iter().filter(|hit| hit.filename == "notes.md").count();
    assert_eq!(note_hits, chunked.len());

    let hits = service.search("compost for tomatoes").await;
    assert_eq!(hits[0].filename, "garden/tomatoes.md");

    let mut messages = notifier.messages();
    messages.sort();
    assert_eq!(
        messages,
        vec![
            "Created new embeddings for garden/tomatoes.md",
            "Created new embeddings for notes.md"
        ]
    );
}

#[tokio::test]
async fn test_modified_note_replaces_its_chunks() {
    let dir = vault(&[("notes.md", TOKIO_NOTE)]);
    let service = open(dir.path(), Arc::new(RecordingNotifier::new())).await;
    service.reconfigure(local_settings("index.db")).await.unwrap();

    let before = service.search("worker threads").await;
    assert!(before.len() >= 2);

    write(dir.path(), "notes.md", "Worker threads are cheap.");
    let document = service
        .context()
        .documents
        .resolve(&dir.path().join("notes.md"))
        .unwrap();
    assert_eq!(
        service.on_document_modified(&document).await,
        DocumentOutcome::Indexed { chunks: 1 }
    );

    let after = service.search("worker threads").await;
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].matching_text, "Worker threads are cheap.");
}

#[tokio::test]
async fn test_one_failing_document_does_not_stop_the_pass() {
    let dir = vault(&[
        ("a.md", "alpha notes"),
        ("b.md", &format!("this one is {POISON}")),
        ("c.md", "gamma notes"),
    ]);
    let notifier = Arc::new(RecordingNotifier::new());
    let service = open(dir.path(), notifier.clone()).await;

    let outcome = service.reconfigure(local_settings("index.db")).await.unwrap();
    assert!(matches!(
        outcome,
        CorpusOutcome::Completed {
            indexed: 2,
            failed: 1,
            ..
        }
    ));
    assert_eq!(
        notifier.messages(),
        vec![
            "Created new embeddings for a.md",
            "Unable to create embeddings for b.md",
            "Created new embeddings for c.md"
        ]
    );

    let identity = service.adapters().await.identity().unwrap();
    assert_eq!(
        service.context().state.status(&identity).await,
        Some(SyncStatus::Done)
    );
    assert_eq!(service.stats().await.documents_failed, 1);
}

#[tokio::test]
async fn test_search_failure_notifies_and_returns_nothing() {
    let dir = vault(&[("a.md", "alpha notes")]);
    let notifier = Arc::new(RecordingNotifier::new());
    let service = open(dir.path(), notifier.clone()).await;
    service.reconfigure(local_settings("index.db")).await.unwrap();

    assert!(service.search(POISON).await.is_empty());
    assert_eq!(
        notifier.messages().last().map(String::as_str),
        Some("Something went wrong searching for matches.")
    );
}

#[tokio::test]
async fn test_switching_stores_indexes_each_generation_once() {
    let dir = vault(&[("a.md", "alpha notes")]);
    let service = open(dir.path(), Arc::new(RecordingNotifier::new())).await;

    assert!(matches!(
        service.reconfigure(local_settings("first.db")).await.unwrap(),
        CorpusOutcome::Completed { indexed: 1, .. }
    ));
    assert!(matches!(
        service.reconfigure(local_settings("second.db")).await.unwrap(),
        CorpusOutcome::Completed { indexed: 1, .. }
    ));
    assert_eq!(
        service.reconfigure(local_settings("first.db")).await.unwrap(),
        CorpusOutcome::Skipped(SyncStatus::Done)
    );
    assert_eq!(service.context().state.statuses().await.len(), 2);

    // Clearing the provider key disables indexing and search
    let mut settings = local_settings("first.db");
    settings.embedding_provider_key.clear();
    assert_eq!(
        service.reconfigure(settings).await.unwrap(),
        CorpusOutcome::NotConfigured
    );
    assert!(service.search("alpha").await.is_empty());
}
