//! Per-store indexing status and its persistence.
//!
//! Each vector store identity moves through a small state machine:
//!
//! ```text
//! (unset) ──begin──▶ ACTIVE ──complete──▶ DONE
//!                      │                   │
//!        shutdown/error│                   │ begin(force)
//!                      ▼                   ▼
//!                   INACTIVE ──begin──▶ ACTIVE
//! ```
//!
//! `unset` and `INACTIVE` both mean "index the whole corpus"; `ACTIVE` and `DONE` skip the
//! pass unless it is forced. Every transition is written through the [`DataStore`].
//!
//! A pass that proceeds also claims its identity through the store. Only the claim holder
//! can be running the pass, so an `ACTIVE` status without a live claim belongs to a process
//! that died before its shutdown hook and is resumed like `INACTIVE`.

use crate::config::{DataStore, Mutation, PassClaim, PersistedData, PersistenceError, Settings};
use crate::storage::AdapterIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Indexing status of one vector store identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    /// A full-corpus pass is running
    Active,
    /// Every document has been indexed
    Done,
    /// A full-corpus pass was interrupted
    Inactive,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Active => write!(f, "ACTIVE"),
            SyncStatus::Done => write!(f, "DONE"),
            SyncStatus::Inactive => write!(f, "INACTIVE"),
        }
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACTIVE" => Ok(SyncStatus::Active),
            "DONE" => Ok(SyncStatus::Done),
            "INACTIVE" => Ok(SyncStatus::Inactive),
            _ => Err(format!(
                "Invalid sync status: '{s}'. Valid values are: ACTIVE, DONE, INACTIVE"
            )),
        }
    }
}

/// Whether a full-corpus pass should run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDecision {
    Proceed,
    Skip(SyncStatus),
}

/// Resume policy: unset and `INACTIVE` proceed, `ACTIVE` and `DONE` skip unless forced.
pub fn start_decision(current: Option<SyncStatus>, force: bool) -> StartDecision {
    match current {
        _ if force => StartDecision::Proceed,
        None | Some(SyncStatus::Inactive) => StartDecision::Proceed,
        Some(status) => StartDecision::Skip(status),
    }
}

/// Caches the persisted blob and applies status transitions to it.
///
/// Every write goes through [`DataStore::update`], so it only changes the field it is about
/// and keeps whatever other processes sharing the store wrote in the meantime. A pass that
/// proceeds holds a [`PassClaim`] until it completes, is abandoned or is marked interrupted.
pub struct IndexingStateTracker {
    store: Arc<dyn DataStore>,
    data: Mutex<PersistedData>,
    /// Passes owned by this process
    claims: Mutex<BTreeMap<AdapterIdentity, PassClaim>>,
}

impl std::fmt::Debug for IndexingStateTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingStateTracker")
            .field("store", &self.store.location())
            .finish()
    }
}

impl IndexingStateTracker {
    /// Load the blob from `store`. Loading never writes.
    pub async fn load(store: Arc<dyn DataStore>) -> Result<Self, PersistenceError> {
        let data = store.load().await?;

        tracing::debug!(
            "Loaded indexing state for {} stores from {}",
            data.adapter_status_mapper.len(),
            store.location()
        );

        Ok(Self {
            store,
            data: Mutex::new(data),
            claims: Mutex::new(BTreeMap::new()),
        })
    }

    /// Where the blob is persisted
    pub fn location(&self) -> String {
        self.store.location()
    }

    pub async fn settings(&self) -> Settings {
        self.data.lock().await.settings.clone()
    }

    /// Replace the settings and persist them.
    pub async fn update_settings(&self, settings: Settings) -> Result<(), PersistenceError> {
        self.persist(Box::new(move |blob: &mut PersistedData| {
            blob.settings = settings;
            true
        }))
        .await
    }

    pub async fn status(&self, identity: &AdapterIdentity) -> Option<SyncStatus> {
        self.data
            .lock()
            .await
            .adapter_status_mapper
            .get(identity)
            .copied()
    }

    pub async fn statuses(&self) -> BTreeMap<AdapterIdentity, SyncStatus> {
        self.data.lock().await.adapter_status_mapper.clone()
    }

    /// Apply the resume policy; on `Proceed` the identity becomes `ACTIVE`.
    ///
    /// A pass owned by another live process always skips, even when forced. An `ACTIVE`
    /// status nobody owns was left by a process that died mid-pass and counts as `INACTIVE`.
    pub async fn begin_full_index(
        &self,
        identity: &AdapterIdentity,
        force: bool,
    ) -> Result<StartDecision, PersistenceError> {
        let mut claims = self.claims.lock().await;
        let owned = claims.contains_key(identity);

        let claim = if owned {
            None
        } else {
            match self.store.claim_pass(identity).await? {
                Some(claim) => Some(claim),
                None => {
                    tracing::info!("Another process is indexing {}", identity);
                    return Ok(StartDecision::Skip(SyncStatus::Active));
                }
            }
        };

        let current = match self.store.load().await?.adapter_status_mapper.get(identity) {
            Some(SyncStatus::Active) if !owned => {
                tracing::warn!("Resuming interrupted indexing run for {}", identity);
                Some(SyncStatus::Inactive)
            }
            current => current.copied(),
        };

        let decision = start_decision(current, force);
        if decision == StartDecision::Proceed {
            self.set_status(identity, SyncStatus::Active).await?;
            if let Some(claim) = claim {
                claims.insert(identity.clone(), claim);
            }
        }
        Ok(decision)
    }

    /// Mark a finished pass as `DONE`.
    pub async fn complete_full_index(
        &self,
        identity: &AdapterIdentity,
    ) -> Result<(), PersistenceError> {
        self.finish(identity, SyncStatus::Done).await
    }

    /// Mark a pass that stopped on an error as `INACTIVE`.
    pub async fn abandon_full_index(
        &self,
        identity: &AdapterIdentity,
    ) -> Result<(), PersistenceError> {
        self.finish(identity, SyncStatus::Inactive).await
    }

    /// Mark every pass this process still owns as `INACTIVE`; returns how many there were.
    pub async fn mark_interrupted(&self) -> Result<usize, PersistenceError> {
        let mut claims = self.claims.lock().await;
        if claims.is_empty() {
            return Ok(0);
        }

        let owned: Vec<AdapterIdentity> = claims.keys().cloned().collect();
        for identity in &owned {
            tracing::info!("Marking interrupted indexing run for {}", identity);
        }
        let interrupted = owned.len();
        self.persist(Box::new(move |blob: &mut PersistedData| {
            for identity in owned {
                blob.adapter_status_mapper
                    .insert(identity, SyncStatus::Inactive);
            }
            true
        }))
        .await?;

        claims.clear();
        Ok(interrupted)
    }

    async fn finish(
        &self,
        identity: &AdapterIdentity,
        status: SyncStatus,
    ) -> Result<(), PersistenceError> {
        let mut claims = self.claims.lock().await;
        self.set_status(identity, status).await?;
        claims.remove(identity);
        Ok(())
    }

    async fn set_status(
        &self,
        identity: &AdapterIdentity,
        status: SyncStatus,
    ) -> Result<(), PersistenceError> {
        let identity = identity.clone();
        self.persist(Box::new(move |blob: &mut PersistedData| {
            blob.adapter_status_mapper.insert(identity, status) != Some(status)
        }))
        .await
    }

    async fn persist(&self, mutation: Mutation) -> Result<(), PersistenceError> {
        let mut data = self.data.lock().await;
        *data = self.store.update(mutation).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoryDataStore;

    #[test]
    fn test_start_decision_table() {
        use StartDecision::*;
        use SyncStatus::*;

        assert_eq!(start_decision(None, false), Proceed);
        assert_eq!(start_decision(Some(Inactive), false), Proceed);
        assert_eq!(start_decision(Some(Done), false), Skip(Done));
        assert_eq!(start_decision(Some(Active), false), Skip(Active));

        assert_eq!(start_decision(None, true), Proceed);
        assert_eq!(start_decision(Some(Done), true), Proceed);
        assert_eq!(start_decision(Some(Active), true), Proceed);
    }

    #[test]
    fn test_display_and_from_str() {
        assert_eq!(SyncStatus::Active.to_string(), "ACTIVE");
        assert_eq!(SyncStatus::Done.to_string(), "DONE");
        assert_eq!(SyncStatus::Inactive.to_string(), "INACTIVE");

        assert_eq!("done".parse::<SyncStatus>().unwrap(), SyncStatus::Done);
        assert_eq!(" INACTIVE ".parse::<SyncStatus>().unwrap(), SyncStatus::Inactive);
        assert!("finished".parse::<SyncStatus>().is_err());

        assert_eq!(
            serde_json::to_string(&SyncStatus::Inactive).unwrap(),
            "\"INACTIVE\""
        );
    }

    #[tokio::test]
    async fn test_transitions_are_persisted() -> anyhow::Result<()> {
        let store = Arc::new(MemoryDataStore::new());
        let tracker = IndexingStateTracker::load(store.clone()).await?;
        let identity = AdapterIdentity::from("sqlite::memory:");

        assert_eq!(
            tracker.begin_full_index(&identity, false).await?,
            StartDecision::Proceed
        );
        assert_eq!(
            store.snapshot().adapter_status_mapper.get(&identity),
            Some(&SyncStatus::Active)
        );

        // A second pass in the same process is refused while the first runs
        assert_eq!(
            tracker.begin_full_index(&identity, false).await?,
            StartDecision::Skip(SyncStatus::Active)
        );

        tracker.complete_full_index(&identity).await?;
        assert_eq!(tracker.status(&identity).await, Some(SyncStatus::Done));
        assert_eq!(
            store.snapshot().adapter_status_mapper.get(&identity),
            Some(&SyncStatus::Done)
        );
        assert_eq!(store.save_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_interrupted_only_touches_active() -> anyhow::Result<()> {
        let store = Arc::new(MemoryDataStore::new());
        let tracker = IndexingStateTracker::load(store.clone()).await?;
        let running = AdapterIdentity::from("sqlite:a.db");
        let finished = AdapterIdentity::from("sqlite:b.db");

        tracker.begin_full_index(&running, false).await?;
        tracker.begin_full_index(&finished, false).await?;
        tracker.complete_full_index(&finished).await?;

        assert_eq!(tracker.mark_interrupted().await?, 1);
        assert_eq!(tracker.status(&running).await, Some(SyncStatus::Inactive));
        assert_eq!(tracker.status(&finished).await, Some(SyncStatus::Done));
        Ok(())
    }

    #[tokio::test]
    async fn test_unowned_active_entry_resumes_without_writing_on_load() -> anyhow::Result<()> {
        let identity = AdapterIdentity::from("sqlite:a.db");
        let mut data = PersistedData::default();
        data.adapter_status_mapper
            .insert(identity.clone(), SyncStatus::Active);
        let store = Arc::new(MemoryDataStore::with_data(data));

        let tracker = IndexingStateTracker::load(store.clone()).await?;
        assert_eq!(tracker.status(&identity).await, Some(SyncStatus::Active));
        assert_eq!(store.save_count(), 0);

        assert_eq!(
            tracker.begin_full_index(&identity, false).await?,
            StartDecision::Proceed
        );
        assert_eq!(store.save_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_pass_owned_elsewhere_is_skipped() -> anyhow::Result<()> {
        let store = Arc::new(MemoryDataStore::new());
        let owner = IndexingStateTracker::load(store.clone()).await?;
        let other = IndexingStateTracker::load(store.clone()).await?;
        let identity = AdapterIdentity::from("sqlite:a.db");

        assert_eq!(
            owner.begin_full_index(&identity, false).await?,
            StartDecision::Proceed
        );
        assert_eq!(
            other.begin_full_index(&identity, false).await?,
            StartDecision::Skip(SyncStatus::Active)
        );
        // Forcing does not start a second concurrent pass either
        assert_eq!(
            other.begin_full_index(&identity, true).await?,
            StartDecision::Skip(SyncStatus::Active)
        );
        assert_eq!(other.mark_interrupted().await?, 0);

        owner.complete_full_index(&identity).await?;
        assert_eq!(
            other.begin_full_index(&identity, false).await?,
            StartDecision::Skip(SyncStatus::Done)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_writes_keep_changes_from_other_trackers() -> anyhow::Result<()> {
        let store = Arc::new(MemoryDataStore::new());
        let first = IndexingStateTracker::load(store.clone()).await?;
        let second = IndexingStateTracker::load(store.clone()).await?;
        let identity = AdapterIdentity::from("sqlite:a.db");

        let mut settings = Settings::default();
        settings.embedding_model = Some("text-embedding-3-large".into());
        second.update_settings(settings.clone()).await?;

        first.begin_full_index(&identity, false).await?;
        first.complete_full_index(&identity).await?;

        let saved = store.snapshot();
        assert_eq!(saved.settings, settings);
        assert_eq!(
            saved.adapter_status_mapper.get(&identity),
            Some(&SyncStatus::Done)
        );
        // The writer's cache follows the store
        assert_eq!(first.settings().await, settings);
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_interrupted_without_runs_does_not_write() -> anyhow::Result<()> {
        let store = Arc::new(MemoryDataStore::new());
        let tracker = IndexingStateTracker::load(store.clone()).await?;

        assert_eq!(tracker.mark_interrupted().await?, 0);
        assert_eq!(store.save_count(), 0);
        Ok(())
    }
}
