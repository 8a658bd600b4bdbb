//! Settings and their persistence.
//!
//! Everything that survives a restart lives in one JSON blob:
//!
//! ```json
//! {
//!   "settings": {
//!     "embeddingProviderKey": "sk-...",
//!     "vectorStoreUrl": "https://<cluster>/v1/vector",
//!     "vectorStoreCollectionName": "notes",
//!     "vectorStoreApiKey": "...",
//!     "indexedExtensions": ["md"]
//!   },
//!   "adapterStatusMapper": {
//!     "zilliz:https%3A//<cluster>/v1/vector:notes:3f2a9c0d1e4b5a67": "DONE"
//!   }
//! }
//! ```
//!
//! The blob is read once at startup. Every change is applied to the blob as it currently is
//! on disk, so processes sharing one file only overwrite the fields they changed.

use crate::retrieval::sync_state::SyncStatus;
use crate::storage::AdapterIdentity;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{File, OpenOptions, TryLockError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use vault_search_embed::EmbedConfig;

/// Default file name of the persisted blob inside a vault.
pub const DEFAULT_DATA_FILE: &str = ".vault-search.json";

/// Errors reading or writing the persisted blob.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid persisted data: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

/// User-facing configuration.
///
/// A blank credential or connection field disables the adapter that needs it. Legacy field
/// names (`openAiKey`, `zillizUrl`, ...) are accepted when reading.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    #[serde(alias = "openAiKey")]
    pub embedding_provider_key: String,
    #[serde(alias = "zillizUrl")]
    pub vector_store_url: String,
    #[serde(alias = "zillizCollectionName")]
    pub vector_store_collection_name: String,
    #[serde(alias = "zillizApiKey")]
    pub vector_store_api_key: String,
    /// Embedding model override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// OpenAI-compatible API root override
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_base_url: Option<String>,
    /// SQLite database used when no remote store is configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_store_path: Option<PathBuf>,
    /// File extensions (without the dot) that are indexed
    pub indexed_extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            embedding_provider_key: String::new(),
            vector_store_url: String::new(),
            vector_store_collection_name: String::new(),
            vector_store_api_key: String::new(),
            embedding_model: None,
            embedding_base_url: None,
            local_store_path: None,
            indexed_extensions: vec!["md".to_string()],
        }
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.trim().is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("embedding_provider_key", &mask(&self.embedding_provider_key))
            .field("vector_store_url", &self.vector_store_url)
            .field(
                "vector_store_collection_name",
                &self.vector_store_collection_name,
            )
            .field("vector_store_api_key", &mask(&self.vector_store_api_key))
            .field("embedding_model", &self.embedding_model)
            .field("embedding_base_url", &self.embedding_base_url)
            .field("local_store_path", &self.local_store_path)
            .field("indexed_extensions", &self.indexed_extensions)
            .finish()
    }
}

impl Settings {
    /// Whether an embedding provider key is present
    pub fn has_embedding_provider(&self) -> bool {
        !self.embedding_provider_key.trim().is_empty()
    }

    /// Whether URL, collection and key of the remote store are all present
    pub fn has_remote_store(&self) -> bool {
        !self.vector_store_url.trim().is_empty()
            && !self.vector_store_collection_name.trim().is_empty()
            && !self.vector_store_api_key.trim().is_empty()
    }

    /// Embedding configuration, if a provider key is present
    pub fn embed_config(&self) -> Option<EmbedConfig> {
        if !self.has_embedding_provider() {
            return None;
        }
        let mut config = EmbedConfig::openai(self.embedding_provider_key.trim());
        if let Some(model) = self.embedding_model.as_deref().filter(|m| !m.trim().is_empty()) {
            config = config.with_model(model.trim());
        }
        if let Some(url) = self
            .embedding_base_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
        {
            config = config.with_base_url(url.trim());
        }
        Some(config)
    }

    /// Masked rendering of a credential for status output
    pub fn describe_secret(secret: &str) -> &'static str {
        mask(secret)
    }
}

/// The whole persisted blob: settings plus per-store indexing status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedData {
    pub settings: Settings,
    pub adapter_status_mapper: BTreeMap<AdapterIdentity, SyncStatus>,
}

/// A change to the persisted blob; returns whether anything changed.
pub type Mutation = Box<dyn FnOnce(&mut PersistedData) -> bool + Send>;

/// Ownership of one full-corpus pass, released when dropped.
pub struct PassClaim {
    _held: Box<dyn Any + Send + Sync>,
}

impl PassClaim {
    pub fn new<T: Send + Sync + 'static>(held: T) -> Self {
        Self {
            _held: Box::new(held),
        }
    }
}

impl std::fmt::Debug for PassClaim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassClaim").finish_non_exhaustive()
    }
}

/// Key-value persistence for [`PersistedData`].
///
/// Several processes may share one store, so writers go through [`update`](Self::update),
/// which applies a change to the current blob rather than replacing it wholesale.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Load the blob; a store that was never written yields the defaults
    async fn load(&self) -> Result<PersistedData, PersistenceError>;

    /// Replace the blob
    async fn save(&self, data: &PersistedData) -> Result<(), PersistenceError>;

    /// Apply `mutation` to the current blob and persist it if it changed.
    /// Returns the blob as it is after the change.
    async fn update(&self, mutation: Mutation) -> Result<PersistedData, PersistenceError>;

    /// Claim the full-corpus pass of `identity`; `None` while another owner holds it.
    async fn claim_pass(
        &self,
        identity: &AdapterIdentity,
    ) -> Result<Option<PassClaim>, PersistenceError>;

    /// Human-readable location, for status output
    fn location(&self) -> String;
}

/// Stores the blob as pretty-printed JSON in a file.
///
/// Writes go to a temporary file in the same directory that is then renamed over the
/// target, so a crash never leaves a half-written blob behind. Read-modify-write cycles hold
/// an advisory lock on `<file>.lock`. Pass claims are advisory locks on
/// `<file>.<identity hash>.lock`, so the OS drops them when their process dies.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A file next to the blob, named after it
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from(DEFAULT_DATA_FILE));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn pass_lock_path(&self, identity: &AdapterIdentity) -> PathBuf {
        let digest = blake3::hash(identity.as_str().as_bytes());
        self.sibling(&format!(".{}.lock", hex::encode(&digest.as_bytes()[..8])))
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Run a read-modify-write cycle on a blocking thread while holding the blob lock.
    async fn locked<T, F>(&self, cycle: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<T, PersistenceError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.sibling(".lock");

        tokio::task::spawn_blocking(move || -> Result<T, PersistenceError> {
            let lock = open_lock_file(&lock_path).map_err(|source| PersistenceError::Io {
                path: lock_path.clone(),
                source,
            })?;
            lock.lock().map_err(|source| PersistenceError::Io {
                path: lock_path.clone(),
                source,
            })?;
            // Dropping the file releases the lock
            cycle(&path)
        })
        .await
        .map_err(|e| self.io_error(std::io::Error::other(e)))?
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn open_lock_file(path: &Path) -> std::io::Result<File> {
    std::fs::create_dir_all(parent_dir(path))?;
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
}

fn read_blob(path: &Path) -> Result<PersistedData, PersistenceError> {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents.trim().is_empty() => Ok(PersistedData::default()),
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PersistedData::default()),
        Err(source) => Err(PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_blob(path: &Path, data: &PersistedData) -> Result<(), PersistenceError> {
    let contents = serde_json::to_vec_pretty(data)?;
    let written = (|| -> std::io::Result<()> {
        let dir = parent_dir(path);
        std::fs::create_dir_all(&dir)?;
        let mut file = tempfile::NamedTempFile::new_in(&dir)?;
        file.write_all(&contents)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    })();
    written.map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl DataStore for JsonFileStore {
    async fn load(&self) -> Result<PersistedData, PersistenceError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(PersistedData::default()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No data file at {}, using defaults", self.path.display());
                Ok(PersistedData::default())
            }
            Err(e) => Err(self.io_error(e)),
        }
    }

    async fn save(&self, data: &PersistedData) -> Result<(), PersistenceError> {
        let data = data.clone();
        self.locked(move |path| write_blob(path, &data)).await
    }

    async fn update(&self, mutation: Mutation) -> Result<PersistedData, PersistenceError> {
        self.locked(move |path| {
            let mut data = read_blob(path)?;
            if mutation(&mut data) {
                write_blob(path, &data)?;
            }
            Ok(data)
        })
        .await
    }

    async fn claim_pass(
        &self,
        identity: &AdapterIdentity,
    ) -> Result<Option<PassClaim>, PersistenceError> {
        let lock_path = self.pass_lock_path(identity);

        tokio::task::spawn_blocking(move || -> Result<Option<PassClaim>, PersistenceError> {
            let io_error = |source: std::io::Error| PersistenceError::Io {
                path: lock_path.clone(),
                source,
            };
            let file = open_lock_file(&lock_path).map_err(io_error)?;
            match file.try_lock() {
                Ok(()) => Ok(Some(PassClaim::new(file))),
                Err(TryLockError::WouldBlock) => Ok(None),
                Err(TryLockError::Error(e)) => Err(io_error(e)),
            }
        })
        .await
        .map_err(|e| self.io_error(std::io::Error::other(e)))?
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-memory [`DataStore`] that counts writes.
///
/// Pass claims are tracked per store, so trackers sharing one instance see each other's
/// claims the way separate processes do through a [`JsonFileStore`].
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    data: Mutex<PersistedData>,
    saves: AtomicUsize,
    claims: Arc<Mutex<BTreeSet<AdapterIdentity>>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing blob
    pub fn with_data(data: PersistedData) -> Self {
        Self {
            data: Mutex::new(data),
            ..Default::default()
        }
    }

    /// Number of completed saves
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the last saved blob
    pub fn snapshot(&self) -> PersistedData {
        self.data
            .lock()
            .map(|data| data.clone())
            .unwrap_or_default()
    }
}

struct MemoryClaim {
    claims: Arc<Mutex<BTreeSet<AdapterIdentity>>>,
    identity: AdapterIdentity,
}

impl Drop for MemoryClaim {
    fn drop(&mut self) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.remove(&self.identity);
        }
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn load(&self) -> Result<PersistedData, PersistenceError> {
        Ok(self.snapshot())
    }

    async fn save(&self, data: &PersistedData) -> Result<(), PersistenceError> {
        if let Ok(mut stored) = self.data.lock() {
            *stored = data.clone();
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn update(&self, mutation: Mutation) -> Result<PersistedData, PersistenceError> {
        let mut data = self.snapshot();
        if mutation(&mut data) {
            self.save(&data).await?;
        }
        Ok(data)
    }

    async fn claim_pass(
        &self,
        identity: &AdapterIdentity,
    ) -> Result<Option<PassClaim>, PersistenceError> {
        let claimed = match self.claims.lock() {
            Ok(mut claims) => claims.insert(identity.clone()),
            Err(_) => false,
        };
        Ok(claimed.then(|| {
            PassClaim::new(MemoryClaim {
                claims: self.claims.clone(),
                identity: identity.clone(),
            })
        }))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
