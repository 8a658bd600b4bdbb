//! The host document store: enumerating, reading and resolving vault documents.

use async_trait::async_trait;
use ignore::Match;
use ignore::gitignore::GitignoreBuilder;
use std::path::{Component, Path, PathBuf};

/// A note in the vault.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Document {
    /// Vault-relative path with `/` separators; the key used in the vector store
    pub name: String,
    /// Location on disk
    pub path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("Failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to enumerate documents under {root}: {message}")]
    Enumerate { root: PathBuf, message: String },
}

/// Read-only view of the documents the core indexes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every indexable document, sorted by name
    async fn list_documents(&self) -> Result<Vec<Document>, DocumentError>;

    /// Full text of a document
    async fn read_document(&self, document: &Document) -> Result<String, DocumentError>;

    /// Map a filesystem path to a document, if the path is one this store indexes.
    fn resolve(&self, path: &Path) -> Option<Document>;
}

/// A directory of notes on disk.
///
/// Hidden files and directories are skipped, `.gitignore`/`.ignore` rules are honoured
/// even outside a git repository, and only files with one of the configured extensions are
/// documents.
#[derive(Debug, Clone)]
pub struct VaultDirectory {
    root: PathBuf,
    extensions: Vec<String>,
    excluded: Vec<PathBuf>,
}

impl VaultDirectory {
    pub fn new<P, I, S>(root: P, extensions: I) -> Self
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        Self {
            root,
            extensions,
            excluded: Vec::new(),
        }
    }

    /// Never treat `path` as a document (e.g. the persisted data file).
    pub fn exclude<P: AsRef<Path>>(mut self, path: P) -> Self {
        let absolute = self.absolute(path.as_ref());
        self.excluded.push(absolute);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn has_indexed_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    fn walk(&self) -> Vec<Document> {
        let walker = ignore::WalkBuilder::new(&self.root)
            .hidden(true)
            .require_git(false)
            .build();

        let files = walker.map(|entry| {
            entry.map(|entry| {
                entry
                    .file_type()
                    .is_some_and(|t| t.is_file())
                    .then(|| entry.into_path())
            })
        });
        self.collect(files)
    }

    /// Documents among walked entries; an entry that cannot be read is logged and skipped.
    fn collect<I>(&self, entries: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Result<Option<PathBuf>, ignore::Error>>,
    {
        let mut documents = Vec::new();
        for entry in entries {
            match entry {
                Ok(Some(path)) => documents.extend(self.document_at(&path)),
                Ok(None) => {}
                Err(e) => tracing::warn!(
                    "Skipping unreadable entry under {}: {}",
                    self.root.display(),
                    e
                ),
            }
        }

        documents.sort();
        documents
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// The document at `absolute`, without consulting ignore files.
    fn document_at(&self, absolute: &Path) -> Option<Document> {
        if self.excluded.iter().any(|excluded| excluded == absolute)
            || !self.has_indexed_extension(absolute)
        {
            return None;
        }

        let relative = absolute.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str()?;
                    if part.starts_with('.') {
                        return None;
                    }
                    parts.push(part);
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }

        Some(Document {
            name: parts.join("/"),
            path: absolute.to_path_buf(),
        })
    }

    /// Whether `.gitignore`/`.ignore` files between the root and `document` exclude it.
    ///
    /// Files closer to the document take precedence, and `.ignore` overrides `.gitignore`
    /// within one directory, matching what the corpus walk sees.
    fn is_ignored(&self, document: &Document) -> bool {
        let mut directories = vec![self.root.clone()];
        let mut directory = self.root.clone();
        let parts: Vec<&str> = document.name.split('/').collect();
        if let Some((_, parents)) = parts.split_last() {
            for part in parents {
                directory.push(part);
                directories.push(directory.clone());
            }
        }

        for directory in directories.iter().rev() {
            let mut builder = GitignoreBuilder::new(directory);
            for name in [".gitignore", ".ignore"] {
                let file = directory.join(name);
                if file.is_file()
                    && let Some(e) = builder.add(&file)
                {
                    tracing::debug!("Problem reading {}: {}", file.display(), e);
                }
            }
            let matcher = match builder.build() {
                Ok(matcher) => matcher,
                Err(e) => {
                    tracing::debug!("Ignoring rules under {}: {}", directory.display(), e);
                    continue;
                }
            };
            match matcher.matched_path_or_any_parents(&document.path, false) {
                Match::Ignore(_) => return true,
                Match::Whitelist(_) => return false,
                Match::None => {}
            }
        }
        false
    }
}

#[async_trait]
impl DocumentStore for VaultDirectory {
    async fn list_documents(&self) -> Result<Vec<Document>, DocumentError> {
        let vault = self.clone();
        tokio::task::spawn_blocking(move || vault.walk())
            .await
            .map_err(|e| DocumentError::Enumerate {
                root: self.root.clone(),
                message: e.to_string(),
            })
    }

    async fn read_document(&self, document: &Document) -> Result<String, DocumentError> {
        tokio::fs::read_to_string(&document.path)
            .await
            .map_err(|source| DocumentError::Read {
                name: document.name.clone(),
                source,
            })
    }

    fn resolve(&self, path: &Path) -> Option<Document> {
        let document = self.document_at(&self.absolute(path))?;
        (!self.is_ignored(&document)).then_some(document)
    }
}
