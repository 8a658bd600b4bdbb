//! SQLite implementation of the vector store
//!
//! A local, dependency-free alternative to a hosted vector database. Vectors are stored as
//! f16 blobs and ranked by cosine similarity in process, which is plenty for a personal
//! vault of a few thousand notes.
//!
//! ## Database Schema
//!
//! ```sql
//! CREATE TABLE embeddings (
//!     id INTEGER PRIMARY KEY AUTOINCREMENT,
//!     filename TEXT NOT NULL,          -- vault-relative document name
//!     text TEXT NOT NULL,              -- chunk text
//!     vector BLOB NOT NULL,            -- f16 embedding
//!     created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
//! );
//! CREATE INDEX idx_embeddings_filename ON embeddings(filename);
//! ```

use super::{
    AdapterIdentity, Result, SEARCH_LIMIT, SearchMatch, StoreError, VectorStoreAdapter,
    prepare_records,
};
use async_trait::async_trait;
use half::f16;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use vault_search_context::TextChunk;

/// Vector store in a single SQLite database.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
    identity: AdapterIdentity,
}

impl SqliteStore {
    /// Opens (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .create_if_missing(true),
        )
        .await
        .map_err(|e| {
            StoreError::configuration(format!("cannot open {}: {e}", path.display()))
        })?;

        let identity = AdapterIdentity::from_parts("sqlite", &[&path.display().to_string()]);
        Self::new_with_pool(pool, identity).await
    }

    /// Opens an in-memory database, mostly for tests.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one alive
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreError::configuration(e.to_string()))?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::configuration(e.to_string()))?;

        Self::new_with_pool(pool, AdapterIdentity::from("sqlite::memory:")).await
    }

    async fn new_with_pool(pool: SqlitePool, identity: AdapterIdentity) -> Result<Self> {
        Self::create_tables(&pool)
            .await
            .map_err(|e| StoreError::configuration(format!("cannot create tables: {e}")))?;
        tracing::info!("Opened SQLite store {}", identity);
        Ok(Self { pool, identity })
    }

    async fn create_tables(pool: &SqlitePool) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL,
                text TEXT NOT NULL,
                vector BLOB NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_filename ON embeddings(filename)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Number of stored records, optionally restricted to one document.
    pub async fn record_count(&self, source_name: Option<&str>) -> Result<usize> {
        let row = match source_name {
            Some(name) => {
                sqlx::query("SELECT COUNT(*) AS n FROM embeddings WHERE filename = ?")
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT COUNT(*) AS n FROM embeddings")
                    .fetch_one(&self.pool)
                    .await
            }
        }
        .map_err(|e| StoreError::Search {
            message: e.to_string(),
        })?;

        let count: i64 = row.get("n");
        Ok(count as usize)
    }
}

#[async_trait]
impl VectorStoreAdapter for SqliteStore {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    async fn delete_embeddings(&self, source_name: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM embeddings WHERE filename = ?")
            .bind(source_name)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Deletion {
                source_name: source_name.to_string(),
                message: e.to_string(),
            })?;

        tracing::debug!(
            "Deleted {} records for {}",
            result.rows_affected(),
            source_name
        );
        Ok(())
    }

    async fn save_embeddings(
        &self,
        source_name: &str,
        chunks: &[TextChunk],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        let records = prepare_records(source_name, chunks, vectors)?;
        if records.is_empty() {
            return Ok(());
        }

        let upload_error = |e: sqlx::Error| StoreError::Upload {
            source_name: source_name.to_string(),
            message: e.to_string(),
        };

        let mut tx = self.pool.begin().await.map_err(upload_error)?;
        for record in &records {
            let vector: Vec<f16> = record.vector.iter().map(|&x| f16::from_f32(x)).collect();
            let bytes: &[u8] = bytemuck::cast_slice(&vector);

            sqlx::query("INSERT INTO embeddings (filename, text, vector) VALUES (?, ?, ?)")
                .bind(&record.filename)
                .bind(&record.text)
                .bind(bytes)
                .execute(&mut *tx)
                .await
                .map_err(upload_error)?;
        }
        tx.commit().await.map_err(upload_error)?;

        tracing::debug!("Stored {} records for {}", records.len(), source_name);
        Ok(())
    }

    async fn similarity_search(&self, vector: &[f32]) -> Result<Vec<SearchMatch>> {
        let rows = sqlx::query("SELECT filename, text, vector FROM embeddings ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Search {
                message: e.to_string(),
            })?;

        let mut scored: Vec<(f32, SearchMatch)> = rows
            .into_iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get("vector");
                let stored: Vec<f16> = bytes
                    .chunks_exact(2)
                    .map(bytemuck::pod_read_unaligned::<f16>)
                    .collect();
                let score = cosine_similarity(vector, &stored);
                (
                    score,
                    SearchMatch {
                        filename: row.get("filename"),
                        matching_text: row.get("text"),
                    },
                )
            })
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(SEARCH_LIMIT);

        Ok(scored.into_iter().map(|(_, hit)| hit).collect())
    }
}

// Cosine similarity between a query and a stored f16 vector
fn cosine_similarity(a: &[f32], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (&a_f32, b) in a.iter().zip(b) {
        let b_f32 = b.to_f32();
        dot_product += a_f32 * b_f32;
        norm_a += a_f32 * a_f32;
        norm_b += b_f32 * b_f32;
    }

    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot_product / (norm_a * norm_b)
    }
}
