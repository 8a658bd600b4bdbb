//! Zilliz Cloud (managed Milvus) backend over its REST API.
//!
//! Every operation is a single JSON `POST` against the cluster endpoint:
//!
//! | Operation | Path      | Body                                                    |
//! |-----------|-----------|---------------------------------------------------------|
//! | delete    | `/delete` | `{collectionName, filter}`                              |
//! | upsert    | `/insert` | `{collectionName, data: [{text, vector, filename}]}`    |
//! | search    | `/search` | `{collectionName, data: [vector], limit, outputFields}` |
//!
//! A response counts as successful only when the HTTP status is 200 and the body's `code` is
//! 0. Requests are never retried.

use super::{
    AdapterIdentity, Result, SEARCH_LIMIT, SearchMatch, StoreError, StoredRecord,
    VectorStoreAdapter, credential_fingerprint, escape_filter_value, prepare_records,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vault_search_context::TextChunk;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    collection_name: &'a str,
    filter: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InsertRequest<'a> {
    collection_name: &'a str,
    data: &'a [StoredRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    collection_name: &'a str,
    data: [&'a [f32]; 1],
    limit: usize,
    output_fields: [&'static str; 1],
}

#[derive(Deserialize)]
struct ZillizResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    text: String,
}

/// Vector store backed by a Zilliz Cloud collection.
#[derive(Clone)]
pub struct ZillizStore {
    client: Client,
    url: String,
    collection_name: String,
    identity: AdapterIdentity,
}

impl std::fmt::Debug for ZillizStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZillizStore")
            .field("url", &self.url)
            .field("collection_name", &self.collection_name)
            .field("identity", &self.identity)
            .finish()
    }
}

impl ZillizStore {
    /// Connects to `url` (the REST root, e.g. `https://<cluster>/v1/vector`) with a bearer key.
    pub fn new(url: &str, collection_name: &str, api_key: &str) -> Result<Self> {
        let url = url.trim().trim_end_matches('/').to_string();
        let collection_name = collection_name.trim().to_string();
        let api_key = api_key.trim();

        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(StoreError::configuration(format!(
                "vector store URL must be http(s): {url}"
            )));
        }
        if collection_name.is_empty() {
            return Err(StoreError::configuration("missing collection name"));
        }
        if api_key.is_empty() {
            return Err(StoreError::configuration("missing vector store key"));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
            StoreError::configuration("vector store key contains characters not allowed in a header")
        })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::configuration(format!("failed to build HTTP client: {e}")))?;

        let identity = AdapterIdentity::from_parts(
            "zilliz",
            &[&url, &collection_name, &credential_fingerprint(api_key)],
        );
        tracing::info!("Created Zilliz store {}", identity);

        Ok(Self {
            client,
            url,
            collection_name,
            identity,
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Post `body` to `path`, returning the `data` field of a successful response.
    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> std::result::Result<serde_json::Value, String> {
        let response = self
            .client
            .post(format!("{}/{}", self.url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(format!("backend returned HTTP {status}"));
        }

        let parsed: ZillizResponse = response
            .json()
            .await
            .map_err(|e| format!("malformed response: {e}"))?;
        if parsed.code != 0 {
            return Err(format!(
                "backend returned code {}: {}",
                parsed.code,
                parsed.message.unwrap_or_default()
            ));
        }

        Ok(parsed.data)
    }
}

#[async_trait]
impl VectorStoreAdapter for ZillizStore {
    fn identity(&self) -> &AdapterIdentity {
        &self.identity
    }

    async fn delete_embeddings(&self, source_name: &str) -> Result<()> {
        let request = DeleteRequest {
            collection_name: &self.collection_name,
            filter: format!("filename == \"{}\"", escape_filter_value(source_name)),
        };

        self.post("delete", &request).await.map_err(|message| {
            tracing::error!("Error deleting embeddings for {}: {}", source_name, message);
            StoreError::Deletion {
                source_name: source_name.to_string(),
                message,
            }
        })?;
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
            tracing::debug!("Nothing to upload for {}", source_name);
            return Ok(());
        }

        let request = InsertRequest {
            collection_name: &self.collection_name,
            data: &records,
        };

        self.post("insert", &request).await.map_err(|message| {
            tracing::error!("Unable to upload embeddings for {}: {}", source_name, message);
            StoreError::Upload {
                source_name: source_name.to_string(),
                message,
            }
        })?;

        tracing::debug!("Uploaded {} records for {}", records.len(), source_name);
        Ok(())
    }

    async fn similarity_search(&self, vector: &[f32]) -> Result<Vec<SearchMatch>> {
        let request = SearchRequest {
            collection_name: &self.collection_name,
            data: [vector],
            limit: SEARCH_LIMIT,
            output_fields: ["*"],
        };

        let data = self.post("search", &request).await.map_err(|message| {
            tracing::error!("Unable to perform search: {}", message);
            StoreError::Search { message }
        })?;

        let hits: Vec<SearchHit> = serde_json::from_value(data).map_err(|e| StoreError::Search {
            message: format!("malformed search results: {e}"),
        })?;

        Ok(hits
            .into_iter()
            .map(|hit| SearchMatch {
                filename: hit.filename,
                matching_text: hit.text,
            })
            .collect())
    }
}
