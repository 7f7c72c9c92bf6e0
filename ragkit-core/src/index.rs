//! Pluggable vector index clients.
//!
//! Provides a trait-based abstraction over vector-database services, with a
//! Pinecone serverless data-plane client as the primary implementation and
//! an in-memory exact cosine scan for offline use and tests.

use crate::config::IndexConfig;
use crate::error::IndexError;
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A vector with its id and metadata, as stored in the index.
///
/// Chunk text rides in metadata under the `"text"` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A nearest-neighbor match returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl QueryMatch {
    /// The stored chunk text, if present in metadata.
    pub fn text(&self) -> Option<&str> {
        self.metadata.get("text").map(|s| s.as_str())
    }
}

/// Index-level statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub dimension: usize,
    pub total_vectors: usize,
}

/// A hosted vector-database API consumed as a black box.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Upsert records into the index. Returns the number of records upserted.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError>;

    /// Return the `top_k` nearest neighbors of `values`, score descending.
    async fn query(&self, values: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError>;

    /// Return index-level statistics.
    async fn stats(&self) -> Result<IndexStats, IndexError>;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Pinecone serverless data-plane client.
///
/// Talks to the index host directly: `/vectors/upsert`, `/query`, and
/// `/describe_index_stats`, authenticated via the `Api-Key` header.
pub struct PineconeIndex {
    client: Client,
    base_url: String,
    api_key: String,
    namespace: Option<String>,
    dimensions: usize,
    upsert_batch_size: usize,
    retry: RetryConfig,
}

impl PineconeIndex {
    /// Create a new client from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`. The index host must be configured.
    pub fn new(config: &IndexConfig, retry: RetryConfig) -> Result<Self, IndexError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| IndexError::AuthFailed {
            provider: format!("pinecone (env var '{}' not set)", config.api_key_env),
        })?;
        Self::new_with_key(config, api_key, retry)
    }

    /// Create a new client with an explicitly provided API key.
    pub fn new_with_key(
        config: &IndexConfig,
        api_key: String,
        retry: RetryConfig,
    ) -> Result<Self, IndexError> {
        if config.host.is_empty() {
            return Err(IndexError::InvalidConfig {
                message: "index host is not configured".to_string(),
            });
        }
        let base_url = if config.host.starts_with("http://") || config.host.starts_with("https://")
        {
            config.host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", config.host.trim_end_matches('/'))
        };
        Ok(Self {
            client: Client::new(),
            base_url,
            api_key,
            namespace: config.namespace.clone(),
            dimensions: config.dimensions,
            upsert_batch_size: config.upsert_batch_size.max(1),
            retry,
        })
    }

    /// Build the JSON body for one upsert call.
    fn build_upsert_body(&self, records: &[VectorRecord]) -> Value {
        let vectors: Vec<Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "values": r.values,
                    "metadata": r.metadata,
                })
            })
            .collect();
        let mut body = serde_json::json!({ "vectors": vectors });
        if let Some(ns) = &self.namespace {
            body["namespace"] = Value::String(ns.clone());
        }
        body
    }

    /// Build the JSON body for a query call.
    fn build_query_body(&self, values: &[f32], top_k: usize) -> Value {
        let mut body = serde_json::json!({
            "vector": values,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(ns) = &self.namespace {
            body["namespace"] = Value::String(ns.clone());
        }
        body
    }

    /// Parse the matches array of a query response.
    fn parse_query_response(body: &Value) -> Result<Vec<QueryMatch>, IndexError> {
        let matches = body["matches"]
            .as_array()
            .ok_or_else(|| IndexError::ResponseParse {
                message: "Missing 'matches' array in query response".to_string(),
            })?;

        let mut results = Vec::with_capacity(matches.len());
        for entry in matches {
            let id = entry["id"]
                .as_str()
                .ok_or_else(|| IndexError::ResponseParse {
                    message: "Match without an 'id' field".to_string(),
                })?
                .to_string();
            let score = entry["score"].as_f64().unwrap_or(0.0) as f32;
            let metadata = entry["metadata"]
                .as_object()
                .map(|obj| {
                    obj.iter()
                        .map(|(k, v)| {
                            let value = match v {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            };
                            (k.clone(), value)
                        })
                        .collect()
                })
                .unwrap_or_default();
            results.push(QueryMatch {
                id,
                score,
                metadata,
            });
        }
        Ok(results)
    }

    /// Map an HTTP status code to the appropriate `IndexError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> IndexError {
        match status.as_u16() {
            401 | 403 => IndexError::AuthFailed {
                provider: "pinecone".to_string(),
            },
            429 => IndexError::RateLimited {
                retry_after_secs: 30,
            },
            _ => IndexError::ApiRequest {
                message: format!("HTTP {} from Pinecone API: {}", status, body_text),
            },
        }
    }

    /// POST a JSON body to a data-plane path and return the parsed response.
    async fn post(&self, path: &str, body: &Value) -> Result<Value, IndexError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = url.as_str(), "Sending Pinecone request");

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    IndexError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    IndexError::ApiRequest {
                        message: format!("Request to Pinecone API failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| IndexError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        serde_json::from_str(&body_text).map_err(|e| IndexError::ResponseParse {
            message: format!("Invalid JSON in response: {}", e),
        })
    }
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        // Validate dimensions client-side before any network call.
        for record in records {
            if record.values.len() != self.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: record.values.len(),
                });
            }
        }

        let mut upserted = 0;
        // One request at a time; each batch retried independently.
        for batch in records.chunks(self.upsert_batch_size) {
            let body = self.build_upsert_body(batch);
            let response = with_retry(&self.retry, || self.post("/vectors/upsert", &body)).await?;
            upserted += response["upsertedCount"].as_u64().unwrap_or(batch.len() as u64) as usize;
        }
        Ok(upserted)
    }

    async fn query(&self, values: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        if values.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                actual: values.len(),
            });
        }
        let body = self.build_query_body(values, top_k);
        let response = with_retry(&self.retry, || self.post("/query", &body)).await?;
        Self::parse_query_response(&response)
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let body = serde_json::json!({});
        let response =
            with_retry(&self.retry, || self.post("/describe_index_stats", &body)).await?;
        Ok(IndexStats {
            dimension: response["dimension"].as_u64().unwrap_or(0) as usize,
            total_vectors: response["totalVectorCount"].as_u64().unwrap_or(0) as usize,
        })
    }

    fn provider_name(&self) -> &str {
        "pinecone"
    }
}

/// In-memory exact cosine-similarity index.
///
/// Not an ANN engine — every query scans all records. Suitable for offline
/// runs and unit tests only. Upserting a record with an existing id replaces
/// it.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Cosine similarity of two vectors; zero-norm inputs score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize, IndexError> {
        let mut store = self
            .records
            .write()
            .map_err(|_| IndexError::ApiRequest {
                message: "In-memory index lock poisoned".to_string(),
            })?;
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(&self, values: &[f32], top_k: usize) -> Result<Vec<QueryMatch>, IndexError> {
        let store = self
            .records
            .read()
            .map_err(|_| IndexError::ApiRequest {
                message: "In-memory index lock poisoned".to_string(),
            })?;
        let mut matches: Vec<QueryMatch> = store
            .values()
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: cosine_similarity(values, &r.values),
                metadata: r.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn stats(&self) -> Result<IndexStats, IndexError> {
        let store = self
            .records
            .read()
            .map_err(|_| IndexError::ApiRequest {
                message: "In-memory index lock poisoned".to_string(),
            })?;
        let dimension = store.values().next().map(|r| r.values.len()).unwrap_or(0);
        Ok(IndexStats {
            dimension,
            total_vectors: store.len(),
        })
    }

    fn provider_name(&self) -> &str {
        "memory"
    }
}

/// Instantiate the index client named in `config.provider`.
pub fn create_index(
    config: &IndexConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn VectorIndex>, IndexError> {
    match config.provider.as_str() {
        "pinecone" => Ok(Arc::new(PineconeIndex::new(config, retry.clone())?)),
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        other => Err(IndexError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> IndexConfig {
        IndexConfig {
            provider: "pinecone".into(),
            host: "my-index.svc.pinecone.io".into(),
            api_key_env: "UNUSED".into(),
            namespace: None,
            upsert_batch_size: 2,
            dimensions: 3,
        }
    }

    fn no_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 0,
            initial_backoff_ms: 1,
            max_backoff_ms: 1,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    fn record(id: &str, values: Vec<f32>, text: &str) -> VectorRecord {
        let mut metadata = HashMap::new();
        metadata.insert("text".to_string(), text.to_string());
        VectorRecord {
            id: id.to_string(),
            values,
            metadata,
        }
    }

    #[test]
    fn test_host_normalization() {
        let index =
            PineconeIndex::new_with_key(&test_config(), "key".to_string(), no_retry()).unwrap();
        assert_eq!(index.base_url, "https://my-index.svc.pinecone.io");

        let mut config = test_config();
        config.host = "http://localhost:1234/".into();
        let index = PineconeIndex::new_with_key(&config, "key".to_string(), no_retry()).unwrap();
        assert_eq!(index.base_url, "http://localhost:1234");
    }

    #[test]
    fn test_missing_host_is_invalid_config() {
        let mut config = test_config();
        config.host = String::new();
        let err = match PineconeIndex::new_with_key(&config, "key".to_string(), no_retry()) {
            Ok(_) => panic!("Expected an error for missing host"),
            Err(e) => e,
        };
        assert!(matches!(err, IndexError::InvalidConfig { .. }));
    }

    #[test]
    fn test_build_upsert_body_includes_namespace() {
        let mut config = test_config();
        config.namespace = Some("docs".into());
        let index = PineconeIndex::new_with_key(&config, "key".to_string(), no_retry()).unwrap();
        let body = index.build_upsert_body(&[record("a", vec![1.0, 0.0, 0.0], "alpha")]);
        assert_eq!(body["namespace"], "docs");
        assert_eq!(body["vectors"][0]["id"], "a");
        assert_eq!(body["vectors"][0]["metadata"]["text"], "alpha");
    }

    #[test]
    fn test_build_query_body() {
        let index =
            PineconeIndex::new_with_key(&test_config(), "key".to_string(), no_retry()).unwrap();
        let body = index.build_query_body(&[0.1, 0.2, 0.3], 5);
        assert_eq!(body["topK"], 5);
        assert_eq!(body["includeMetadata"], true);
        assert!(body.get("namespace").is_none());
    }

    #[test]
    fn test_parse_query_response() {
        let body = serde_json::json!({
            "matches": [
                {"id": "a", "score": 0.92, "metadata": {"text": "alpha", "chunk_index": 0}},
                {"id": "b", "score": 0.71, "metadata": {"text": "beta"}}
            ],
            "namespace": ""
        });
        let matches = PineconeIndex::parse_query_response(&body).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "a");
        assert!((matches[0].score - 0.92).abs() < 1e-6);
        assert_eq!(matches[0].text(), Some("alpha"));
        // Non-string metadata values are stringified.
        assert_eq!(matches[0].metadata.get("chunk_index").unwrap(), "0");
    }

    #[test]
    fn test_parse_query_response_missing_matches() {
        let body = serde_json::json!({"results": []});
        let err = PineconeIndex::parse_query_response(&body).unwrap_err();
        assert!(matches!(err, IndexError::ResponseParse { .. }));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dimensions_before_network() {
        let index =
            PineconeIndex::new_with_key(&test_config(), "key".to_string(), no_retry()).unwrap();
        let err = index
            .upsert(&[record("a", vec![1.0, 0.0], "short")])
            .await
            .unwrap_err();
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 2);
            }
            other => panic!("Expected DimensionMismatch, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upsert_against_mock_server_in_batches() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/vectors/upsert")
            .match_header("Api-Key", "pc-test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"upsertedCount": 2}"#)
            .expect(2)
            .create_async()
            .await;

        let mut config = test_config();
        config.host = server.url();
        let index = PineconeIndex::new_with_key(&config, "pc-test".to_string(), no_retry()).unwrap();

        // Four records, batch size 2 -> two requests.
        let records = vec![
            record("a", vec![1.0, 0.0, 0.0], "alpha"),
            record("b", vec![0.0, 1.0, 0.0], "beta"),
            record("c", vec![0.0, 0.0, 1.0], "gamma"),
            record("d", vec![1.0, 1.0, 0.0], "delta"),
        ];
        let upserted = index.upsert(&records).await.unwrap();
        assert_eq!(upserted, 4);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_query_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/query")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"matches": [{"id": "a", "score": 0.9, "metadata": {"text": "alpha"}}]}"#,
            )
            .create_async()
            .await;

        let mut config = test_config();
        config.host = server.url();
        let index = PineconeIndex::new_with_key(&config, "pc-test".to_string(), no_retry()).unwrap();

        let matches = index.query(&[1.0, 0.0, 0.0], 3).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text(), Some("alpha"));
    }

    #[tokio::test]
    async fn test_stats_against_mock_server() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/describe_index_stats")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"dimension": 3, "totalVectorCount": 42, "namespaces": {}}"#)
            .create_async()
            .await;

        let mut config = test_config();
        config.host = server.url();
        let index = PineconeIndex::new_with_key(&config, "pc-test".to_string(), no_retry()).unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.dimension, 3);
        assert_eq!(stats.total_vectors, 42);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        // Zero vectors and mismatched lengths score 0.
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_memory_index_query_orders_by_score() {
        let index = MemoryIndex::new();
        index
            .upsert(&[
                record("x", vec![1.0, 0.0, 0.0], "x-axis"),
                record("y", vec![0.0, 1.0, 0.0], "y-axis"),
                record("near-x", vec![0.9, 0.1, 0.0], "near x"),
            ])
            .await
            .unwrap();

        let matches = index.query(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "x");
        assert_eq!(matches[1].id, "near-x");
        assert!(matches[0].score >= matches[1].score);
    }

    #[tokio::test]
    async fn test_memory_index_upsert_replaces_by_id() {
        let index = MemoryIndex::new();
        index
            .upsert(&[record("a", vec![1.0, 0.0, 0.0], "old")])
            .await
            .unwrap();
        index
            .upsert(&[record("a", vec![0.0, 1.0, 0.0], "new")])
            .await
            .unwrap();

        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 1);

        let matches = index.query(&[0.0, 1.0, 0.0], 1).await.unwrap();
        assert_eq!(matches[0].text(), Some("new"));
    }

    #[tokio::test]
    async fn test_memory_index_stats_empty() {
        let index = MemoryIndex::new();
        let stats = index.stats().await.unwrap();
        assert_eq!(stats.total_vectors, 0);
        assert_eq!(stats.dimension, 0);
    }

    #[test]
    fn test_create_index_unknown_provider() {
        let mut config = test_config();
        config.provider = "faiss".into();
        let err = match create_index(&config, &RetryConfig::default()) {
            Ok(_) => panic!("Expected an error for unknown provider"),
            Err(e) => e,
        };
        assert!(matches!(err, IndexError::UnsupportedProvider { .. }));
    }
}
