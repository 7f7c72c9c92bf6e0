//! Pluggable embedding providers.
//!
//! Provides a trait-based abstraction over text-embedding services, with a
//! Voyage AI API client as the primary implementation and a deterministic
//! local hashing embedder for offline use and tests.
//!
//! Document and query embeddings are requested with different `input_type`
//! values, matching the asymmetric models the Voyage API serves.

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::retry::{with_retry, RetryConfig};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The default Voyage AI API base URL.
const DEFAULT_BASE_URL: &str = "https://api.voyageai.com/v1";

/// Maximum inputs the Voyage API accepts in one request.
const API_MAX_BATCH: usize = 128;

/// A hosted text-embedding API consumed as a black box.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of corpus documents, preserving input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Return the dimensionality of produced embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Voyage AI embeddings client.
///
/// Inputs are sent in sequential batches of at most `batch_size`; each batch
/// request is retried on transient failures per the configured policy.
pub struct VoyageEmbedder {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
    batch_size: usize,
    retry: RetryConfig,
}

impl VoyageEmbedder {
    /// Create a new embedder from configuration.
    ///
    /// Reads the API key from the environment variable named in
    /// `config.api_key_env`.
    pub fn new(config: &EmbeddingConfig, retry: RetryConfig) -> Result<Self, EmbeddingError> {
        let api_key =
            std::env::var(&config.api_key_env).map_err(|_| EmbeddingError::AuthFailed {
                provider: format!("voyage (env var '{}' not set)", config.api_key_env),
            })?;
        Ok(Self::new_with_key(config, api_key, retry))
    }

    /// Create a new embedder with an explicitly provided API key.
    pub fn new_with_key(config: &EmbeddingConfig, api_key: String, retry: RetryConfig) -> Self {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model: config.model.clone(),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
            retry,
        }
    }

    /// Build the JSON request body for one embeddings call.
    fn build_request_body(&self, inputs: &[String], input_type: &str) -> Value {
        serde_json::json!({
            "input": inputs,
            "model": self.model,
            "input_type": input_type,
        })
    }

    /// Parse an embeddings response, restoring input order via the `index` field.
    fn parse_response(body: &Value, expected: usize) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let data = body["data"]
            .as_array()
            .ok_or_else(|| EmbeddingError::ResponseParse {
                message: "Missing 'data' array in response".to_string(),
            })?;

        let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
        for entry in data {
            let index = entry["index"].as_u64().unwrap_or(indexed.len() as u64) as usize;
            let embedding = entry["embedding"]
                .as_array()
                .ok_or_else(|| EmbeddingError::ResponseParse {
                    message: "Missing 'embedding' array in response entry".to_string(),
                })?
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect();
            indexed.push((index, embedding));
        }
        indexed.sort_by_key(|(index, _)| *index);

        let embeddings: Vec<Vec<f32>> = indexed.into_iter().map(|(_, e)| e).collect();
        if embeddings.len() != expected {
            return Err(EmbeddingError::ResponseParse {
                message: format!(
                    "Expected {} embeddings, got {}",
                    expected,
                    embeddings.len()
                ),
            });
        }
        Ok(embeddings)
    }

    /// Map an HTTP status code to the appropriate `EmbeddingError`.
    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> EmbeddingError {
        match status.as_u16() {
            401 | 403 => EmbeddingError::AuthFailed {
                provider: "voyage".to_string(),
            },
            429 => {
                let retry_after = serde_json::from_str::<Value>(body_text)
                    .ok()
                    .and_then(|v| v["retry_after_secs"].as_u64())
                    .unwrap_or(30);
                EmbeddingError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => EmbeddingError::ApiRequest {
                message: format!("HTTP {} from Voyage API: {}", status, body_text),
            },
        }
    }

    /// Issue one embeddings request for a single batch.
    async fn embed_batch(
        &self,
        inputs: &[String],
        input_type: &str,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if inputs.len() > API_MAX_BATCH {
            return Err(EmbeddingError::BatchTooLarge {
                size: inputs.len(),
                limit: API_MAX_BATCH,
            });
        }
        let body = self.build_request_body(inputs, input_type);
        let url = format!("{}/embeddings", self.base_url);

        debug!(
            model = self.model.as_str(),
            count = inputs.len(),
            input_type,
            "Sending embeddings request"
        );

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    EmbeddingError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    EmbeddingError::ApiRequest {
                        message: format!("Request to Voyage API failed: {}", e),
                    }
                }
            })?;

        let status = response.status();
        let body_text = response
            .text()
            .await
            .map_err(|e| EmbeddingError::ResponseParse {
                message: format!("Failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| EmbeddingError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;

        let embeddings = Self::parse_response(&response_json, inputs.len())?;
        for embedding in &embeddings {
            if embedding.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: embedding.len(),
                });
            }
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for VoyageEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        // One request at a time; each batch retried independently.
        for batch in texts.chunks(self.batch_size) {
            let batch_embeddings =
                with_retry(&self.retry, || self.embed_batch(batch, "document")).await?;
            embeddings.extend(batch_embeddings);
        }
        Ok(embeddings)
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let inputs = [text.to_string()];
        let mut embeddings =
            with_retry(&self.retry, || self.embed_batch(&inputs, "query")).await?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::ResponseParse {
                message: "Empty embeddings response for query".to_string(),
            })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "voyage"
    }
}

/// Deterministic local embedder: term-frequency hashing with L2 normalization.
///
/// Not a model — same text always maps to the same vector, and vectors carry
/// no semantics beyond shared-term overlap. Suitable for offline runs and
/// unit tests only.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed a single text synchronously.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = term_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// djb2-style string hash used to bucket terms into dimensions.
fn term_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_one(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "hash"
    }
}

/// Instantiate the embedder named in `config.provider`.
pub fn create_embedder(
    config: &EmbeddingConfig,
    retry: &RetryConfig,
) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "voyage" => Ok(Arc::new(VoyageEmbedder::new(config, retry.clone())?)),
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dimensions))),
        other => Err(EmbeddingError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_config() -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "voyage".into(),
            model: "voyage-3".into(),
            api_key_env: "UNUSED".into(),
            base_url: None,
            dimensions: 4,
            batch_size: 2,
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

    #[test]
    fn test_build_request_body() {
        let embedder =
            VoyageEmbedder::new_with_key(&test_config(), "pa-test".to_string(), no_retry());
        let body =
            embedder.build_request_body(&["alpha".to_string(), "beta".to_string()], "document");
        assert_eq!(body["model"], "voyage-3");
        assert_eq!(body["input_type"], "document");
        assert_eq!(body["input"][0], "alpha");
        assert_eq!(body["input"][1], "beta");
    }

    #[test]
    fn test_parse_response_restores_order() {
        let body = serde_json::json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.5, 0.5]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0]}
            ],
            "model": "voyage-3",
            "usage": {"total_tokens": 8}
        });
        let embeddings = VoyageEmbedder::parse_response(&body, 2).unwrap();
        assert_eq!(embeddings[0], vec![1.0, 0.0]);
        assert_eq!(embeddings[1], vec![0.5, 0.5]);
    }

    #[test]
    fn test_parse_response_count_mismatch_is_error() {
        let body = serde_json::json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        });
        let err = VoyageEmbedder::parse_response(&body, 2).unwrap_err();
        assert!(matches!(err, EmbeddingError::ResponseParse { .. }));
    }

    #[test]
    fn test_parse_response_missing_data_is_error() {
        let body = serde_json::json!({"model": "voyage-3"});
        let err = VoyageEmbedder::parse_response(&body, 1).unwrap_err();
        assert!(matches!(err, EmbeddingError::ResponseParse { .. }));
    }

    #[test]
    fn test_http_error_mapping() {
        let err = VoyageEmbedder::map_http_error(reqwest::StatusCode::UNAUTHORIZED, "{}");
        assert!(matches!(err, EmbeddingError::AuthFailed { .. }));

        let err = VoyageEmbedder::map_http_error(
            reqwest::StatusCode::TOO_MANY_REQUESTS,
            r#"{"retry_after_secs": 12}"#,
        );
        match err {
            EmbeddingError::RateLimited { retry_after_secs } => assert_eq!(retry_after_secs, 12),
            other => panic!("Expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(16);
        let a = embedder.embed_one("the quick brown fox");
        let b = embedder.embed_one("the quick brown fox");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_empty_text_is_zero_vector() {
        let embedder = HashEmbedder::new(8);
        let v = embedder.embed_one("   ");
        assert_eq!(v, vec![0.0; 8]);
    }

    #[tokio::test]
    async fn test_hash_embedder_shared_terms_score_higher() {
        let embedder = HashEmbedder::new(64);
        let docs = vec![
            "rust is a systems programming language".to_string(),
            "bananas are yellow fruit".to_string(),
        ];
        let doc_vectors = embedder.embed_documents(&docs).await.unwrap();
        let query = embedder.embed_query("rust programming").await.unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() };
        assert!(dot(&query, &doc_vectors[0]) > dot(&query, &doc_vectors[1]));
    }

    #[test]
    fn test_create_embedder_unknown_provider() {
        let mut config = test_config();
        config.provider = "word2vec".into();
        let err = match create_embedder(&config, &RetryConfig::default()) {
            Ok(_) => panic!("Expected an error for unknown provider"),
            Err(e) => e,
        };
        assert!(matches!(err, EmbeddingError::UnsupportedProvider { .. }));
    }

    #[tokio::test]
    async fn test_embed_documents_batches_sequentially() {
        let mut server = mockito::Server::new_async().await;
        // batch_size = 2, three inputs -> two requests.
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer pa-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "input": ["a", "b"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "data": [
                        {"index": 0, "embedding": [1.0, 0.0, 0.0, 0.0]},
                        {"index": 1, "embedding": [0.0, 1.0, 0.0, 0.0]}
                    ],
                    "model": "voyage-3",
                    "usage": {"total_tokens": 6}
                }"#,
            )
            .expect(1)
            .create_async()
            .await;
        let mock_tail = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer pa-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "input": ["c"]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "data": [{"index": 0, "embedding": [0.0, 0.0, 1.0, 0.0]}],
                    "model": "voyage-3",
                    "usage": {"total_tokens": 3}
                }"#,
            )
            .expect(1)
            .create_async()
            .await;

        let mut config = test_config();
        config.base_url = Some(server.url());
        let embedder = VoyageEmbedder::new_with_key(&config, "pa-test".to_string(), no_retry());

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let embeddings = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(embeddings.len(), 3);
        assert_eq!(embeddings[2], vec![0.0, 0.0, 1.0, 0.0]);

        mock.assert_async().await;
        mock_tail.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_batch_over_api_limit_is_rejected() {
        let mut config = test_config();
        config.batch_size = 200;
        let embedder = VoyageEmbedder::new_with_key(&config, "pa-test".to_string(), no_retry());

        let texts: Vec<String> = (0..150).map(|i| format!("text {}", i)).collect();
        let err = embedder.embed_documents(&texts).await.unwrap_err();
        match err {
            EmbeddingError::BatchTooLarge { size, limit } => {
                assert_eq!(size, 150);
                assert_eq!(limit, 128);
            }
            other => panic!("Expected BatchTooLarge, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_embed_query_wrong_dimensions_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "data": [{"index": 0, "embedding": [0.1, 0.2]}],
                    "model": "voyage-3",
                    "usage": {"total_tokens": 2}
                }"#,
            )
            .create_async()
            .await;

        let mut config = test_config();
        config.base_url = Some(server.url());
        let embedder = VoyageEmbedder::new_with_key(&config, "pa-test".to_string(), no_retry());

        let err = embedder.embed_query("short vector").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::DimensionMismatch { expected: 4, actual: 2 }));
    }

    #[tokio::test]
    async fn test_embed_query_uses_query_input_type() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "input_type": "query"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "data": [{"index": 0, "embedding": [0.1, 0.2, 0.3, 0.4]}],
                    "model": "voyage-3",
                    "usage": {"total_tokens": 2}
                }"#,
            )
            .create_async()
            .await;

        let mut config = test_config();
        config.base_url = Some(server.url());
        let embedder = VoyageEmbedder::new_with_key(&config, "pa-test".to_string(), no_retry());

        let embedding = embedder.embed_query("what is rag?").await.unwrap();
        assert_eq!(embedding.len(), 4);
        mock.assert_async().await;
    }
}
