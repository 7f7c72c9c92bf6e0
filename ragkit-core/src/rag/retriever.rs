//! Query-time retrieval: embed the query, search the index.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::embedding::Embedder;
use crate::error::RagError;
use crate::index::VectorIndex;

/// A chunk returned from the index with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

/// Embeds queries and searches the vector index.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>) -> Self {
        Self { embedder, index }
    }

    /// Return the `top_k` most similar chunks for `query`, score descending.
    ///
    /// Matches without stored text are dropped; they cannot contribute to a
    /// prompt.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, RagError> {
        let query_vector = self.embedder.embed_query(query).await?;
        let matches = self.index.query(&query_vector, top_k).await?;
        debug!(query, matches = matches.len(), "Retrieved candidates");

        let chunks = matches
            .into_iter()
            .filter_map(|m| {
                m.text().map(|t| t.to_string()).map(|text| RetrievedChunk {
                    id: m.id.clone(),
                    text,
                    score: m.score,
                    metadata: m.metadata,
                })
            })
            .collect();
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::{MemoryIndex, VectorRecord};
    use pretty_assertions::assert_eq;

    async fn seeded_retriever() -> Retriever {
        let embedder = Arc::new(HashEmbedder::new(64));
        let index = Arc::new(MemoryIndex::new());

        let texts = [
            ("rust", "Rust is a systems programming language"),
            ("cooking", "Slow roast the vegetables with olive oil"),
            ("borrow", "The borrow checker enforces ownership in Rust"),
        ];
        let mut records = Vec::new();
        for (id, text) in texts {
            let values = embedder.embed_one(text);
            let mut metadata = HashMap::new();
            metadata.insert("text".to_string(), text.to_string());
            records.push(VectorRecord {
                id: id.to_string(),
                values,
                metadata,
            });
        }
        index.upsert(&records).await.unwrap();

        Retriever::new(embedder, index)
    }

    #[tokio::test]
    async fn test_retrieve_returns_relevant_chunks_first() {
        let retriever = seeded_retriever().await;
        let chunks = retriever
            .retrieve("Rust programming language ownership", 3)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        // The cooking chunk shares no terms with the query.
        assert_ne!(chunks[0].id, "cooking");
        assert!(chunks[0].score >= chunks[1].score);
        assert!(chunks[1].score >= chunks[2].score);
    }

    #[tokio::test]
    async fn test_retrieve_respects_top_k() {
        let retriever = seeded_retriever().await;
        let chunks = retriever.retrieve("rust", 1).await.unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_retrieve_drops_matches_without_text() {
        let embedder = Arc::new(HashEmbedder::new(64));
        let index = Arc::new(MemoryIndex::new());
        index
            .upsert(&[VectorRecord {
                id: "no-text".to_string(),
                values: embedder.embed_one("orphan vector"),
                metadata: HashMap::new(),
            }])
            .await
            .unwrap();

        let retriever = Retriever::new(embedder, index);
        let chunks = retriever.retrieve("orphan vector", 5).await.unwrap();
        assert!(chunks.is_empty());
    }
}
