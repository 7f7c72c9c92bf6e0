//! The end-to-end retrieval-augmented generation pipeline.
//!
//! Wires the embedder, vector index, re-ranker, and generation provider into
//! the embed -> store -> search -> assemble -> generate flow.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::{PipelineConfig, RagConfig};
use crate::embedding::{create_embedder, Embedder};
use crate::error::{PipelineError, RagError};
use crate::index::{create_index, IndexStats, VectorIndex, VectorRecord};
use crate::providers::{create_provider, LlmProvider};
use crate::rag::chunk::Chunk;
use crate::rag::context::ContextAssembler;
use crate::rag::ingest::{DocumentIngestor, IngestedDocument};
use crate::rag::reranker::{KeywordReranker, Reranker, ScoreReranker};
use crate::rag::retriever::{RetrievedChunk, Retriever};
use crate::retry::{with_retry, RetryConfig};
use crate::types::{CompletionRequest, Message};

/// A pointer back to the chunk an answer drew on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReference {
    pub chunk_id: String,
    pub score: f32,
    pub excerpt: String,
}

/// Measurements taken while answering a question.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalStats {
    pub chunks_retrieved: usize,
    pub chunks_used: usize,
    pub avg_score: f32,
    pub elapsed_ms: u64,
}

/// A generated answer with its supporting sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceReference>,
    pub stats: RetrievalStats,
}

/// Orchestrates ingest, retrieval, and answer generation.
pub struct RagPipeline {
    provider: Arc<dyn LlmProvider>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: PipelineConfig,
    retry: RetryConfig,
    reranker: Option<Arc<dyn Reranker>>,
}

impl RagPipeline {
    /// Assemble a pipeline from already-constructed components.
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        config: PipelineConfig,
        retry: RetryConfig,
    ) -> Self {
        let reranker: Option<Arc<dyn Reranker>> = if config.rerank {
            Some(Arc::new(KeywordReranker::new(
                provider.clone(),
                config.rerank_boost,
            )))
        } else if config.min_score > 0.0 {
            Some(Arc::new(ScoreReranker::new(config.min_score)))
        } else {
            None
        };
        Self {
            provider,
            embedder,
            index,
            config,
            retry,
            reranker,
        }
    }

    /// Build all components from configuration.
    pub fn from_config(config: &RagConfig) -> Result<Self, RagError> {
        config.validate()?;
        let provider = create_provider(&config.llm)?;
        let embedder = create_embedder(&config.embedding, &config.retry)?;
        let index = create_index(&config.index, &config.retry)?;
        Ok(Self::new(
            provider,
            embedder,
            index,
            config.pipeline.clone(),
            config.retry.clone(),
        ))
    }

    /// Ingest a file or directory: chunk, embed, and upsert.
    pub async fn ingest_path(&self, path: &Path) -> Result<Vec<IngestedDocument>, RagError> {
        let ingestor = DocumentIngestor::new(self.config.chunking.clone());
        let pairs = if path.is_dir() {
            ingestor.ingest_directory(path).await?
        } else {
            vec![ingestor.ingest_file(path).await?]
        };

        let mut documents = Vec::with_capacity(pairs.len());
        for (doc, chunks) in pairs {
            self.store_chunks(&doc, &chunks).await?;
            info!(title = doc.title.as_str(), chunks = chunks.len(), "Ingested document");
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Ingest raw texts (title, body) pairs without touching the filesystem.
    pub async fn ingest_texts(
        &self,
        texts: &[(String, String)],
    ) -> Result<Vec<IngestedDocument>, RagError> {
        let ingestor = DocumentIngestor::new(self.config.chunking.clone());
        let mut documents = Vec::with_capacity(texts.len());
        for (title, body) in texts {
            let (doc, chunks) = ingestor.ingest_text(title, body);
            self.store_chunks(&doc, &chunks).await?;
            documents.push(doc);
        }
        Ok(documents)
    }

    /// Embed chunks and upsert them into the index.
    async fn store_chunks(
        &self,
        doc: &IngestedDocument,
        chunks: &[Chunk],
    ) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| {
                let mut metadata = std::collections::HashMap::new();
                metadata.insert("text".to_string(), chunk.text.clone());
                metadata.insert("document_id".to_string(), doc.id.clone());
                metadata.insert("title".to_string(), doc.title.clone());
                metadata.insert("chunk_index".to_string(), chunk.chunk_index.to_string());
                VectorRecord {
                    id: chunk.id.clone(),
                    values,
                    metadata,
                }
            })
            .collect();

        self.index.upsert(&records).await?;
        Ok(())
    }

    /// Retrieve the most relevant chunks for a query, re-ranked if configured.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedChunk>, RagError> {
        let retriever = Retriever::new(self.embedder.clone(), self.index.clone());
        // Over-fetch when a re-ranker will narrow the list afterwards.
        let fetch_k = if self.reranker.is_some() {
            self.config.top_k * 2
        } else {
            self.config.top_k
        };
        let mut chunks = retriever.retrieve(query, fetch_k).await?;
        chunks.retain(|c| c.score >= self.config.min_score);

        if let Some(reranker) = &self.reranker {
            chunks = reranker.rerank(query, chunks, self.config.top_k).await?;
        } else {
            chunks.truncate(self.config.top_k);
        }
        Ok(chunks)
    }

    /// Answer a question over the ingested corpus.
    pub async fn answer(&self, question: &str) -> Result<RagAnswer, RagError> {
        let started = Instant::now();

        let chunks = self.retrieve(question).await?;
        if chunks.is_empty() {
            // Distinguish an empty index from a query nothing matched.
            if self.index.stats().await?.total_vectors == 0 {
                return Err(PipelineError::EmptyCorpus.into());
            }
            return Err(PipelineError::NoMatches {
                query: question.to_string(),
            }
            .into());
        }
        let chunks_retrieved = chunks.len();

        let assembler = ContextAssembler::new(self.config.max_context_tokens);
        let context = assembler.assemble(&chunks);
        debug!(
            chunks_used = context.chunks_used,
            truncated = context.truncated,
            "Assembled context"
        );

        let system = format!(
            "You are a helpful assistant. Answer the user's question using only \
             the information in the context below. If the context does not \
             contain the answer, say so.\n\n<context>\n{}\n</context>",
            context.text
        );
        let request = CompletionRequest::new(vec![
            Message::system(system),
            Message::user(question),
        ]);

        let response = with_retry(&self.retry, || {
            self.provider.complete(request.clone())
        })
        .await?;

        let used_chunks = &chunks[..context.chunks_used];
        let avg_score = if used_chunks.is_empty() {
            0.0
        } else {
            used_chunks.iter().map(|c| c.score).sum::<f32>() / used_chunks.len() as f32
        };
        let sources = used_chunks
            .iter()
            .map(|c| SourceReference {
                chunk_id: c.id.clone(),
                score: c.score,
                excerpt: excerpt(&c.text, 120),
            })
            .collect();

        Ok(RagAnswer {
            answer: response.text(),
            sources,
            stats: RetrievalStats {
                chunks_retrieved,
                chunks_used: context.chunks_used,
                avg_score,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        })
    }

    /// Index-level statistics, for status reporting.
    pub async fn stats(&self) -> Result<IndexStats, RagError> {
        Ok(self.index.stats().await?)
    }
}

/// First `max_chars` characters of `text`, on a char boundary.
fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}
