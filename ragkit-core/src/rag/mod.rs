//! Retrieval-augmented generation.
//!
//! Documents flow through `ingest` (chunking), get embedded and stored in a
//! vector index, and are pulled back out through `retriever`, optionally
//! re-ordered by a `reranker`, assembled into a prompt by `context`, and
//! handed to the generation provider by `pipeline`.

pub mod chunk;
pub mod context;
pub mod ingest;
pub mod pipeline;
pub mod reranker;
pub mod retriever;

pub use chunk::{chunk_text, Chunk, ChunkingStrategy};
pub use context::{AssembledContext, ContextAssembler};
pub use ingest::{DocumentIngestor, IngestedDocument};
pub use pipeline::{RagAnswer, RagPipeline, RetrievalStats, SourceReference};
pub use reranker::{KeywordReranker, Reranker, ScoreReranker};
pub use retriever::{RetrievedChunk, Retriever};
