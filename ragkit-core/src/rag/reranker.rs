//! Re-ranking of retrieved chunks.
//!
//! The keyword re-ranker asks the generation provider to expand the query
//! into related keywords via a forced tool call, then boosts chunks that
//! contain those keywords. A plain score-threshold re-ranker is available
//! when no LLM round-trip is wanted.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::RagError;
use crate::providers::LlmProvider;
use crate::rag::retriever::RetrievedChunk;
use crate::types::{CompletionRequest, Message, ToolChoice, ToolDefinition};

/// Reorders and filters retrieved chunks before context assembly.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError>;
}

/// Drops chunks below a similarity threshold and truncates to `top_k`.
pub struct ScoreReranker {
    min_score: f32,
}

impl ScoreReranker {
    pub fn new(min_score: f32) -> Self {
        Self { min_score }
    }
}

#[async_trait]
impl Reranker for ScoreReranker {
    async fn rerank(
        &self,
        _query: &str,
        chunks: Vec<RetrievedChunk>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let mut kept: Vec<RetrievedChunk> = chunks
            .into_iter()
            .filter(|c| c.score >= self.min_score)
            .collect();
        kept.truncate(top_k);
        Ok(kept)
    }
}

/// Boosts chunks containing LLM-expanded query keywords.
pub struct KeywordReranker {
    provider: Arc<dyn LlmProvider>,
    boost: f32,
    max_keywords: usize,
}

impl KeywordReranker {
    pub fn new(provider: Arc<dyn LlmProvider>, boost: f32) -> Self {
        Self {
            provider,
            boost,
            max_keywords: 10,
        }
    }

    fn expansion_tool(&self) -> ToolDefinition {
        ToolDefinition {
            name: "expand_query".to_string(),
            description: "Record search keywords related to the user's question.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "keywords": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Distinct keywords and short phrases related to the question"
                    }
                },
                "required": ["keywords"]
            }),
        }
    }

    /// Ask the provider for related keywords. The tool call is forced so the
    /// response shape is predictable.
    async fn expand_query(&self, query: &str) -> Result<Vec<String>, RagError> {
        let prompt = format!(
            "Generate up to {} search keywords related to this question:\n\n{}",
            self.max_keywords, query
        );
        let mut request = CompletionRequest::new(vec![Message::user(&prompt)]);
        request.tools = Some(vec![self.expansion_tool()]);
        request.tool_choice = Some(ToolChoice::Tool {
            name: "expand_query".to_string(),
        });
        request.temperature = Some(0.0);

        let response = self.provider.complete(request).await?;
        let keywords = response
            .tool_use()
            .and_then(|(_, name, input)| {
                if name != "expand_query" {
                    return None;
                }
                input["keywords"].as_array().map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.to_lowercase())
                        .filter(|s| !s.is_empty())
                        .take(self.max_keywords)
                        .collect::<Vec<_>>()
                })
            })
            .unwrap_or_default();
        Ok(keywords)
    }

    fn boosted_score(&self, chunk: &RetrievedChunk, keywords: &HashSet<String>) -> f32 {
        let text = chunk.text.to_lowercase();
        let hits = keywords.iter().filter(|k| text.contains(k.as_str())).count();
        chunk.score + self.boost * hits as f32
    }
}

#[async_trait]
impl Reranker for KeywordReranker {
    async fn rerank(
        &self,
        query: &str,
        mut chunks: Vec<RetrievedChunk>,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        if chunks.is_empty() {
            return Ok(chunks);
        }

        // A failed expansion should not sink the whole query.
        let keywords: HashSet<String> = match self.expand_query(query).await {
            Ok(kw) => kw.into_iter().collect(),
            Err(e) => {
                warn!(error = %e, "Keyword expansion failed, keeping original order");
                chunks.truncate(top_k);
                return Ok(chunks);
            }
        };
        debug!(keywords = keywords.len(), "Expanded query keywords");

        for chunk in &mut chunks {
            chunk.score = self.boosted_score(chunk, &keywords);
        }
        chunks.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        chunks.truncate(top_k);
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::types::{CompletionResponse, Content, Role, TokenUsage};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn chunk(id: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            text: text.to_string(),
            score,
            metadata: HashMap::new(),
        }
    }

    /// Provider that always answers with a fixed tool call, or fails.
    struct ScriptedProvider {
        keywords: Option<Vec<&'static str>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let Some(keywords) = &self.keywords else {
                return Err(LlmError::Connection {
                    message: "scripted failure".to_string(),
                });
            };
            Ok(CompletionResponse {
                message: Message::new(
                    Role::Assistant,
                    Content::tool_use("tu_1", "expand_query", json!({ "keywords": keywords })),
                ),
                usage: TokenUsage::default(),
                model: "scripted".to_string(),
                stop_reason: Some("tool_use".to_string()),
            })
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn supports_tools(&self) -> bool {
            true
        }

        fn max_context_tokens(&self) -> usize {
            200_000
        }
    }

    #[tokio::test]
    async fn test_score_reranker_filters_and_truncates() {
        let reranker = ScoreReranker::new(0.5);
        let chunks = vec![
            chunk("a", "alpha", 0.9),
            chunk("b", "beta", 0.6),
            chunk("c", "gamma", 0.3),
        ];
        let result = reranker.rerank("q", chunks, 1).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "a");
    }

    #[tokio::test]
    async fn test_keyword_reranker_boosts_matching_chunks() {
        let provider = Arc::new(ScriptedProvider {
            keywords: Some(vec!["ownership", "borrow checker"]),
        });
        let reranker = KeywordReranker::new(provider, 0.2);

        let chunks = vec![
            chunk("plain", "Vectors can be resized dynamically", 0.80),
            chunk("hit", "The borrow checker enforces ownership rules", 0.75),
        ];
        let result = reranker.rerank("how does rust memory work", chunks, 2).await.unwrap();
        // Two keyword hits at 0.2 boost overtake the higher base score.
        assert_eq!(result[0].id, "hit");
        assert!((result[0].score - 1.15).abs() < 1e-6);
        assert_eq!(result[1].id, "plain");
    }

    #[tokio::test]
    async fn test_keyword_reranker_falls_back_on_provider_failure() {
        let provider = Arc::new(ScriptedProvider { keywords: None });
        let reranker = KeywordReranker::new(provider, 0.2);

        let chunks = vec![
            chunk("a", "alpha", 0.9),
            chunk("b", "beta", 0.8),
            chunk("c", "gamma", 0.7),
        ];
        let result = reranker.rerank("q", chunks, 2).await.unwrap();
        // Original order preserved, truncated to top_k.
        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "a");
        assert_eq!(result[1].id, "b");
    }

    #[tokio::test]
    async fn test_keyword_reranker_empty_input_skips_expansion() {
        // Expansion would fail, but empty input short-circuits before it.
        let provider = Arc::new(ScriptedProvider { keywords: None });
        let reranker = KeywordReranker::new(provider, 0.2);
        let result = reranker.rerank("q", Vec::new(), 5).await.unwrap();
        assert!(result.is_empty());
    }
}
