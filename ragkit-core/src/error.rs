//! Error types for the ragkit core library.
//!
//! Uses `thiserror` for public API error types, with one enum per external
//! service domain (generation, embedding, vector index) plus configuration
//! and pipeline errors, all folded into the top-level `RagError`.

/// Top-level error type for the ragkit core library.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the generation provider.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },

    #[error("Unsupported generation provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Errors from the embedding service.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {message}")]
    ApiRequest { message: String },

    #[error("Embedding response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for embedding provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by embedding provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Embedding provider connection failed: {message}")]
    Connection { message: String },

    #[error("Batch of {size} inputs exceeds provider limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Unsupported embedding provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Errors from the vector index service.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Index request failed: {message}")]
    ApiRequest { message: String },

    #[error("Index response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed for index provider {provider}")]
    AuthFailed { provider: String },

    #[error("Rate limited by index provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Index connection failed: {message}")]
    Connection { message: String },

    #[error("Vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid index configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Unsupported index provider: {provider}")]
    UnsupportedProvider { provider: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },
}

/// Errors from the RAG pipeline itself.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("The index is empty; ingest documents before querying")]
    EmptyCorpus,

    #[error("No matches found in the index for query: {query}")]
    NoMatches { query: String },

    #[error("Model response did not invoke the required tool '{tool}'")]
    StructuredOutputMissing { tool: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formats() {
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(
            err.to_string(),
            "Rate limited by provider, retry after 30s"
        );

        let err = IndexError::DimensionMismatch {
            expected: 1024,
            actual: 512,
        };
        assert!(err.to_string().contains("1024"));
        assert!(err.to_string().contains("512"));

        let err = PipelineError::StructuredOutputMissing {
            tool: "expand_query".into(),
        };
        assert!(err.to_string().contains("expand_query"));
    }

    #[test]
    fn test_rag_error_from_domain_errors() {
        let err: RagError = LlmError::AuthFailed {
            provider: "anthropic".into(),
        }
        .into();
        assert!(matches!(err, RagError::Llm(_)));

        let err: RagError = EmbeddingError::BatchTooLarge {
            size: 200,
            limit: 128,
        }
        .into();
        assert!(matches!(err, RagError::Embedding(_)));

        let err: RagError = PipelineError::EmptyCorpus.into();
        assert!(matches!(err, RagError::Pipeline(_)));
    }
}
