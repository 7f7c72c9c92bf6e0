//! Configuration system for ragkit.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment. Configuration is loaded from
//! `~/.config/ragkit/config.toml` and/or `.ragkit/config.toml` in the
//! workspace directory; environment variables use the `RAGKIT_` prefix with
//! `__` as the section separator (e.g. `RAGKIT_LLM__MODEL`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;
use crate::rag::chunk::ChunkingStrategy;
use crate::retry::RetryConfig;

/// Top-level configuration for ragkit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub pipeline: PipelineConfig,
    pub retry: RetryConfig,
}

impl RagConfig {
    /// Validate cross-section consistency before any client is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.index.provider == "pinecone" && self.index.host.is_empty() {
            return Err(ConfigError::MissingField {
                field: "index.host".into(),
            });
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                message: "embedding.dimensions must be non-zero".into(),
            });
        }
        if self.embedding.dimensions != self.index.dimensions {
            return Err(ConfigError::Invalid {
                message: format!(
                    "embedding.dimensions ({}) does not match index.dimensions ({})",
                    self.embedding.dimensions, self.index.dimensions
                ),
            });
        }
        if self.pipeline.top_k == 0 {
            return Err(ConfigError::Invalid {
                message: "pipeline.top_k must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Configuration for the generation provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "anthropic".
    pub provider: String,
    /// Model identifier (e.g. "claude-sonnet-4-20250514").
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Maximum tokens to generate in a response.
    pub max_tokens: usize,
    /// Default temperature for generation.
    pub temperature: f32,
    /// Context window size for the model.
    pub context_window: usize,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
            context_window: 200_000,
            timeout_secs: 120,
        }
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "voyage" or "hash" (local, offline/test).
    pub provider: String,
    /// Embedding model identifier.
    pub model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Embedding dimensionality.
    pub dimensions: usize,
    /// Maximum inputs per embedding request.
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "voyage".into(),
            model: "voyage-3".into(),
            api_key_env: "VOYAGE_API_KEY".into(),
            base_url: None,
            dimensions: 1024,
            batch_size: 32,
        }
    }
}

/// Configuration for the vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Provider name: "pinecone" or "memory" (local, offline/test).
    pub provider: String,
    /// Index host, e.g. "my-index-abc123.svc.us-east-1.pinecone.io".
    pub host: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Optional namespace applied to all upserts and queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Maximum records per upsert request.
    pub upsert_batch_size: usize,
    /// Vector dimensionality the index was created with.
    pub dimensions: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "pinecone".into(),
            host: String::new(),
            api_key_env: "PINECONE_API_KEY".into(),
            namespace: None,
            upsert_batch_size: 100,
            dimensions: 1024,
        }
    }
}

/// Configuration for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Number of nearest neighbors to retrieve per query.
    pub top_k: usize,
    /// Whether to re-rank retrieved chunks via LLM keyword expansion.
    pub rerank: bool,
    /// Score boost per distinct keyword hit during re-ranking.
    pub rerank_boost: f32,
    /// Matches below this similarity score are dropped.
    pub min_score: f32,
    /// Token budget for the assembled context.
    pub max_context_tokens: usize,
    /// Chunking strategy applied at ingest time.
    pub chunking: ChunkingStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            rerank: true,
            rerank_boost: 0.1,
            min_score: 0.0,
            max_context_tokens: 2000,
            chunking: ChunkingStrategy::default(),
        }
    }
}

/// Load configuration from all layers.
///
/// Layering (later wins): defaults -> `~/.config/ragkit/config.toml` ->
/// `<workspace>/.ragkit/config.toml` -> `RAGKIT_*` environment variables ->
/// explicit overrides.
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&RagConfig>,
) -> Result<RagConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));

    // User-level config
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "ragkit", "ragkit") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    // Workspace-level config
    if let Some(ws) = workspace {
        let ws_config = ws.join(".ragkit").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // Environment variables (RAGKIT_LLM__MODEL, RAGKIT_INDEX__HOST, etc.)
    figment = figment.merge(Env::prefixed("RAGKIT_").split("__"));

    // Explicit overrides
    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Check whether any ragkit configuration file exists (user- or workspace-level).
pub fn config_exists(workspace: Option<&Path>) -> bool {
    if let Some(config_dir) = directories::ProjectDirs::from("dev", "ragkit", "ragkit") {
        if config_dir.config_dir().join("config.toml").exists() {
            return true;
        }
    }
    if let Some(ws) = workspace {
        if ws.join(".ragkit").join("config.toml").exists() {
            return true;
        }
    }
    false
}

/// Render the default configuration as a TOML document (used by `config init`).
pub fn default_config_toml() -> String {
    toml::to_string_pretty(&RagConfig::default())
        .unwrap_or_else(|_| String::from("# failed to render default configuration\n"))
}
