//! Generation provider implementations.
//!
//! Provides the `LlmProvider` trait and a concrete implementation for the
//! Anthropic Messages API. Use `create_provider()` to instantiate the
//! provider named in the configuration.

pub mod anthropic;

pub use anthropic::AnthropicProvider;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse};
use async_trait::async_trait;
use std::sync::Arc;

/// A hosted text-generation API consumed as a black box.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Perform a single blocking completion and return the response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Return the configured model name.
    fn model_name(&self) -> &str;

    /// Return whether this provider supports tool/function calling.
    fn supports_tools(&self) -> bool;

    /// Return the context window size for this provider/model.
    fn max_context_tokens(&self) -> usize;
}

/// Instantiate the provider named in `config.provider`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        other => Err(LlmError::UnsupportedProvider {
            provider: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_unknown_name() {
        let config = LlmConfig {
            provider: "hal9000".into(),
            ..LlmConfig::default()
        };
        match create_provider(&config) {
            Err(LlmError::UnsupportedProvider { provider }) => assert_eq!(provider, "hal9000"),
            Err(other) => panic!("Expected UnsupportedProvider, got {:?}", other),
            Ok(_) => panic!("Expected an error for unknown provider"),
        }
    }

    #[test]
    fn test_create_provider_anthropic() {
        let env_var = "RAGKIT_TEST_FACTORY_KEY";
        std::env::set_var(env_var, "sk-ant-test");
        let config = LlmConfig {
            api_key_env: env_var.into(),
            ..LlmConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-sonnet-4-20250514");
        assert!(provider.supports_tools());
        std::env::remove_var(env_var);
    }
}
