//! Factory for creating reasoning backends.

use std::sync::Arc;

use tracing::{info, warn};

use sentinel_core::config::{BackendConfig, LlmProvider, LlmProviderConfig, ReasoningConfig};
use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::reasoning::{ReasoningBackend, ReasoningGateway};
use sentinel_core::traits::{Llm, LlmConfig};

use crate::anthropic::AnthropicLlm;
use crate::ollama::OllamaLlm;

/// Factory for creating LLM providers.
pub struct LlmFactory;

impl LlmFactory {
    /// Create an LLM provider from the given configuration.
    pub fn create(provider: LlmProvider, config: LlmConfig) -> SentinelResult<Arc<dyn Llm>> {
        match provider {
            LlmProvider::Ollama => Ok(Arc::new(OllamaLlm::new(config)?)),
            LlmProvider::Anthropic => Ok(Arc::new(AnthropicLlm::new(config)?)),
        }
    }

    pub fn from_config(config: &LlmProviderConfig) -> SentinelResult<Arc<dyn Llm>> {
        Self::create(config.provider, config.config.clone())
    }

    /// Ollama with a specific model on the default local endpoint.
    pub fn ollama_with_model(model: impl Into<String>) -> SentinelResult<Arc<dyn Llm>> {
        let config = LlmConfig {
            model: model.into(),
            ..Default::default()
        };
        Self::create(LlmProvider::Ollama, config)
    }

    /// Anthropic with a specific model, keyed from `ANTHROPIC_API_KEY`.
    pub fn anthropic_with_model(model: impl Into<String>) -> SentinelResult<Arc<dyn Llm>> {
        let config = LlmConfig {
            model: model.into(),
            ..Default::default()
        };
        Self::create(LlmProvider::Anthropic, config)
    }

    /// One gateway backend, named `<provider>:<model>`.
    pub fn backend(config: &BackendConfig) -> SentinelResult<ReasoningBackend> {
        let llm = Self::from_config(&config.llm)?;
        let name = format!("{}:{}", provider_name(config.llm.provider), llm.model_name());
        Ok(ReasoningBackend::new(name, llm, config.timeout()))
    }

    /// Build the gateway in configured order.
    ///
    /// A backend that cannot be constructed (typically a remote one without
    /// credentials) is left out with a warning. Fails only when none remain.
    pub fn gateway(config: &ReasoningConfig) -> SentinelResult<ReasoningGateway> {
        let mut backends = Vec::with_capacity(config.backends.len());
        for backend in &config.backends {
            match Self::backend(backend) {
                Ok(built) => {
                    info!(backend = %built.name, timeout_secs = backend.timeout_secs, "Reasoning backend ready");
                    backends.push(built);
                }
                Err(e) => warn!(
                    provider = provider_name(backend.llm.provider),
                    model = %backend.llm.config.model,
                    error = %e,
                    "Skipping reasoning backend"
                ),
            }
        }

        if backends.is_empty() {
            return Err(SentinelError::Configuration(
                "no reasoning backend could be configured".to_string(),
            ));
        }
        Ok(ReasoningGateway::new(backends))
    }
}

fn provider_name(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::Ollama => "ollama",
        LlmProvider::Anthropic => "anthropic",
    }
}
