//! Factory for creating embedding providers.

use std::sync::Arc;

use sentinel_core::config::EmbedderProviderConfig;
use sentinel_core::error::SentinelResult;
use sentinel_core::traits::{Embedder, EmbedderConfig, EmbedderProvider};

use crate::ollama::OllamaEmbedder;

/// Factory for creating embedding providers.
pub struct EmbedderFactory;

impl EmbedderFactory {
    /// Create an embedder from the given configuration.
    pub fn create(provider: EmbedderProvider, config: EmbedderConfig) -> SentinelResult<Arc<dyn Embedder>> {
        match provider {
            EmbedderProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        }
    }

    pub fn from_config(config: &EmbedderProviderConfig) -> SentinelResult<Arc<dyn Embedder>> {
        Self::create(config.provider, config.config.clone())
    }

    /// Create an Ollama embedder with default configuration.
    pub fn ollama() -> SentinelResult<Arc<dyn Embedder>> {
        Self::create(EmbedderProvider::Ollama, EmbedderConfig::default())
    }

    /// Create an Ollama embedder with a specific model.
    pub fn ollama_with_model(model: impl Into<String>, dims: usize) -> SentinelResult<Arc<dyn Embedder>> {
        let config = EmbedderConfig {
            model: model.into(),
            embedding_dims: dims,
            ..Default::default()
        };
        Self::create(EmbedderProvider::Ollama, config)
    }
}
