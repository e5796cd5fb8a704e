//! Ollama embedding provider.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::traits::{Embedder, EmbedderConfig};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";

/// Ollama embedding provider.
pub struct OllamaEmbedder {
    client: Client,
    config: EmbedderConfig,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f64>,
}

impl OllamaEmbedder {
    pub fn new(config: EmbedderConfig) -> SentinelResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        url::Url::parse(&base_url)
            .map_err(|e| SentinelError::Configuration(format!("Invalid Ollama URL: {}", e)))?;

        let client = Client::builder()
            .build()
            .map_err(|e| SentinelError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn check_dimension(&self, embedding: Vec<f64>) -> SentinelResult<Vec<f32>> {
        if embedding.is_empty() {
            return Err(SentinelError::embedding("Ollama returned an empty embedding"));
        }
        if embedding.len() != self.config.embedding_dims {
            return Err(SentinelError::embedding(format!(
                "expected {} dimensions from {}, got {}",
                self.config.embedding_dims,
                self.config.model,
                embedding.len()
            )));
        }
        Ok(embedding.into_iter().map(|v| v as f32).collect())
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> SentinelResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| SentinelError::embedding_connection(format!("Ollama embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SentinelError::embedding(format!("Ollama embedding error ({}): {}", status, body)));
        }

        let response: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| SentinelError::embedding(format!("Failed to parse embedding response: {}", e)))?;

        debug!(model = %self.config.model, dims = response.embedding.len(), "Embedded text");
        self.check_dimension(response.embedding)
    }

    fn dimension(&self) -> usize {
        self.config.embedding_dims
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}
