//! Ollama backend for on-device models.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, TokenUsage};
use sentinel_core::types::{Message, MessageRole};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "qwen2.5:3b";

/// Ollama chat client.
pub struct OllamaLlm {
    client: Client,
    config: LlmConfig,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaLlm {
    pub fn new(config: LlmConfig) -> SentinelResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let url = url::Url::parse(&base_url)
            .map_err(|e| SentinelError::Configuration(format!("Invalid Ollama URL: {}", e)))?;
        if url.host_str().is_none() {
            return Err(SentinelError::Configuration(format!("Invalid Ollama URL: {}", base_url)));
        }

        let client = Client::builder()
            .build()
            .map_err(|e| SentinelError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            client,
            config,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    fn build_request<'a>(&'a self, messages: &'a [Message], options: &GenerationOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ChatMessage {
                    role: Self::role(m.role),
                    content: &m.content,
                })
                .collect(),
            stream: false,
            options: ChatOptions {
                temperature: options.temperature.unwrap_or(self.config.temperature),
                top_p: options.top_p.unwrap_or(self.config.top_p),
                num_predict: options.max_tokens.unwrap_or(self.config.max_tokens),
            },
        }
    }
}

#[async_trait]
impl Llm for OllamaLlm {
    async fn generate(&self, messages: &[Message], options: Option<GenerationOptions>) -> SentinelResult<LlmResponse> {
        let options = options.unwrap_or_default();
        let request = self.build_request(messages, &options);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| SentinelError::llm_connection(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SentinelError::llm(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(SentinelError::llm(format!("Ollama API error ({}): {}", status, message)));
        }

        let response: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| SentinelError::llm_invalid_response(format!("Failed to parse response: {}", e)))?;

        let usage = match (response.prompt_eval_count, response.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: prompt + completion,
            }),
            _ => None,
        };

        Ok(LlmResponse {
            content: response.message.map(|m| m.content),
            usage,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn health_check(&self) -> SentinelResult<()> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| SentinelError::api(format!("Ollama unreachable: {}", e)))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SentinelError::api(format!("Ollama returned {}", response.status())))
        }
    }
}
