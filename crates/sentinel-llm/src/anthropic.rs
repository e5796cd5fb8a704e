//! Anthropic (Claude) backend.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse, TokenUsage};
use sentinel_core::types::{Message, MessageRole};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Anthropic Messages API client.
pub struct AnthropicLlm {
    client: Client,
    config: LlmConfig,
    api_key: SecretString,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

impl AnthropicLlm {
    /// Create a client. The key comes from the config or `ANTHROPIC_API_KEY`.
    pub fn new(config: LlmConfig) -> SentinelResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                SentinelError::Configuration(
                    "Anthropic API key not found. Set ANTHROPIC_API_KEY or provide api_key in config.".to_string(),
                )
            })?;

        let client = Client::builder()
            .build()
            .map_err(|e| SentinelError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| ANTHROPIC_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let mut config = config;
        if config.model.is_empty() {
            config.model = DEFAULT_MODEL.to_string();
        }

        Ok(Self {
            client,
            config,
            api_key: SecretString::new(api_key),
            base_url,
        })
    }

    fn build_request(&self, messages: &[Message], options: GenerationOptions) -> AnthropicRequest {
        // The Messages API takes the system prompt out of band.
        let system = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>();
        let system = (!system.is_empty()).then(|| system.join("\n\n"));

        let messages = messages
            .iter()
            .filter_map(|m| match m.role {
                MessageRole::User => Some(("user", m)),
                MessageRole::Assistant => Some(("assistant", m)),
                MessageRole::System => None,
            })
            .map(|(role, m)| AnthropicMessage {
                role,
                content: m.content.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: options.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: Some(options.temperature.unwrap_or(self.config.temperature)),
            top_p: options.top_p,
            system,
            messages,
        }
    }
}

#[async_trait]
impl Llm for AnthropicLlm {
    async fn generate(&self, messages: &[Message], options: Option<GenerationOptions>) -> SentinelResult<LlmResponse> {
        let request = self.build_request(messages, options.unwrap_or_default());

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| SentinelError::llm_connection(format!("Anthropic API request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SentinelError::llm(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(SentinelError::llm(format!("Anthropic API error ({}): {}", status, message)));
        }

        let response: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|e| SentinelError::llm_invalid_response(format!("Failed to parse response: {}", e)))?;

        let content = response
            .content
            .into_iter()
            .find(|c| c.content_type == "text")
            .and_then(|c| c.text);

        let usage = response.usage.map(|u| TokenUsage {
            prompt_tokens: u.input_tokens,
            completion_tokens: u.output_tokens,
            total_tokens: u.input_tokens + u.output_tokens,
        });

        Ok(LlmResponse { content, usage })
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn llm() -> AnthropicLlm {
        AnthropicLlm::new(LlmConfig {
            model: String::new(),
            api_key: Some("test-key".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_model_and_url() {
        let llm = llm();
        assert_eq!(llm.model_name(), DEFAULT_MODEL);
        assert_eq!(llm.base_url, ANTHROPIC_API_URL);
    }

    #[test]
    fn test_system_prompt_moved_out_of_messages() {
        let llm = llm();
        let request = llm.build_request(
            &[
                Message::system("Be brief."),
                Message::assistant("What task are you performing?"),
                Message::user("Cleaning gutters"),
            ],
            GenerationOptions {
                max_tokens: Some(64),
                ..Default::default()
            },
        );

        assert_eq!(request.system.as_deref(), Some("Be brief."));
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "assistant");
        assert_eq!(request.messages[1].role, "user");
        assert_eq!(request.max_tokens, 64);
    }

    #[test]
    fn test_blank_key_rejected() {
        let result = AnthropicLlm::new(LlmConfig {
            model: "claude-3-haiku-20240307".to_string(),
            api_key: Some("  ".to_string()),
            ..Default::default()
        });
        if std::env::var("ANTHROPIC_API_KEY").is_err() {
            assert!(matches!(result, Err(SentinelError::Configuration(_))));
        }
    }
}
