//! sentinel-llm - Reasoning backends for sentinel.
//!
//! # Supported Providers
//!
//! - **Ollama** - on-device models over the local HTTP API
//! - **Anthropic** - Claude models over the Messages API
//!
//! # Example
//!
//! ```ignore
//! use sentinel_llm::LlmFactory;
//!
//! let gateway = LlmFactory::gateway(&config.reasoning)?;
//! let reply = gateway.generate(&ReasoningRequest::new("Say hello")).await?;
//! ```

mod anthropic;
mod factory;
mod ollama;

pub use anthropic::AnthropicLlm;
pub use factory::LlmFactory;
pub use ollama::OllamaLlm;

// Re-export core types for convenience
pub use sentinel_core::config::LlmProvider;
pub use sentinel_core::traits::{GenerationOptions, Llm, LlmConfig, LlmResponse};
