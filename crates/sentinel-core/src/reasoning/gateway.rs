//! Ordered failover across reasoning backends.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SentinelError, SentinelResult};
use crate::traits::{GenerationOptions, Llm};
use crate::types::Message;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// One backend in the failover order.
#[derive(Clone)]
pub struct ReasoningBackend {
    pub name: String,
    pub llm: Arc<dyn Llm>,
    pub timeout: Duration,
}

impl ReasoningBackend {
    pub fn new(name: impl Into<String>, llm: Arc<dyn Llm>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            llm,
            timeout,
        }
    }
}

/// Prompt plus prior conversation.
#[derive(Debug, Clone, Default)]
pub struct ReasoningRequest {
    pub system: Option<String>,
    pub context: Vec<Message>,
    pub prompt: String,
}

impl ReasoningRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_context(mut self, context: Vec<Message>) -> Self {
        self.context = context;
        self
    }

    fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.context.len() + 2);
        if let Some(system) = &self.system {
            messages.push(Message::system(system.clone()));
        }
        messages.extend(self.context.iter().cloned());
        messages.push(Message::user(self.prompt.clone()));
        messages
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReasoningResponse {
    pub text: String,
    /// Name of the backend that answered.
    pub backend: String,
    pub model: String,
    /// True when an earlier backend in the order failed.
    pub fell_back: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendHealth {
    pub name: String,
    pub model: String,
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tries each backend in order under its own timeout.
///
/// A backend fails over on timeout, on error, or when it returns no usable
/// text. Calls are independent; no state is kept between them.
pub struct ReasoningGateway {
    backends: Vec<ReasoningBackend>,
    options: GenerationOptions,
}

impl ReasoningGateway {
    pub fn new(backends: Vec<ReasoningBackend>) -> Self {
        Self {
            backends,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn backends(&self) -> &[ReasoningBackend] {
        &self.backends
    }

    pub async fn generate(&self, request: &ReasoningRequest) -> SentinelResult<ReasoningResponse> {
        let messages = request.messages();
        let mut attempts = Vec::with_capacity(self.backends.len());

        for (position, backend) in self.backends.iter().enumerate() {
            let call = backend.llm.generate(&messages, Some(self.options.clone()));
            let failure = match tokio::time::timeout(backend.timeout, call).await {
                Ok(Ok(response)) => match response.content.as_deref().map(str::trim) {
                    Some(text) if !text.is_empty() => {
                        debug!(backend = %backend.name, model = backend.llm.model_name(), "Reasoning backend answered");
                        return Ok(ReasoningResponse {
                            text: text.to_string(),
                            backend: backend.name.clone(),
                            model: backend.llm.model_name().to_string(),
                            fell_back: position > 0,
                        });
                    }
                    _ => "empty response".to_string(),
                },
                Ok(Err(e)) => e.to_string(),
                Err(_) => SentinelError::timeout(format!("{} generate", backend.name), backend.timeout).to_string(),
            };
            warn!(backend = %backend.name, reason = %failure, "Reasoning backend failed");
            attempts.push(format!("{}: {}", backend.name, failure));
        }

        Err(SentinelError::backend_unavailable(attempts))
    }

    /// Health-check every backend.
    pub async fn health(&self) -> Vec<BackendHealth> {
        let checks = self.backends.iter().map(|backend| async move {
            let result = match tokio::time::timeout(HEALTH_TIMEOUT, backend.llm.health_check()).await {
                Ok(result) => result,
                Err(_) => Err(SentinelError::timeout("health check", HEALTH_TIMEOUT)),
            };
            BackendHealth {
                name: backend.name.clone(),
                model: backend.llm.model_name().to_string(),
                healthy: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            }
        });
        futures::future::join_all(checks).await
    }
}
