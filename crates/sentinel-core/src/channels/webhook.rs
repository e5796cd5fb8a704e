//! Remote chat channel over signed webhooks.
//!
//! Each question, summary and timeout notice is POSTed as JSON to the
//! configured endpoint. With a secret set, the body is signed with
//! HMAC-SHA256 and the signature sent as `X-Sentinel-Signature: sha256=<hex>`.
//! Transient failures (network, 5xx) are retried with exponential backoff;
//! 4xx responses are not.

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::WebhookChannelConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::traits::ChannelAdapter;
use crate::types::{Completion, PendingQuestion};

/// Error type for webhook delivery
#[derive(Debug, Clone)]
enum DeliveryError {
    /// Network or 5xx - retried
    Transient(String),
    /// 4xx - not retried
    Permanent(String),
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient: {}", msg),
            Self::Permanent(msg) => write!(f, "permanent: {}", msg),
        }
    }
}

/// Body of every webhook request.
#[derive(Debug, Serialize)]
#[serde(tag = "event")]
pub enum ChannelEvent<'a> {
    #[serde(rename = "question.asked")]
    QuestionAsked(&'a PendingQuestion),
    #[serde(rename = "session.completed")]
    SessionCompleted(&'a Completion),
    #[serde(rename = "session.abandoned")]
    SessionAbandoned { session_id: &'a str },
}

impl ChannelEvent<'_> {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::QuestionAsked(_) => "question.asked",
            Self::SessionCompleted(_) => "session.completed",
            Self::SessionAbandoned { .. } => "session.abandoned",
        }
    }
}

/// Outbound half of a remote chat transport.
pub struct WebhookChannel {
    client: Client,
    config: WebhookChannelConfig,
}

impl WebhookChannel {
    pub fn new(config: WebhookChannelConfig) -> SentinelResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SentinelError::Configuration(format!("webhook client: {}", e)))?;
        Ok(Self { client, config })
    }

    async fn deliver(&self, event: &ChannelEvent<'_>) -> SentinelResult<()> {
        let event_type = event.event_type();
        let payload = serde_json::to_string(event)?;
        let signature = self.config.secret.as_deref().map(|s| sign_payload(&payload, s));

        let deliver_once = || async {
            let mut request = self
                .client
                .post(&self.config.url)
                .header("Content-Type", "application/json")
                .header("X-Sentinel-Event", event_type)
                .header("X-Sentinel-Delivery", uuid::Uuid::new_v4().to_string());
            if let Some(signature) = &signature {
                request = request.header("X-Sentinel-Signature", signature);
            }

            let response = request
                .body(payload.clone())
                .send()
                .await
                .map_err(|e| DeliveryError::Transient(format!("network error: {}", e)))?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else if status.is_server_error() {
                Err(DeliveryError::Transient(format!("server error: {}", status)))
            } else {
                let body = response.text().await.unwrap_or_default();
                Err(DeliveryError::Permanent(format!("client error {}: {}", status, body)))
            }
        };

        deliver_once
            .retry(
                ExponentialBuilder::default()
                    .with_max_times(self.config.max_retries)
                    .with_min_delay(Duration::from_millis(200))
                    .with_max_delay(Duration::from_secs(5)),
            )
            .when(|e| matches!(e, DeliveryError::Transient(_)))
            .notify(|err, dur| {
                warn!(url = %self.config.url, error = %err, retry_in = ?dur, "Webhook delivery failed, retrying");
            })
            .await
            .map_err(|e| SentinelError::api(format!("webhook {} to {}: {}", event_type, self.config.url, e)))?;

        debug!(url = %self.config.url, event = event_type, "Webhook delivered");
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn on_question(&self, question: &PendingQuestion) -> SentinelResult<()> {
        self.deliver(&ChannelEvent::QuestionAsked(question)).await
    }

    async fn on_complete(&self, completion: &Completion) -> SentinelResult<()> {
        self.deliver(&ChannelEvent::SessionCompleted(completion)).await
    }

    async fn on_abandoned(&self, session_id: &str) -> SentinelResult<()> {
        self.deliver(&ChannelEvent::SessionAbandoned { session_id }).await
    }
}

fn hmac_hex(payload: &[u8], secret: &str) -> String {
    let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// `sha256=<hex>` signature of a payload.
pub fn sign_payload(payload: &str, secret: &str) -> String {
    format!("sha256={}", hmac_hex(payload.as_bytes(), secret))
}

/// Verify a signature produced by [`sign_payload`]. Used for inbound
/// answers from the remote transport.
pub fn verify_signature(payload: &[u8], secret: &str, signature: &str) -> bool {
    let expected = format!("sha256={}", hmac_hex(payload, secret));
    constant_time_eq(expected.as_bytes(), signature.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
