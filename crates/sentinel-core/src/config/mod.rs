//! Configuration system for sentinel.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::conversation::{default_questions, QuestionPlan, QuestionSpec};
use crate::error::{SentinelError, SentinelResult};
use crate::traits::{EmbedderConfig, EmbedderProvider, LlmConfig};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    Ollama,
    Anthropic,
}

/// Provider configuration with type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    /// Provider type.
    pub provider: LlmProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: LlmConfig,
}

/// One entry in the reasoning backend order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(flatten)]
    pub llm: LlmProviderConfig,
    /// Budget for a single call to this backend.
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_timeout_secs() -> u64 {
    30
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// On-device Ollama backend.
    pub fn ollama(model: impl Into<String>) -> Self {
        Self {
            llm: LlmProviderConfig {
                provider: LlmProvider::Ollama,
                config: LlmConfig {
                    model: model.into(),
                    base_url: Some("http://127.0.0.1:11434".to_string()),
                    ..Default::default()
                },
            },
            timeout_secs: default_backend_timeout_secs(),
        }
    }

    /// Remote Anthropic backend. The key is read from `ANTHROPIC_API_KEY` when not set here.
    pub fn anthropic(model: impl Into<String>) -> Self {
        Self {
            llm: LlmProviderConfig {
                provider: LlmProvider::Anthropic,
                config: LlmConfig {
                    model: model.into(),
                    ..Default::default()
                },
            },
            timeout_secs: default_backend_timeout_secs(),
        }
    }
}

/// Reasoning gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Backends in the order they are tried.
    pub backends: Vec<BackendConfig>,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                BackendConfig::ollama("qwen2.5:3b"),
                BackendConfig::anthropic("claude-3-haiku-20240307"),
            ],
        }
    }
}

/// Embedder provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmbedderProviderConfig {
    /// Provider type.
    pub provider: EmbedderProvider,
    /// Provider-specific configuration.
    #[serde(flatten)]
    pub config: EmbedderConfig,
}

/// Heartbeat timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    pub detector_timeout_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            detector_timeout_secs: 30,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn detector_timeout(&self) -> Duration {
        Duration::from_secs(self.detector_timeout_secs)
    }
}

/// Detection filter policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Minimum confidence for a frame to count as positive.
    pub confidence_threshold: f32,
    /// Consecutive positive frames required to trigger.
    pub temporal_frames: usize,
    pub target_label: String,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.85,
            temporal_frames: 3,
            target_label: "person".to_string(),
        }
    }
}

/// External detector command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    /// JSON written to the command's stdin on every run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        let script = sentinel_home().join("skills").join("vision_skill.py");
        Self {
            program: "python3".to_string(),
            args: vec![script.to_string_lossy().into_owned()],
            env: HashMap::new(),
            input: None,
        }
    }
}

/// Question workflow configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub questions: Vec<QuestionSpec>,
    /// A session with no accepted answer for this long is abandoned.
    pub inactivity_timeout_secs: u64,
    /// Let the reasoning gateway phrase each follow-up question.
    pub rephrase_questions: bool,
    pub system_prompt: String,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            questions: default_questions(),
            inactivity_timeout_secs: 300,
            rephrase_questions: false,
            system_prompt: "You are Sentinel, a safety monitoring assistant. Ask clear questions and record responses."
                .to_string(),
        }
    }
}

impl ConversationConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }
}

/// Free-form chat outside question sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub system_prompt: String,
    /// Messages of rolling context sent with each chat request.
    pub history_messages: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are Sentinel, a helpful AI assistant. Keep responses concise and friendly.".to_string(),
            history_messages: 10,
        }
    }
}

/// Memory store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// Presence events and finished sessions older than this are pruned.
    pub retention_days: u32,
    /// Cron expression for the retention job (seconds field first).
    pub prune_schedule: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: sentinel_home().join("sentinel_memory.db"),
            retention_days: 7,
            prune_schedule: "0 15 3 * * *".to_string(),
        }
    }
}

/// Outbound webhook channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookChannelConfig {
    pub url: String,
    /// HMAC-SHA256 signing secret.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_webhook_retries")]
    pub max_retries: usize,
}

fn default_webhook_timeout_secs() -> u64 {
    10
}

fn default_webhook_retries() -> usize {
    3
}

/// Channel adapters to register.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChannelsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookChannelConfig>,
    /// Interactive console on stdin/stdout.
    pub console: bool,
}

/// Main sentinel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SentinelConfig {
    pub heartbeat: HeartbeatConfig,
    pub detection: DetectionConfig,
    pub detector: DetectorConfig,
    pub conversation: ConversationConfig,
    pub chat: ChatConfig,
    pub reasoning: ReasoningConfig,
    /// Embeddings for similarity search. Turns are stored without vectors when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedder: Option<EmbedderProviderConfig>,
    pub store: StoreConfig,
    pub channels: ChannelsConfig,
}

/// `~/.sentinel`, or `.sentinel` when there is no home directory.
pub fn sentinel_home() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".sentinel"))
        .unwrap_or_else(|| PathBuf::from(".sentinel"))
}

impl SentinelConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<Path>) -> SentinelResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => toml::from_str(&content).map_err(|e| SentinelError::Configuration(e.to_string())),
            Some("json") => serde_json::from_str(&content).map_err(|e| SentinelError::Configuration(e.to_string())),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| SentinelError::Configuration(e.to_string()))
            }
            _ => Err(SentinelError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `SENTINEL_*` environment variables onto this configuration.
    pub fn apply_env(&mut self) {
        fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
            std::env::var(name).ok().and_then(|v| v.parse().ok())
        }

        if let Some(secs) = parsed("SENTINEL_HEARTBEAT_SECS") {
            self.heartbeat.interval_secs = secs;
        }
        if let Some(threshold) = parsed("SENTINEL_CONFIDENCE_THRESHOLD") {
            self.detection.confidence_threshold = threshold;
        }
        if let Some(frames) = parsed("SENTINEL_TEMPORAL_FRAMES") {
            self.detection.temporal_frames = frames;
        }
        if let Some(secs) = parsed("SENTINEL_INACTIVITY_SECS") {
            self.conversation.inactivity_timeout_secs = secs;
        }
        if let Ok(path) = std::env::var("SENTINEL_DB_PATH") {
            self.store.db_path = PathBuf::from(path);
        }
        if let Some(days) = parsed("SENTINEL_RETENTION_DAYS") {
            self.store.retention_days = days;
        }
        if let Ok(model) = std::env::var("SENTINEL_EMBEDDER_MODEL") {
            let embedder = self.embedder.get_or_insert_with(EmbedderProviderConfig::default);
            embedder.config.model = model;
            if let Some(dims) = parsed("SENTINEL_EMBEDDER_DIMS") {
                embedder.config.embedding_dims = dims;
            }
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            for backend in &mut self.reasoning.backends {
                if backend.llm.provider == LlmProvider::Ollama {
                    backend.llm.config.base_url = Some(host.clone());
                }
            }
            if let Some(embedder) = &mut self.embedder {
                if embedder.provider == EmbedderProvider::Ollama {
                    embedder.config.base_url = Some(host);
                }
            }
        }
        if let Ok(model) = std::env::var("SENTINEL_LOCAL_MODEL") {
            for backend in &mut self.reasoning.backends {
                if backend.llm.provider == LlmProvider::Ollama {
                    backend.llm.config.model = model.clone();
                }
            }
        }
        if let Ok(url) = std::env::var("SENTINEL_WEBHOOK_URL") {
            self.channels.webhook = Some(WebhookChannelConfig {
                url,
                secret: std::env::var("SENTINEL_WEBHOOK_SECRET").ok(),
                timeout_secs: default_webhook_timeout_secs(),
                max_retries: default_webhook_retries(),
            });
        }
        if let Some(console) = parsed("SENTINEL_CONSOLE") {
            self.channels.console = console;
        }
    }

    /// Check ranges and the question list.
    pub fn validate(&self) -> SentinelResult<()> {
        if self.heartbeat.interval_secs == 0 {
            return Err(SentinelError::validation("heartbeat.interval_secs must be positive"));
        }
        if self.heartbeat.detector_timeout_secs == 0 {
            return Err(SentinelError::validation("heartbeat.detector_timeout_secs must be positive"));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            return Err(SentinelError::validation(format!(
                "detection.confidence_threshold must be within [0, 1], got {}",
                self.detection.confidence_threshold
            )));
        }
        if self.detection.temporal_frames == 0 {
            return Err(SentinelError::validation("detection.temporal_frames must be at least 1"));
        }
        if self.conversation.inactivity_timeout_secs == 0 {
            return Err(SentinelError::validation("conversation.inactivity_timeout_secs must be positive"));
        }
        if self.chat.history_messages == 0 {
            return Err(SentinelError::validation("chat.history_messages must be at least 1"));
        }
        if self.reasoning.backends.is_empty() {
            return Err(SentinelError::validation_with_suggestion(
                "no reasoning backends configured",
                "Add at least one [[reasoning.backends]] entry",
            ));
        }
        if self.reasoning.backends.iter().any(|b| b.timeout_secs == 0) {
            return Err(SentinelError::validation("reasoning backend timeout_secs must be positive"));
        }
        QuestionPlan::new(self.conversation.questions.clone())?;
        Ok(())
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> SentinelConfigBuilder {
        SentinelConfigBuilder::default()
    }
}

/// Builder for SentinelConfig.
#[derive(Default)]
pub struct SentinelConfigBuilder {
    config: SentinelConfig,
}

impl SentinelConfigBuilder {
    /// Set the heartbeat period.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat.interval_secs = interval.as_secs().max(1);
        self
    }

    /// Set detection filter policy.
    pub fn detection(mut self, config: DetectionConfig) -> Self {
        self.config.detection = config;
        self
    }

    /// Set the detector command.
    pub fn detector(mut self, config: DetectorConfig) -> Self {
        self.config.detector = config;
        self
    }

    /// Set the question list.
    pub fn questions(mut self, questions: Vec<QuestionSpec>) -> Self {
        self.config.conversation.questions = questions;
        self
    }

    /// Set the inactivity timeout.
    pub fn inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.config.conversation.inactivity_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Replace the reasoning backend order.
    pub fn backends(mut self, backends: Vec<BackendConfig>) -> Self {
        self.config.reasoning.backends = backends;
        self
    }

    /// Set embedder configuration.
    pub fn embedder(mut self, config: EmbedderProviderConfig) -> Self {
        self.config.embedder = Some(config);
        self
    }

    /// Set database path.
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.config.store.db_path = path;
        self
    }

    /// Set retention in days.
    pub fn retention_days(mut self, days: u32) -> Self {
        self.config.store.retention_days = days;
        self
    }

    /// Set the webhook channel.
    pub fn webhook(mut self, config: WebhookChannelConfig) -> Self {
        self.config.channels.webhook = Some(config);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SentinelConfig {
        self.config
    }
}
