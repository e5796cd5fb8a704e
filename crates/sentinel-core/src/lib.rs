//! sentinel-core - Core library for the Sentinel presence assistant.
//!
//! Samples a detector on a heartbeat, debounces presence through a temporal
//! filter, and walks whoever was seen through a short safety check-in.
//! Answers, summaries and presence events are kept in a local SQLite store.
//!
//! # Example
//!
//! ```ignore
//! use sentinel_core::{ConversationEngine, SentinelConfig, SentinelRuntime, SqliteMemoryStore};
//!
//! let config = SentinelConfig::from_env();
//! let store = Arc::new(SqliteMemoryStore::new(&config.store.db_path)?);
//! let engine = Arc::new(ConversationEngine::new(&config.conversation, store, gateway)?);
//! let mut runtime = SentinelRuntime::new(config, engine, detector);
//! runtime.start().await?;
//! ```

pub mod channels;
pub mod clock;
pub mod config;
pub mod conversation;
pub mod detection;
pub mod error;
pub mod heartbeat;
pub mod memory;
pub mod reasoning;
pub mod runtime;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use config::{
    BackendConfig, ChatConfig, DetectionConfig, HeartbeatConfig, LlmProvider, LlmProviderConfig, SentinelConfig,
};
pub use conversation::{
    AskCondition, ChatReply, ChatService, ConversationEngine, QuestionKind, QuestionPlan, QuestionSpec,
};
pub use detection::{CommandDetector, DetectionFilter};
pub use error::{ErrorCode, SentinelError, SentinelResult};
pub use heartbeat::{HeartbeatScheduler, TickOutcome};
pub use memory::{MemoryStore, PruneStats, SqliteMemoryStore};
pub use reasoning::{ReasoningBackend, ReasoningGateway, ReasoningRequest, ReasoningResponse};
pub use runtime::SentinelRuntime;
pub use traits::{ChannelAdapter, Detector, Embedder, EmbedderConfig, GenerationOptions, Llm, LlmConfig, LlmResponse};
pub use types::{
    Completion, ConversationSession, DetectionSample, Message, MessageRole, NextStep, PendingQuestion,
    PresenceEvent, SessionState, StartedSession, Turn, TurnRole,
};
