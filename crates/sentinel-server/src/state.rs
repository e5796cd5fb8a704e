//! Server state management.

use std::sync::Arc;

use tokio::sync::Notify;

use sentinel_core::config::ChatConfig;
use sentinel_core::conversation::{ChatService, ConversationEngine};
use sentinel_core::memory::MemoryStore;
use sentinel_core::reasoning::ReasoningGateway;
use sentinel_core::traits::Embedder;

use crate::factory::create_chat;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ConversationEngine>,
    pub chat: Arc<ChatService>,
    /// Notified to force an immediate heartbeat tick.
    pub wake: Arc<Notify>,
    /// Shared secret for signed inbound answers. Inbound webhooks are
    /// rejected when unset.
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// State with default chat settings over the engine's backends.
    pub fn new(engine: Arc<ConversationEngine>, wake: Arc<Notify>) -> Self {
        Self {
            chat: create_chat(&ChatConfig::default(), &engine),
            engine,
            wake,
            webhook_secret: None,
        }
    }

    pub fn with_chat(mut self, chat: Arc<ChatService>) -> Self {
        self.chat = chat;
        self
    }

    pub fn with_webhook_secret(mut self, secret: Option<String>) -> Self {
        self.webhook_secret = secret.filter(|s| !s.is_empty());
        self
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        self.engine.store()
    }

    pub fn gateway(&self) -> &Arc<ReasoningGateway> {
        self.engine.gateway()
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.engine.embedder()
    }
}
