//! Free-form chat with the reasoning gateway.
//!
//! Each chat keeps a rolling window of recent messages in memory and sends it
//! as context with the next prompt. Both sides of every exchange are written
//! to the memory store under the chat id, so similarity search covers chat as
//! well as check-in answers.

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::ChatConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::memory::MemoryStore;
use crate::reasoning::{ReasoningGateway, ReasoningRequest};
use crate::traits::Embedder;
use crate::types::{Message, Turn};

/// Prefix of generated chat ids, keeping them apart from session ids.
const CHAT_ID_PREFIX: &str = "chat-";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    pub chat_id: String,
    pub reply: String,
    /// Name of the backend that answered.
    pub backend: String,
    pub fell_back: bool,
}

/// Chat front end over the gateway and the memory store.
pub struct ChatService {
    gateway: Arc<ReasoningGateway>,
    store: Arc<dyn MemoryStore>,
    embedder: Option<Arc<dyn Embedder>>,
    clock: Arc<dyn Clock>,
    system_prompt: String,
    max_history: usize,
    histories: Mutex<HashMap<String, VecDeque<Message>>>,
}

impl ChatService {
    pub fn new(config: &ChatConfig, gateway: Arc<ReasoningGateway>, store: Arc<dyn MemoryStore>) -> Self {
        Self {
            gateway,
            store,
            embedder: None,
            clock: Arc::new(SystemClock),
            system_prompt: config.system_prompt.clone(),
            max_history: config.history_messages.max(1),
            histories: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.embedder = embedder;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Send one message. Without a `chat_id` a new chat is started.
    ///
    /// History only advances when a backend answers, so a failed exchange can
    /// be retried with the same context.
    pub async fn send(&self, chat_id: Option<&str>, text: &str) -> SentinelResult<ChatReply> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SentinelError::validation("chat text is empty"));
        }
        let chat_id = match chat_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("{}{}", CHAT_ID_PREFIX, Uuid::new_v4()),
        };

        let context = self.history(&chat_id);
        let request = ReasoningRequest::new(text)
            .with_system(self.system_prompt.clone())
            .with_context(context);
        let response = self.gateway.generate(&request).await?;
        debug!(chat_id = %chat_id, backend = %response.backend, "Chat reply generated");

        self.remember(&chat_id, text, &response.text);

        let user_embedding = super::embed_or_none(self.embedder.as_ref(), text).await;
        let reply_embedding = super::embed_or_none(self.embedder.as_ref(), &response.text).await;
        let now = self.clock.now();
        let turns = [
            Turn::user(&chat_id, text, now).with_embedding(user_embedding),
            Turn::assistant(&chat_id, None, &response.text, now).with_embedding(reply_embedding),
        ];
        for turn in &turns {
            if let Err(e) = self.store.append_turn(turn) {
                warn!(chat_id = %chat_id, error = %e, "Failed to record chat turn");
            }
        }

        Ok(ChatReply {
            chat_id,
            reply: response.text,
            backend: response.backend,
            fell_back: response.fell_back,
        })
    }

    /// Drop a chat's rolling history. Returns false for an unknown chat.
    pub fn end(&self, chat_id: &str) -> bool {
        let removed = self.lock().remove(chat_id).is_some();
        if removed {
            info!(chat_id, "Chat ended");
        }
        removed
    }

    /// Context that the next message in this chat would carry, oldest first.
    pub fn history(&self, chat_id: &str) -> Vec<Message> {
        self.lock()
            .get(chat_id)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn remember(&self, chat_id: &str, text: &str, reply: &str) {
        let mut histories = self.lock();
        let history = histories.entry(chat_id.to_string()).or_default();
        history.push_back(Message::user(text));
        history.push_back(Message::assistant(reply));
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Message>>> {
        self.histories.lock().unwrap_or_else(|e| e.into_inner())
    }
}
