//! Wiring a runtime from configuration.

use std::sync::Arc;

use tracing::{info, warn};

use sentinel_core::channels::WebhookChannel;
use sentinel_core::config::{ChatConfig, SentinelConfig};
use sentinel_core::conversation::{ChatService, ConversationEngine};
use sentinel_core::detection::CommandDetector;
use sentinel_core::error::SentinelResult;
use sentinel_core::memory::{MemoryStore, SqliteMemoryStore};
use sentinel_core::runtime::SentinelRuntime;
use sentinel_core::traits::Detector;

use sentinel_embeddings::EmbedderFactory;
use sentinel_llm::LlmFactory;

/// Open the store and build the conversation engine with its outbound channels.
pub fn create_engine(config: &SentinelConfig) -> SentinelResult<Arc<ConversationEngine>> {
    info!(path = %config.store.db_path.display(), "Opening memory store");
    let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::new(&config.store.db_path)?);
    let gateway = Arc::new(LlmFactory::gateway(&config.reasoning)?);

    let mut engine = ConversationEngine::new(&config.conversation, store, gateway)?;

    if let Some(embedder_config) = &config.embedder {
        match EmbedderFactory::from_config(embedder_config) {
            Ok(embedder) => {
                info!(model = embedder.model_name(), dims = embedder.dimension(), "Embedder ready");
                engine = engine.with_embedder(embedder);
            }
            Err(e) => warn!(error = %e, "Embedder unavailable, turns will be stored without vectors"),
        }
    }

    if let Some(webhook) = &config.channels.webhook {
        engine = engine.with_channel(Arc::new(WebhookChannel::new(webhook.clone())?));
    }

    Ok(Arc::new(engine))
}

/// Chat over the engine's gateway, store and embedder.
pub fn create_chat(config: &ChatConfig, engine: &ConversationEngine) -> Arc<ChatService> {
    let chat = ChatService::new(config, engine.gateway().clone(), engine.store().clone())
        .with_embedder(engine.embedder().cloned());
    Arc::new(chat)
}

/// Build the full runtime: engine, detector and background tasks.
pub fn create_runtime(config: SentinelConfig) -> SentinelResult<SentinelRuntime> {
    config.validate()?;
    let engine = create_engine(&config)?;
    let detector: Arc<dyn Detector> = Arc::new(CommandDetector::new(
        config.detector.clone(),
        config.detection.target_label.clone(),
    ));
    Ok(SentinelRuntime::new(config, engine, detector))
}
