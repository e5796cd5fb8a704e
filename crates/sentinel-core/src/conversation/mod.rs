//! Scripted question-and-answer sessions, plus free-form chat between them.

mod chat;
mod engine;
mod questions;

pub use chat::{ChatReply, ChatService};
pub use engine::ConversationEngine;
pub use questions::{default_questions, AskCondition, QuestionKind, QuestionPlan, QuestionSpec};

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::traits::Embedder;

const EMBED_TIMEOUT: Duration = Duration::from_secs(10);

/// Embed a turn's text. Failures and timeouts store the turn without a vector.
async fn embed_or_none(embedder: Option<&Arc<dyn Embedder>>, text: &str) -> Option<Vec<f32>> {
    let embedder = embedder?;
    match tokio::time::timeout(EMBED_TIMEOUT, embedder.embed(text)).await {
        Ok(Ok(vector)) => Some(vector),
        Ok(Err(e)) => {
            warn!(error = %e, "Storing turn without embedding");
            None
        }
        Err(_) => {
            warn!("Embedding timed out, storing turn without it");
            None
        }
    }
}
