//! Channel adapter trait.

use async_trait::async_trait;

use crate::error::SentinelResult;
use crate::types::{Completion, PendingQuestion};

/// A transport that renders engine output to a person.
///
/// Answers travel the other way through `ConversationEngine::submit_answer`,
/// so adapters never hold engine state.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Adapter name, used in logs.
    fn name(&self) -> &str;

    /// Deliver a question.
    async fn on_question(&self, question: &PendingQuestion) -> SentinelResult<()>;

    /// Deliver the closing summary.
    async fn on_complete(&self, _completion: &Completion) -> SentinelResult<()> {
        Ok(())
    }

    /// Tell the person the session timed out.
    async fn on_abandoned(&self, _session_id: &str) -> SentinelResult<()> {
        Ok(())
    }
}
