//! Conversation session state and the values the engine hands back to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{SentinelError, SentinelResult};

/// Lifecycle of a conversation session.
///
/// `Complete` and `Abandoned` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "question_index", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingAnswer(usize),
    Complete,
    Abandoned,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Abandoned)
    }

    /// Name stored in the `sessions.state` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingAnswer(_) => "awaiting_answer",
            Self::Complete => "complete",
            Self::Abandoned => "abandoned",
        }
    }

    /// Rebuild a state from its stored name and the session's question index.
    pub fn from_parts(name: &str, question_index: usize) -> SentinelResult<Self> {
        match name {
            "idle" => Ok(Self::Idle),
            "awaiting_answer" => Ok(Self::AwaitingAnswer(question_index)),
            "complete" => Ok(Self::Complete),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(SentinelError::parse(format!("unknown session state '{}'", other))),
        }
    }
}

/// A recorded answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question_id: String,
    pub question_index: usize,
    pub answer_text: String,
    pub answered_at: DateTime<Utc>,
}

/// One run through the question workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    /// Last accepted activity; drives the inactivity timeout.
    pub updated_at: DateTime<Utc>,
    pub state: SessionState,
    pub current_question_index: usize,
    pub answers: Vec<AnswerRecord>,
}

impl ConversationSession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            state: SessionState::Idle,
            current_question_index: 0,
            answers: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Answer previously recorded for a question id, if any.
    pub fn answer_for(&self, question_id: &str) -> Option<&str> {
        self.answers
            .iter()
            .find(|a| a.question_id == question_id)
            .map(|a| a.answer_text.as_str())
    }
}

/// A question waiting for an answer, as delivered to channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingQuestion {
    pub session_id: String,
    pub question_id: String,
    pub question_index: usize,
    /// 1-based position in the configured list.
    pub position: usize,
    pub total: usize,
    pub text: String,
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub session_id: String,
    pub summary: String,
    /// False when no reasoning backend answered and the summary is the literal fallback.
    pub generated: bool,
}

/// What the workflow does after an accepted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextStep {
    Ask(PendingQuestion),
    Complete(Completion),
}

impl NextStep {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete(_))
    }

    pub fn question(&self) -> Option<&PendingQuestion> {
        match self {
            Self::Ask(q) => Some(q),
            Self::Complete(_) => None,
        }
    }
}

/// Result of starting a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedSession {
    pub session_id: String,
    pub step: NextStep,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_columns() {
        let state = SessionState::AwaitingAnswer(2);
        assert_eq!(SessionState::from_parts(state.as_str(), 2).unwrap(), state);
        assert_eq!(SessionState::from_parts("complete", 3).unwrap(), SessionState::Complete);
        assert!(SessionState::from_parts("paused", 0).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::AwaitingAnswer(0).is_terminal());
        assert!(SessionState::Complete.is_terminal());
        assert!(SessionState::Abandoned.is_terminal());
    }

    #[test]
    fn test_next_step_serializes_with_tag() {
        let step = NextStep::Complete(Completion {
            session_id: "s".into(),
            summary: "done".into(),
            generated: false,
        });
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["summary"], "done");
    }
}
