//! Persisted conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One utterance in a session transcript. Turns are append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub session_id: String,
    pub role: TurnRole,
    pub text: String,
    /// Question this turn asks (assistant) or answers (user).
    /// `None` for the closing summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// A user answer to the question at `question_index`.
    pub fn answer(
        session_id: impl Into<String>,
        question_index: usize,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: TurnRole::User,
            text: text.into(),
            question_index: Some(question_index),
            embedding: None,
            timestamp,
        }
    }

    /// A user message outside the question flow, such as free-form chat.
    pub fn user(session_id: impl Into<String>, text: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: TurnRole::User,
            text: text.into(),
            question_index: None,
            embedding: None,
            timestamp,
        }
    }

    /// An assistant utterance. Questions carry their index; summaries don't.
    pub fn assistant(
        session_id: impl Into<String>,
        question_index: Option<usize>,
        text: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            role: TurnRole::Assistant,
            text: text.into(),
            question_index,
            embedding: None,
            timestamp,
        }
    }

    pub fn with_embedding(mut self, embedding: Option<Vec<f32>>) -> Self {
        self.embedding = embedding;
        self
    }
}
