//! Conversation state machine.
//!
//! `IDLE -> AWAITING_ANSWER(i) -> ... -> COMPLETE`, with `ABANDONED` reached
//! through the inactivity timeout. At most one session is open at a time.
//!
//! Every transition runs under one async mutex. The lock is released before
//! calling the reasoning gateway, the embedder, or any channel, so a slow
//! backend never blocks other callers. Answers are written turn first, then
//! session: a crash in between leaves a recorded answer that `resume`
//! consumes instead of asking again.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::questions::QuestionPlan;
use crate::clock::{Clock, SystemClock};
use crate::config::ConversationConfig;
use crate::error::{SentinelError, SentinelResult};
use crate::memory::MemoryStore;
use crate::reasoning::{ReasoningGateway, ReasoningRequest};
use crate::traits::{ChannelAdapter, Embedder};
use crate::types::{
    AnswerRecord, Completion, ConversationSession, Message, NextStep, PendingQuestion, SessionState, StartedSession,
    Turn, TurnRole,
};

const SUMMARY_PROMPT: &str =
    "Summarize this check-in in one or two sentences for the household log. Mention anything that needs follow-up.";

/// Runs the question workflow and owns the single active session.
pub struct ConversationEngine {
    plan: QuestionPlan,
    store: Arc<dyn MemoryStore>,
    gateway: Arc<ReasoningGateway>,
    embedder: Option<Arc<dyn Embedder>>,
    channels: RwLock<Vec<Arc<dyn ChannelAdapter>>>,
    clock: Arc<dyn Clock>,
    inactivity_timeout: Duration,
    rephrase_questions: bool,
    system_prompt: String,
    active: Mutex<Option<ConversationSession>>,
    activity: Notify,
}

/// State committed by an accepted answer, handed to the unlocked follow-up.
struct Committed {
    session: ConversationSession,
    answer: String,
}

impl ConversationEngine {
    pub fn new(
        config: &ConversationConfig,
        store: Arc<dyn MemoryStore>,
        gateway: Arc<ReasoningGateway>,
    ) -> SentinelResult<Self> {
        Ok(Self {
            plan: QuestionPlan::new(config.questions.clone())?,
            store,
            gateway,
            embedder: None,
            channels: RwLock::new(Vec::new()),
            clock: Arc::new(SystemClock),
            inactivity_timeout: config.inactivity_timeout(),
            rephrase_questions: config.rephrase_questions,
            system_prompt: config.system_prompt.clone(),
            active: Mutex::new(None),
            activity: Notify::new(),
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_channel(self, channel: Arc<dyn ChannelAdapter>) -> Self {
        self.register_channel(channel);
        self
    }

    /// Add a channel that receives every question, summary and timeout notice.
    pub fn register_channel(&self, channel: Arc<dyn ChannelAdapter>) {
        info!(channel = channel.name(), "Registered channel");
        self.channels.write().unwrap_or_else(|e| e.into_inner()).push(channel);
    }

    pub fn plan(&self) -> &QuestionPlan {
        &self.plan
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    pub fn gateway(&self) -> &Arc<ReasoningGateway> {
        &self.gateway
    }

    pub fn embedder(&self) -> Option<&Arc<dyn Embedder>> {
        self.embedder.as_ref()
    }

    /// Snapshot of the open session, if any.
    pub async fn active_session(&self) -> Option<ConversationSession> {
        self.active.lock().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Look a session up, preferring the in-memory copy of the active one.
    pub async fn session(&self, session_id: &str) -> SentinelResult<Option<ConversationSession>> {
        if let Some(active) = self.active.lock().await.as_ref() {
            if active.session_id == session_id {
                return Ok(Some(active.clone()));
            }
        }
        self.store.load_session(session_id)
    }

    /// All turns recorded for a session.
    pub fn transcript(&self, session_id: &str) -> SentinelResult<Vec<Turn>> {
        self.store.turns_for_session(session_id)
    }

    /// Open a new session and deliver its first question.
    ///
    /// Fails with `Conflict` while another session is open.
    pub async fn start_session(&self) -> SentinelResult<StartedSession> {
        let (session_id, index, expired) = {
            let mut active = self.active.lock().await;
            let expired = self.expire_locked(&mut active);
            if let Some(open) = active.as_ref() {
                return Err(SentinelError::conflict(
                    format!("session {} is still awaiting an answer", open.session_id),
                    Some(open.session_id.clone()),
                ));
            }

            let mut session = ConversationSession::new(self.clock.now());
            let index = self
                .plan
                .next_index(0, &session.answers)
                .ok_or_else(|| SentinelError::Internal("question plan has no askable question".to_string()))?;
            session.state = SessionState::AwaitingAnswer(index);
            session.current_question_index = index;
            self.store.save_session(&session)?;

            info!(session_id = %session.session_id, "Conversation session started");
            let id = session.session_id.clone();
            *active = Some(session);
            self.activity.notify_one();
            (id, index, expired)
        };

        if let Some(old) = expired {
            self.notify_abandoned(&old).await;
        }
        let step = self.deliver_question(&session_id, index, None, None).await;
        Ok(StartedSession { session_id, step })
    }

    /// Record an answer to whatever question the session is waiting on.
    pub async fn submit_answer(&self, session_id: &str, text: &str) -> SentinelResult<NextStep> {
        self.accept(session_id, None, text).await
    }

    /// Record an answer to a specific question.
    ///
    /// A delivery for a question that has already been answered fails with
    /// `Conflict`, which makes at-least-once channels safe to retry.
    pub async fn submit_answer_for(
        &self,
        session_id: &str,
        question_index: usize,
        text: &str,
    ) -> SentinelResult<NextStep> {
        self.accept(session_id, Some(question_index), text).await
    }

    async fn accept(&self, session_id: &str, expected: Option<usize>, text: &str) -> SentinelResult<NextStep> {
        let text = text.trim();
        if text.is_empty() {
            return Err(SentinelError::validation("answer text is empty"));
        }
        let embedding = self.embed(text).await;

        let (outcome, expired) = {
            let mut active = self.active.lock().await;
            let expired = self.expire_locked(&mut active);
            let current = active.as_ref().filter(|s| s.session_id == session_id).cloned();
            let outcome = match current {
                Some(open) => self.commit_answer(&mut active, open, expected, text, embedding),
                None => Err(self.classify_inactive(session_id)),
            };
            (outcome, expired)
        };

        if let Some(old) = expired {
            self.notify_abandoned(&old).await;
        }
        let committed = outcome?;
        Ok(self.follow_up(committed).await)
    }

    /// Apply one answer under the lock. The in-memory session is replaced
    /// only after the session row is written.
    fn commit_answer(
        &self,
        active: &mut Option<ConversationSession>,
        session: ConversationSession,
        expected: Option<usize>,
        text: &str,
        embedding: Option<Vec<f32>>,
    ) -> SentinelResult<Committed> {
        let index = match session.state {
            SessionState::AwaitingAnswer(i) => i,
            other => {
                return Err(SentinelError::Internal(format!(
                    "active session {} is in state {}",
                    session.session_id,
                    other.as_str()
                )))
            }
        };
        if let Some(expected) = expected {
            if expected != index {
                return Err(SentinelError::conflict(
                    format!(
                        "question {} is not pending; session {} is waiting on question {}",
                        expected, session.session_id, index
                    ),
                    Some(session.session_id.clone()),
                ));
            }
        }

        let now = self.clock.now();
        let answer = match self.store.answer_turn(&session.session_id, index)? {
            Some(recorded) => {
                debug!(session_id = %session.session_id, index, "Answer already recorded, advancing");
                recorded.text
            }
            None => {
                let turn = Turn::answer(&session.session_id, index, text, now).with_embedding(embedding);
                self.store.append_turn(&turn)?;
                text.to_string()
            }
        };

        let next = self.advance(session, index, answer.clone(), now)?;
        self.store.save_session(&next)?;

        info!(
            session_id = %next.session_id,
            answered = index,
            state = next.state.as_str(),
            "Answer recorded"
        );
        *active = if next.is_terminal() { None } else { Some(next.clone()) };
        self.activity.notify_one();
        Ok(Committed { session: next, answer })
    }

    /// Move past `index` using the ask-conditions.
    fn advance(
        &self,
        mut session: ConversationSession,
        index: usize,
        answer: String,
        at: DateTime<Utc>,
    ) -> SentinelResult<ConversationSession> {
        let question = self
            .plan
            .get(index)
            .ok_or_else(|| SentinelError::Internal(format!("question index {} out of range", index)))?;
        session.answers.push(AnswerRecord {
            question_id: question.id.clone(),
            question_index: index,
            answer_text: answer,
            answered_at: at,
        });
        session.updated_at = at;

        match self.plan.next_index(index + 1, &session.answers) {
            Some(next) => {
                session.current_question_index = next;
                session.state = SessionState::AwaitingAnswer(next);
            }
            None => {
                session.current_question_index = self.plan.len();
                session.state = SessionState::Complete;
            }
        }
        Ok(session)
    }

    async fn follow_up(&self, committed: Committed) -> NextStep {
        match committed.session.state {
            SessionState::AwaitingAnswer(next) => {
                self.deliver_question(&committed.session.session_id, next, None, Some(&committed.answer))
                    .await
            }
            _ => self.finish(&committed.session).await,
        }
    }

    fn classify_inactive(&self, session_id: &str) -> SentinelError {
        match self.store.load_session(session_id) {
            Ok(None) => SentinelError::session_not_found(session_id),
            Ok(Some(s)) if s.is_terminal() => SentinelError::session_terminal(session_id),
            Ok(Some(_)) => SentinelError::conflict(
                format!("session {} is not the active session", session_id),
                Some(session_id.to_string()),
            ),
            Err(e) => e,
        }
    }

    /// Phrase, record and deliver the question at `index`.
    async fn deliver_question(
        &self,
        session_id: &str,
        index: usize,
        already_asked: Option<String>,
        previous_answer: Option<&str>,
    ) -> NextStep {
        let Some(spec) = self.plan.get(index) else {
            return NextStep::Complete(Completion {
                session_id: session_id.to_string(),
                summary: self.fallback_summary(0),
                generated: false,
            });
        };

        let text = match already_asked {
            Some(text) => text,
            None => {
                let text = match previous_answer {
                    Some(answer) if self.rephrase_questions => self.rephrase(&spec.text, answer).await,
                    _ => spec.text.clone(),
                };
                let turn = Turn::assistant(session_id, Some(index), &text, self.clock.now());
                if let Err(e) = self.store.append_turn(&turn) {
                    warn!(session_id, index, error = %e, "Failed to record question turn");
                }
                text
            }
        };

        let question = PendingQuestion {
            session_id: session_id.to_string(),
            question_id: spec.id.clone(),
            question_index: index,
            position: index + 1,
            total: self.plan.len(),
            text,
        };

        let channels = self.channel_snapshot();
        let pending = &question;
        let deliveries = channels.iter().map(|c| async move {
            if let Err(e) = c.on_question(pending).await {
                warn!(channel = c.name(), error = %e, "Failed to deliver question");
            }
        });
        join_all(deliveries).await;

        NextStep::Ask(question)
    }

    async fn rephrase(&self, question: &str, previous_answer: &str) -> String {
        let request = ReasoningRequest::new(format!(
            "The person just answered: \"{}\". Ask the next question in a natural, friendly way, \
             keeping its meaning unchanged. Reply with the question only.\nNext question: {}",
            previous_answer, question
        ))
        .with_system(self.system_prompt.clone());

        match self.gateway.generate(&request).await {
            Ok(response) => response.text,
            Err(e) => {
                warn!(error = %e, "Using literal question text");
                question.to_string()
            }
        }
    }

    /// Produce and deliver the closing summary.
    async fn finish(&self, session: &ConversationSession) -> NextStep {
        let mut context = Vec::with_capacity(session.answers.len() * 2);
        for answer in &session.answers {
            if let Some(q) = self.plan.get(answer.question_index) {
                context.push(Message::assistant(q.text.clone()));
            }
            context.push(Message::user(answer.answer_text.clone()));
        }
        let request = ReasoningRequest::new(SUMMARY_PROMPT)
            .with_system(self.system_prompt.clone())
            .with_context(context);

        let completion = match self.gateway.generate(&request).await {
            Ok(response) => {
                let embedding = self.embed(&response.text).await;
                let turn = Turn::assistant(&session.session_id, None, &response.text, self.clock.now())
                    .with_embedding(embedding);
                if let Err(e) = self.store.append_turn(&turn) {
                    warn!(session_id = %session.session_id, error = %e, "Failed to record summary turn");
                }
                Completion {
                    session_id: session.session_id.clone(),
                    summary: response.text,
                    generated: true,
                }
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Completing without generated summary");
                Completion {
                    session_id: session.session_id.clone(),
                    summary: self.fallback_summary(session.answers.len()),
                    generated: false,
                }
            }
        };

        info!(session_id = %session.session_id, generated = completion.generated, "Conversation session complete");
        let channels = self.channel_snapshot();
        let done = &completion;
        join_all(channels.iter().map(|c| async move {
            if let Err(e) = c.on_complete(done).await {
                warn!(channel = c.name(), error = %e, "Failed to deliver summary");
            }
        }))
        .await;

        NextStep::Complete(completion)
    }

    fn fallback_summary(&self, answers: usize) -> String {
        format!("Completed safety check with {} answers.", answers)
    }

    /// Reload the most recent open session after a restart.
    ///
    /// Older open sessions are abandoned. A session idle past the timeout is
    /// abandoned instead of resumed. An answer recorded just before a crash
    /// is applied rather than asked for again, and the pending question is
    /// delivered with the wording it was first asked in.
    pub async fn resume(&self) -> SentinelResult<Option<NextStep>> {
        let mut open = self.store.open_sessions()?;
        if open.is_empty() {
            return Ok(None);
        }
        let latest = open.remove(0);
        for stray in open {
            warn!(session_id = %stray.session_id, "Abandoning superseded open session");
            self.mark_abandoned(stray)?;
        }

        let session = {
            let mut active = self.active.lock().await;
            if let Some(current) = active.as_ref() {
                return Err(SentinelError::conflict(
                    "cannot resume while a session is active",
                    Some(current.session_id.clone()),
                ));
            }

            if self.is_expired(&latest) {
                info!(session_id = %latest.session_id, "Stored session expired while offline");
                self.mark_abandoned(latest)?;
                return Ok(None);
            }

            let mut session = latest;
            if session.state == SessionState::Idle {
                let first = self.plan.next_index(0, &session.answers).unwrap_or(0);
                session.state = SessionState::AwaitingAnswer(first);
                session.current_question_index = first;
            }
            while let SessionState::AwaitingAnswer(index) = session.state {
                match self.store.answer_turn(&session.session_id, index)? {
                    Some(turn) if !session.answers.iter().any(|a| a.question_index == index) => {
                        info!(session_id = %session.session_id, index, "Applying answer recorded before restart");
                        session = self.advance(session, index, turn.text, turn.timestamp)?;
                    }
                    _ => break,
                }
            }
            session.updated_at = self.clock.now();
            self.store.save_session(&session)?;

            *active = if session.is_terminal() { None } else { Some(session.clone()) };
            self.activity.notify_one();
            session
        };

        info!(session_id = %session.session_id, state = session.state.as_str(), "Session resumed");
        let step = match session.state {
            SessionState::AwaitingAnswer(index) => {
                let asked = self
                    .store
                    .turns_for_session(&session.session_id)?
                    .into_iter()
                    .rev()
                    .find(|t| t.role == TurnRole::Assistant && t.question_index == Some(index))
                    .map(|t| t.text);
                self.deliver_question(&session.session_id, index, asked, None).await
            }
            _ => self.finish(&session).await,
        };
        Ok(Some(step))
    }

    fn mark_abandoned(&self, mut session: ConversationSession) -> SentinelResult<()> {
        session.state = SessionState::Abandoned;
        session.updated_at = self.clock.now();
        self.store.save_session(&session)
    }

    fn is_expired(&self, session: &ConversationSession) -> bool {
        self.idle_for(session) >= self.inactivity_timeout
    }

    fn idle_for(&self, session: &ConversationSession) -> Duration {
        (self.clock.now() - session.updated_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Abandon the active session under the caller's lock if it has timed out.
    fn expire_locked(&self, active: &mut Option<ConversationSession>) -> Option<String> {
        let session = active.as_ref()?;
        if !self.is_expired(session) {
            return None;
        }
        let session = active.take()?;
        let session_id = session.session_id.clone();
        info!(session_id = %session_id, "Session abandoned after inactivity");
        if let Err(e) = self.mark_abandoned(session) {
            warn!(session_id = %session_id, error = %e, "Failed to persist abandoned session");
        }
        Some(session_id)
    }

    /// Abandon the active session if it has been idle past the timeout.
    /// Returns the abandoned session id.
    pub async fn expire_if_inactive(&self) -> Option<String> {
        let expired = {
            let mut active = self.active.lock().await;
            self.expire_locked(&mut active)
        };
        if let Some(session_id) = &expired {
            self.notify_abandoned(session_id).await;
        }
        expired
    }

    async fn time_until_expiry(&self) -> Option<Duration> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .map(|s| self.inactivity_timeout.saturating_sub(self.idle_for(s)))
    }

    /// Enforce the inactivity timeout until cancelled. Every accepted answer
    /// resets the timer.
    pub async fn run_inactivity_watchdog(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            let remaining = self.time_until_expiry().await;
            let activity = self.activity.notified();
            match remaining {
                Some(wait) if wait.is_zero() => {
                    self.expire_if_inactive().await;
                }
                Some(wait) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(wait) => {
                            self.expire_if_inactive().await;
                        }
                        _ = activity => {}
                    }
                }
                None => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = activity => {}
                    }
                }
            }
        }
        debug!("Inactivity watchdog stopped");
    }

    async fn notify_abandoned(&self, session_id: &str) {
        let channels = self.channel_snapshot();
        join_all(channels.iter().map(|c| async move {
            if let Err(e) = c.on_abandoned(session_id).await {
                warn!(channel = c.name(), error = %e, "Failed to deliver timeout notice");
            }
        }))
        .await;
    }

    fn channel_snapshot(&self) -> Vec<Arc<dyn ChannelAdapter>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        super::embed_or_none(self.embedder.as_ref(), text).await
    }
}
