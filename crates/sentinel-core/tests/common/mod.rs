//! Test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sentinel_core::config::ConversationConfig;
use sentinel_core::memory::{MemoryStore, PruneStats, SqliteMemoryStore};
use sentinel_core::reasoning::{ReasoningBackend, ReasoningGateway};
use sentinel_core::traits::{ChannelAdapter, Detector, Embedder, GenerationOptions, Llm, LlmResponse};
use sentinel_core::types::{
    Completion, ConversationSession, DetectionSample, Message, PendingQuestion, PresenceEvent, Turn,
};
use sentinel_core::{ConversationEngine, SentinelError, SentinelResult};

/// LLM that answers with a fixed text, or always fails.
pub struct FakeLlm {
    reply: Option<String>,
    pub calls: AtomicUsize,
    /// Messages of the most recent call.
    pub last_messages: Mutex<Vec<Message>>,
}

impl FakeLlm {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
            last_messages: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl Llm for FakeLlm {
    async fn generate(
        &self,
        messages: &[Message],
        _options: Option<GenerationOptions>,
    ) -> SentinelResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_messages.lock().unwrap() = messages.to_vec();
        match &self.reply {
            Some(text) => Ok(LlmResponse::text(text.clone())),
            None => Err(SentinelError::llm("backend offline")),
        }
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

pub fn gateway(llms: Vec<Arc<FakeLlm>>) -> Arc<ReasoningGateway> {
    let backends = llms
        .into_iter()
        .enumerate()
        .map(|(i, llm)| ReasoningBackend::new(format!("fake-{}", i), llm, Duration::from_secs(5)))
        .collect();
    Arc::new(ReasoningGateway::new(backends))
}

/// Two-dimensional embedder: texts mentioning the keyword point one way,
/// everything else the other.
pub struct KeywordEmbedder {
    keyword: String,
}

impl KeywordEmbedder {
    pub fn new(keyword: &str) -> Arc<Self> {
        Arc::new(Self {
            keyword: keyword.to_lowercase(),
        })
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> SentinelResult<Vec<f32>> {
        if text.to_lowercase().contains(&self.keyword) {
            Ok(vec![1.0, 0.0])
        } else {
            Ok(vec![0.0, 1.0])
        }
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

/// Records everything delivered to it.
#[derive(Default)]
pub struct RecordingChannel {
    pub questions: Mutex<Vec<PendingQuestion>>,
    pub completions: Mutex<Vec<Completion>>,
    pub abandoned: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn question_texts(&self) -> Vec<String> {
        self.questions.lock().unwrap().iter().map(|q| q.text.clone()).collect()
    }
}

#[async_trait]
impl ChannelAdapter for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_question(&self, question: &PendingQuestion) -> SentinelResult<()> {
        self.questions.lock().unwrap().push(question.clone());
        Ok(())
    }

    async fn on_complete(&self, completion: &Completion) -> SentinelResult<()> {
        self.completions.lock().unwrap().push(completion.clone());
        Ok(())
    }

    async fn on_abandoned(&self, session_id: &str) -> SentinelResult<()> {
        self.abandoned.lock().unwrap().push(session_id.to_string());
        Ok(())
    }
}

/// Detector replaying a script; an exhausted script keeps returning empty frames.
pub struct ScriptedDetector {
    script: Mutex<VecDeque<SentinelResult<DetectionSample>>>,
    delay: Mutex<VecDeque<Duration>>,
    pub calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: Vec<SentinelResult<DetectionSample>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Detector that sees a person on every frame.
    pub fn always_person() -> Arc<Self> {
        Self::new(Vec::new())
    }

    /// Delay the next calls, one entry per call.
    pub fn with_delays(self: Arc<Self>, delays: Vec<Duration>) -> Arc<Self> {
        *self.delay.lock().unwrap() = delays.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn person(confidence: f32) -> SentinelResult<DetectionSample> {
    Ok(DetectionSample::new(confidence, "person"))
}

#[async_trait]
impl Detector for ScriptedDetector {
    async fn detect(&self) -> SentinelResult<DetectionSample> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| person(0.95))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// SQLite store whose session writes can be made to fail.
pub struct FlakyStore {
    inner: SqliteMemoryStore,
    pub fail_session_writes: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteMemoryStore::in_memory().unwrap(),
            fail_session_writes: AtomicBool::new(false),
        })
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_session_writes.store(fail, Ordering::SeqCst);
    }
}

impl MemoryStore for FlakyStore {
    fn append_turn(&self, turn: &Turn) -> SentinelResult<()> {
        self.inner.append_turn(turn)
    }

    fn turns_for_session(&self, session_id: &str) -> SentinelResult<Vec<Turn>> {
        self.inner.turns_for_session(session_id)
    }

    fn answer_turn(&self, session_id: &str, question_index: usize) -> SentinelResult<Option<Turn>> {
        self.inner.answer_turn(session_id, question_index)
    }

    fn recent_turns(&self, limit: usize) -> SentinelResult<Vec<Turn>> {
        self.inner.recent_turns(limit)
    }

    fn save_session(&self, session: &ConversationSession) -> SentinelResult<()> {
        if self.fail_session_writes.load(Ordering::SeqCst) {
            return Err(SentinelError::persistence("disk full"));
        }
        self.inner.save_session(session)
    }

    fn load_session(&self, session_id: &str) -> SentinelResult<Option<ConversationSession>> {
        self.inner.load_session(session_id)
    }

    fn open_sessions(&self) -> SentinelResult<Vec<ConversationSession>> {
        self.inner.open_sessions()
    }

    fn search_similar(&self, query: &[f32], k: usize) -> SentinelResult<Vec<Turn>> {
        self.inner.search_similar(query, k)
    }

    fn record_presence(&self, event: &PresenceEvent) -> SentinelResult<()> {
        self.inner.record_presence(event)
    }

    fn recent_presence(&self, limit: usize) -> SentinelResult<Vec<PresenceEvent>> {
        self.inner.recent_presence(limit)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> SentinelResult<PruneStats> {
        self.inner.prune_before(cutoff)
    }
}

/// Engine over the given store with one channel attached.
pub fn engine_with(
    store: Arc<dyn MemoryStore>,
    gateway: Arc<ReasoningGateway>,
    channel: Arc<RecordingChannel>,
) -> ConversationEngine {
    ConversationEngine::new(&ConversationConfig::default(), store, gateway)
        .unwrap()
        .with_channel(channel)
}
