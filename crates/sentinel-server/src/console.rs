//! Interactive console channel on stdin/stdout.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use sentinel_core::conversation::{ChatService, ConversationEngine};
use sentinel_core::error::{SentinelError, SentinelResult};
use sentinel_core::traits::ChannelAdapter;
use sentinel_core::types::{Completion, NextStep, PendingQuestion};

/// Prints questions and summaries for a person at the terminal.
pub struct ConsoleChannel<W = tokio::io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleChannel {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin + Send> ConsoleChannel<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    async fn write_line(&self, line: &str) -> SentinelResult<()> {
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }

    /// Print a line outside the question flow. Write failures are logged.
    pub async fn notify(&self, line: &str) {
        if let Err(e) = self.write_line(line).await {
            warn!(error = %e, "Console write failed");
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChannelAdapter for ConsoleChannel<W> {
    fn name(&self) -> &str {
        "console"
    }

    async fn on_question(&self, question: &PendingQuestion) -> SentinelResult<()> {
        self.write_line(&format!("[{}/{}] {}", question.position, question.total, question.text))
            .await
    }

    async fn on_complete(&self, completion: &Completion) -> SentinelResult<()> {
        self.write_line(&format!("Thanks. {}", completion.summary)).await
    }

    async fn on_abandoned(&self, _session_id: &str) -> SentinelResult<()> {
        self.write_line("No answer received; check-in closed.").await
    }
}

/// Words that close the console chat and drop its history.
const END_CHAT: [&str; 3] = ["/endchat", "exit", "quit"];

/// Route each non-empty input line from the terminal.
///
/// While a session is open a line answers its current question. Otherwise the
/// line goes to chat, and the reply is printed on `console`.
pub async fn read_input<R, W>(
    engine: Arc<ConversationEngine>,
    chat: Arc<ChatService>,
    console: Arc<ConsoleChannel<W>>,
    input: R,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send,
{
    let mut lines = input.lines();
    let mut chat_id: Option<String> = None;
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Console input failed");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(session) = engine.active_session().await {
            submit_line(&engine, &session.session_id, session.current_question_index, line).await;
            continue;
        }

        if END_CHAT.iter().any(|word| line.eq_ignore_ascii_case(word)) {
            if let Some(id) = chat_id.take() {
                chat.end(&id);
                console.notify("Chat ended.").await;
            }
            continue;
        }
        match chat.send(chat_id.as_deref(), line).await {
            Ok(reply) => {
                console.notify(&format!("Sentinel: {}", reply.reply)).await;
                chat_id = Some(reply.chat_id);
            }
            Err(e) => {
                warn!(error = %e, "Console chat failed");
                console.notify("Sentinel can't answer right now.").await;
            }
        }
    }
    if let Some(id) = chat_id {
        chat.end(&id);
    }
    debug!("Console reader stopped");
}

async fn submit_line(engine: &ConversationEngine, session_id: &str, index: usize, line: &str) {
    match engine.submit_answer_for(session_id, index, line).await {
        Ok(NextStep::Ask(_)) | Ok(NextStep::Complete(_)) => {}
        Err(e @ (SentinelError::Conflict { .. } | SentinelError::NotFound { .. })) => {
            debug!(error = %e, "Console answer arrived after the session moved on");
        }
        Err(e) => warn!(error = %e, "Failed to submit console answer"),
    }
}

/// Read the process's stdin.
pub async fn read_stdin(
    engine: Arc<ConversationEngine>,
    chat: Arc<ChatService>,
    console: Arc<ConsoleChannel>,
    cancel: CancellationToken,
) {
    read_input(engine, chat, console, BufReader::new(tokio::io::stdin()), cancel).await;
}
