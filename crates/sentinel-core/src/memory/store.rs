//! Memory store trait and SQLite implementation.
//!
//! Turns are append-only. Sessions are upserted by id. Presence events form
//! the capture log. Retention removes old presence events and finished
//! sessions; a session that can still accept answers is never pruned.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection};
use std::cmp::{Ordering, Reverse};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::similarity::{bytes_to_vector, cosine_distance, vector_to_bytes};
use crate::error::{SentinelError, SentinelResult};
use crate::types::{AnswerRecord, ConversationSession, PresenceEvent, SessionState, Turn, TurnRole};

/// What a retention pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub presence_events: usize,
    pub sessions: usize,
    pub turns: usize,
    pub images: usize,
}

/// Trait for conversation and presence persistence.
pub trait MemoryStore: Send + Sync {
    /// Append a turn. A second user turn for the same question is a conflict.
    fn append_turn(&self, turn: &Turn) -> SentinelResult<()>;

    /// All turns of a session, oldest first.
    fn turns_for_session(&self, session_id: &str) -> SentinelResult<Vec<Turn>>;

    /// The user turn answering `question_index`, if one was recorded.
    fn answer_turn(&self, session_id: &str, question_index: usize) -> SentinelResult<Option<Turn>>;

    /// Most recent turns across sessions, newest first.
    fn recent_turns(&self, limit: usize) -> SentinelResult<Vec<Turn>>;

    /// Insert or replace a session by id.
    fn save_session(&self, session: &ConversationSession) -> SentinelResult<()>;

    fn load_session(&self, session_id: &str) -> SentinelResult<Option<ConversationSession>>;

    /// Non-terminal sessions, most recently active first.
    fn open_sessions(&self) -> SentinelResult<Vec<ConversationSession>>;

    /// The `k` turns nearest to `query` by cosine distance, nearest first.
    /// Equal distances are ordered most recent first.
    fn search_similar(&self, query: &[f32], k: usize) -> SentinelResult<Vec<Turn>>;

    fn record_presence(&self, event: &PresenceEvent) -> SentinelResult<()>;

    /// Most recent presence events, newest first.
    fn recent_presence(&self, limit: usize) -> SentinelResult<Vec<PresenceEvent>>;

    /// Remove presence events and finished sessions older than `cutoff`.
    fn prune_before(&self, cutoff: DateTime<Utc>) -> SentinelResult<PruneStats>;
}

/// SQLite-backed memory store
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

const TURN_COLUMNS: &str = "id, session_id, role, text, question_index, embedding, created_at, seq";

impl SqliteMemoryStore {
    /// Open (or create) a store at the given path
    pub fn new(path: impl AsRef<Path>) -> SentinelResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            SentinelError::db_connection(format!("cannot open {}: {}", path.as_ref().display(), e))
        })?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> SentinelResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> SentinelResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| SentinelError::persistence("memory store connection lock poisoned"))
    }

    fn init_schema(&self) -> SentinelResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                current_question_index INTEGER NOT NULL,
                answers TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_state ON sessions(state, updated_at);

            CREATE TABLE IF NOT EXISTS turns (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL,
                text TEXT NOT NULL,
                question_index INTEGER,
                embedding BLOB,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_turns_session ON turns(session_id, seq);
            CREATE INDEX IF NOT EXISTS idx_turns_time ON turns(created_at);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_turns_answer
                ON turns(session_id, question_index) WHERE role = 'user';

            CREATE TABLE IF NOT EXISTS presence_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                detected_at TEXT NOT NULL,
                confidence REAL NOT NULL,
                label TEXT NOT NULL,
                image_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_presence_time ON presence_events(detected_at);
        "#,
        )?;
        Ok(())
    }

    fn row_to_turn(row: &rusqlite::Row<'_>) -> SentinelResult<(Turn, i64)> {
        let id: String = row.get(0)?;
        let session_id: String = row.get(1)?;
        let role: String = row.get(2)?;
        let text: String = row.get(3)?;
        let question_index: Option<i64> = row.get(4)?;
        let embedding: Option<Vec<u8>> = row.get(5)?;
        let created_at: String = row.get(6)?;
        let seq: i64 = row.get(7)?;

        let turn = Turn {
            id: Uuid::parse_str(&id).map_err(|e| SentinelError::parse(e.to_string()))?,
            session_id,
            role: role
                .parse::<TurnRole>()
                .map_err(|e| SentinelError::parse(format!("turn role '{}': {}", role, e)))?,
            text,
            question_index: question_index.map(|i| i as usize),
            embedding: embedding.map(|b| bytes_to_vector(&b)),
            timestamp: parse_timestamp(&created_at)?,
        };
        Ok((turn, seq))
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> SentinelResult<ConversationSession> {
        let session_id: String = row.get(0)?;
        let state: String = row.get(1)?;
        let current_question_index: i64 = row.get(2)?;
        let answers: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        let current_question_index = current_question_index as usize;
        let answers: Vec<AnswerRecord> = serde_json::from_str(&answers)?;
        Ok(ConversationSession {
            session_id,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            state: SessionState::from_parts(&state, current_question_index)?,
            current_question_index,
            answers,
        })
    }

    fn query_turns(&self, sql: &str, params: impl rusqlite::Params) -> SentinelResult<Vec<(Turn, i64)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut turns = Vec::new();
        while let Some(row) = rows.next()? {
            turns.push(Self::row_to_turn(row)?);
        }
        Ok(turns)
    }
}

/// Fixed-width RFC 3339 so that stored timestamps sort lexically.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> SentinelResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SentinelError::parse(format!("timestamp '{}': {}", s, e)))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

impl MemoryStore for SqliteMemoryStore {
    fn append_turn(&self, turn: &Turn) -> SentinelResult<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            r#"
            INSERT INTO turns (id, session_id, role, text, question_index, embedding, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                turn.id.to_string(),
                turn.session_id,
                turn.role.to_string(),
                turn.text,
                turn.question_index.map(|i| i as i64),
                turn.embedding.as_deref().map(vector_to_bytes),
                format_timestamp(turn.timestamp),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(SentinelError::conflict(
                format!(
                    "turn already recorded for question {:?} of session {}",
                    turn.question_index, turn.session_id
                ),
                Some(turn.session_id.clone()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    fn turns_for_session(&self, session_id: &str) -> SentinelResult<Vec<Turn>> {
        let sql = format!("SELECT {} FROM turns WHERE session_id = ?1 ORDER BY seq ASC", TURN_COLUMNS);
        Ok(self
            .query_turns(&sql, params![session_id])?
            .into_iter()
            .map(|(t, _)| t)
            .collect())
    }

    fn answer_turn(&self, session_id: &str, question_index: usize) -> SentinelResult<Option<Turn>> {
        let sql = format!(
            "SELECT {} FROM turns WHERE session_id = ?1 AND question_index = ?2 AND role = 'user' LIMIT 1",
            TURN_COLUMNS
        );
        Ok(self
            .query_turns(&sql, params![session_id, question_index as i64])?
            .into_iter()
            .next()
            .map(|(t, _)| t))
    }

    fn recent_turns(&self, limit: usize) -> SentinelResult<Vec<Turn>> {
        let sql = format!("SELECT {} FROM turns ORDER BY seq DESC LIMIT ?1", TURN_COLUMNS);
        Ok(self
            .query_turns(&sql, params![limit as i64])?
            .into_iter()
            .map(|(t, _)| t)
            .collect())
    }

    fn save_session(&self, session: &ConversationSession) -> SentinelResult<()> {
        let answers = serde_json::to_string(&session.answers)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO sessions (session_id, state, current_question_index, answers, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                current_question_index = excluded.current_question_index,
                answers = excluded.answers,
                updated_at = excluded.updated_at
            "#,
            params![
                session.session_id,
                session.state.as_str(),
                session.current_question_index as i64,
                answers,
                format_timestamp(session.created_at),
                format_timestamp(session.updated_at),
            ],
        )?;
        Ok(())
    }

    fn load_session(&self, session_id: &str) -> SentinelResult<Option<ConversationSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, state, current_question_index, answers, created_at, updated_at
            FROM sessions WHERE session_id = ?1
            "#,
        )?;
        let mut rows = stmt.query(params![session_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::row_to_session(row)?)),
            None => Ok(None),
        }
    }

    fn open_sessions(&self) -> SentinelResult<Vec<ConversationSession>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT session_id, state, current_question_index, answers, created_at, updated_at
            FROM sessions
            WHERE state NOT IN ('complete', 'abandoned')
            ORDER BY updated_at DESC
            "#,
        )?;
        let mut rows = stmt.query([])?;
        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(Self::row_to_session(row)?);
        }
        Ok(sessions)
    }

    fn search_similar(&self, query: &[f32], k: usize) -> SentinelResult<Vec<Turn>> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {} FROM turns WHERE embedding IS NOT NULL", TURN_COLUMNS);
        let mut scored: Vec<(f32, Turn, i64)> = self
            .query_turns(&sql, [])?
            .into_iter()
            .filter_map(|(turn, seq)| {
                let distance = match &turn.embedding {
                    Some(v) if v.len() == query.len() => cosine_distance(query, v),
                    _ => return None,
                };
                Some((distance, turn, seq))
            })
            .collect();

        scored.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(Ordering::Equal)
                .then_with(|| (Reverse(a.1.timestamp), Reverse(a.2)).cmp(&(Reverse(b.1.timestamp), Reverse(b.2))))
        });
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, turn, _)| turn).collect())
    }

    fn record_presence(&self, event: &PresenceEvent) -> SentinelResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO presence_events (detected_at, confidence, label, image_path)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                format_timestamp(event.timestamp),
                event.confidence as f64,
                event.label,
                event.image_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
            ],
        )?;
        Ok(())
    }

    fn recent_presence(&self, limit: usize) -> SentinelResult<Vec<PresenceEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT detected_at, confidence, label, image_path
            FROM presence_events ORDER BY detected_at DESC, id DESC LIMIT ?1
            "#,
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            let detected_at: String = row.get(0)?;
            let confidence: f64 = row.get(1)?;
            let image_path: Option<String> = row.get(3)?;
            events.push(PresenceEvent {
                timestamp: parse_timestamp(&detected_at)?,
                triggered: true,
                confidence: confidence as f32,
                label: row.get(2)?,
                image_path: image_path.map(PathBuf::from),
            });
        }
        Ok(events)
    }

    fn prune_before(&self, cutoff: DateTime<Utc>) -> SentinelResult<PruneStats> {
        let cutoff = format_timestamp(cutoff);
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let images: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT image_path FROM presence_events WHERE detected_at < ?1 AND image_path IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let presence_events = tx.execute("DELETE FROM presence_events WHERE detected_at < ?1", params![cutoff])?;
        let mut turns = tx.execute(
            r#"
            DELETE FROM turns WHERE session_id IN (
                SELECT session_id FROM sessions
                WHERE state IN ('complete', 'abandoned') AND updated_at < ?1
            )
            "#,
            params![cutoff],
        )?;
        // Chat turns have no session row and age out individually.
        turns += tx.execute(
            r#"
            DELETE FROM turns
            WHERE created_at < ?1 AND session_id NOT IN (SELECT session_id FROM sessions)
            "#,
            params![cutoff],
        )?;
        let sessions = tx.execute(
            "DELETE FROM sessions WHERE state IN ('complete', 'abandoned') AND updated_at < ?1",
            params![cutoff],
        )?;
        tx.commit()?;

        let mut removed_images = 0;
        for path in images {
            match std::fs::remove_file(&path) {
                Ok(()) => removed_images += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path, error = %e, "Failed to remove capture"),
            }
        }

        let stats = PruneStats {
            presence_events,
            sessions,
            turns,
            images: removed_images,
        };
        debug!(?stats, "Pruned memory store");
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_at(now: DateTime<Utc>, state: SessionState) -> ConversationSession {
        let mut s = ConversationSession::new(now);
        s.state = state;
        if let SessionState::AwaitingAnswer(i) = state {
            s.current_question_index = i;
        }
        s
    }

    #[test]
    fn test_session_upsert_and_load() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        let mut session = session_at(now, SessionState::AwaitingAnswer(0));
        store.save_session(&session).unwrap();

        session.answers.push(AnswerRecord {
            question_id: "task".into(),
            question_index: 0,
            answer_text: "cleaning".into(),
            answered_at: now,
        });
        session.current_question_index = 1;
        session.state = SessionState::AwaitingAnswer(1);
        store.save_session(&session).unwrap();

        let loaded = store.load_session(&session.session_id).unwrap().unwrap();
        assert_eq!(loaded.state, SessionState::AwaitingAnswer(1));
        assert_eq!(loaded.answers.len(), 1);
        assert_eq!(loaded.answers[0].answer_text, "cleaning");
        assert!(store.load_session("missing").unwrap().is_none());
    }

    #[test]
    fn test_open_sessions_most_recent_first() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        let old = session_at(now - Duration::minutes(10), SessionState::AwaitingAnswer(0));
        let new = session_at(now, SessionState::AwaitingAnswer(1));
        let done = session_at(now, SessionState::Complete);
        store.save_session(&old).unwrap();
        store.save_session(&new).unwrap();
        store.save_session(&done).unwrap();

        let open = store.open_sessions().unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].session_id, new.session_id);
        assert_eq!(open[1].session_id, old.session_id);
    }

    #[test]
    fn test_turns_are_ordered_and_answers_unique() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        store.append_turn(&Turn::assistant("s1", Some(0), "What task?", now)).unwrap();
        store.append_turn(&Turn::answer("s1", 0, "mopping", now)).unwrap();

        let dup = store.append_turn(&Turn::answer("s1", 0, "mopping", now));
        assert!(matches!(dup, Err(SentinelError::Conflict { .. })));

        let turns = store.turns_for_session("s1").unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].role, TurnRole::Assistant);
        assert_eq!(turns[1].text, "mopping");

        let answer = store.answer_turn("s1", 0).unwrap().unwrap();
        assert_eq!(answer.role, TurnRole::User);
        assert!(store.answer_turn("s1", 1).unwrap().is_none());
    }

    #[test]
    fn test_search_similar_orders_by_distance_then_recency() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();

        let far = Turn::answer("s1", 0, "far", now).with_embedding(Some(vec![0.0, 1.0]));
        let older_tie = Turn::answer("s1", 1, "older", now - Duration::seconds(5)).with_embedding(Some(vec![1.0, 0.0]));
        let newer_tie = Turn::answer("s1", 2, "newer", now).with_embedding(Some(vec![2.0, 0.0]));
        let wrong_dims = Turn::answer("s1", 3, "wrong", now).with_embedding(Some(vec![1.0, 0.0, 0.0]));
        let no_vector = Turn::answer("s1", 4, "none", now);
        for t in [&far, &older_tie, &newer_tie, &wrong_dims, &no_vector] {
            store.append_turn(t).unwrap();
        }

        let results = store.search_similar(&[1.0, 0.0], 10).unwrap();
        let texts: Vec<&str> = results.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["newer", "older", "far"]);
        assert_eq!(results[0].embedding.as_deref(), Some(&[2.0, 0.0][..]));

        assert_eq!(store.search_similar(&[1.0, 0.0], 1).unwrap().len(), 1);
        assert!(store.search_similar(&[1.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_recent_turns_newest_first() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        for i in 0..5 {
            store.append_turn(&Turn::answer("s", i, format!("a{}", i), now)).unwrap();
        }
        let recent = store.recent_turns(2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "a4");
        assert_eq!(recent[1].text, "a3");
    }

    #[test]
    fn test_prune_keeps_open_sessions_and_recent_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteMemoryStore::new(dir.path().join("memory.db")).unwrap();
        let now = Utc::now();
        let old = now - Duration::days(10);

        let image = dir.path().join("capture.jpg");
        std::fs::write(&image, b"jpeg").unwrap();
        let sample = crate::types::DetectionSample::new(0.9, "person").at(old).with_image(&image);
        store.record_presence(&PresenceEvent::triggered_by(&sample)).unwrap();
        store
            .record_presence(&PresenceEvent::triggered_by(&crate::types::DetectionSample::new(0.9, "person")))
            .unwrap();

        let finished = session_at(old, SessionState::Complete);
        let stale_open = session_at(old, SessionState::AwaitingAnswer(0));
        let recent_done = session_at(now, SessionState::Abandoned);
        for s in [&finished, &stale_open, &recent_done] {
            store.save_session(s).unwrap();
            store.append_turn(&Turn::assistant(&s.session_id, Some(0), "q", old)).unwrap();
        }

        let stats = store.prune_before(now - Duration::days(7)).unwrap();
        assert_eq!(stats.presence_events, 1);
        assert_eq!(stats.sessions, 1);
        assert_eq!(stats.turns, 1);
        assert_eq!(stats.images, 1);
        assert!(!image.exists());

        assert!(store.load_session(&finished.session_id).unwrap().is_none());
        assert!(store.load_session(&stale_open.session_id).unwrap().is_some());
        assert!(store.load_session(&recent_done.session_id).unwrap().is_some());
        assert_eq!(store.recent_presence(10).unwrap().len(), 1);
    }

    #[test]
    fn test_prune_ages_out_chat_turns() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let now = Utc::now();
        let old = now - Duration::days(10);

        store.append_turn(&Turn::user("chat-a", "old question", old)).unwrap();
        store.append_turn(&Turn::assistant("chat-a", None, "old reply", old)).unwrap();
        store.append_turn(&Turn::user("chat-a", "new question", now)).unwrap();

        let open = session_at(old, SessionState::AwaitingAnswer(0));
        store.save_session(&open).unwrap();
        store.append_turn(&Turn::assistant(&open.session_id, Some(0), "q", old)).unwrap();

        let stats = store.prune_before(now - Duration::days(7)).unwrap();
        assert_eq!(stats.turns, 2);
        let left = store.turns_for_session("chat-a").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].text, "new question");
        assert_eq!(store.turns_for_session(&open.session_id).unwrap().len(), 1);
    }
}
