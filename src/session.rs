//! Chat sessions keyed by chat id.
//!
//! A session holds the bounded [`ConversationBuffer`] the model sees and the
//! full transcript used for export. Each session sits behind its own async
//! mutex so concurrent requests for one chat are serialized while different
//! chats proceed independently.
//!
//! Sessions enter the store only after their first successful turn, and
//! [`SessionStore::sweep_idle`] drops the ones nobody has used for a while.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::conversation::ConversationBuffer;
use crate::models::Turn;

#[derive(Debug)]
pub struct ChatSession {
    pub buffer: ConversationBuffer,
    pub transcript: Vec<Turn>,
    last_used: Instant,
}

impl ChatSession {
    /// Starts a session from prior turns supplied by the client.
    pub fn seeded(max_turns: usize, history: &[Turn]) -> Self {
        Self {
            buffer: ConversationBuffer::from_history(max_turns, history.iter().cloned()),
            transcript: history.to_vec(),
            last_used: Instant::now(),
        }
    }

    /// Copies the newest `n` buffer turns into the transcript and marks the
    /// session as used. Called after a successful exchange.
    pub fn record_latest(&mut self, n: usize) {
        let turns: Vec<&Turn> = self.buffer.turns().collect();
        let start = turns.len().saturating_sub(n);
        self.transcript
            .extend(turns[start..].iter().map(|t| (*t).clone()));
        self.last_used = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }
}

pub type SessionHandle = Arc<Mutex<ChatSession>>;

pub struct SessionStore {
    max_turns: usize,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `chat_id` when it is non-blank, otherwise a fresh UUID.
    pub fn resolve_id(chat_id: Option<&str>) -> String {
        match chat_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    /// Builds a detached session seeded with `history`. It becomes visible
    /// to other requests once passed to [`SessionStore::insert`].
    pub fn start(&self, history: &[Turn]) -> ChatSession {
        ChatSession::seeded(self.max_turns, history)
    }

    /// Stores `session` under `chat_id` and returns its handle. If another
    /// request stored the same id first, that session is kept and the new
    /// session's transcript is appended to it.
    pub async fn insert(&self, chat_id: &str, session: ChatSession) -> SessionHandle {
        let existing = {
            let mut sessions = self.write();
            match sessions.entry(chat_id.to_string()) {
                Entry::Vacant(slot) => {
                    tracing::debug!(chat_id, turns = session.transcript.len(), "new chat session");
                    return slot.insert(Arc::new(Mutex::new(session))).clone();
                }
                Entry::Occupied(slot) => slot.get().clone(),
            }
        };

        {
            let mut current = existing.lock().await;
            for turn in session.transcript {
                current.buffer.push(turn.clone());
                current.transcript.push(turn);
            }
            current.last_used = Instant::now();
        }
        existing
    }

    pub fn get(&self, chat_id: &str) -> Option<SessionHandle> {
        self.read().get(chat_id).cloned()
    }

    /// Drops sessions idle for at least `max_idle`. Sessions busy with a
    /// turn are kept. Returns how many were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, handle| match handle.try_lock() {
            Ok(session) => session.idle_for() < max_idle,
            Err(_) => true,
        });
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, SessionHandle>> {
        match self.sessions.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, SessionHandle>> {
        match self.sessions.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    #[tokio::test]
    async fn new_session_is_seeded_from_history() {
        let store = SessionStore::new(5);
        let history = vec![
            Turn::new(Role::User, "hi"),
            Turn::new(Role::Assistant, "hello"),
        ];
        let session = store.start(&history);
        assert_eq!(session.buffer.len(), 2);
        assert_eq!(session.transcript.len(), 2);
        assert!(store.is_empty());

        store.insert("chat-1", session).await;
        let stored = store.get("chat-1").unwrap();
        assert_eq!(stored.lock().await.transcript.len(), 2);
    }

    #[tokio::test]
    async fn racing_insert_appends_to_existing_session() {
        let store = SessionStore::new(5);
        let mut first = store.start(&[]);
        first.buffer.add(Role::User, "q1");
        first.buffer.add(Role::Assistant, "a1");
        first.record_latest(2);
        store.insert("chat-1", first).await;

        let mut second = store.start(&[]);
        second.buffer.add(Role::User, "q2");
        second.buffer.add(Role::Assistant, "a2");
        second.record_latest(2);
        let handle = store.insert("chat-1", second).await;

        assert_eq!(store.len(), 1);
        let session = handle.lock().await;
        let contents: Vec<&str> = session.transcript.iter().map(|t| t.content()).collect();
        assert_eq!(contents, vec!["q1", "a1", "q2", "a2"]);
        assert_eq!(session.buffer.len(), 4);
    }

    #[test]
    fn missing_id_generates_one() {
        let a = SessionStore::resolve_id(None);
        let b = SessionStore::resolve_id(Some("  "));
        assert_ne!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
        assert_eq!(SessionStore::resolve_id(Some("chat-1")), "chat-1");
        assert!(SessionStore::new(5).get("unknown").is_none());
    }

    #[tokio::test]
    async fn sweep_drops_idle_sessions() {
        let store = SessionStore::new(5);
        store.insert("old", store.start(&[])).await;
        assert_eq!(store.sweep_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);

        assert_eq!(store.sweep_idle(Duration::ZERO), 1);
        assert!(store.get("old").is_none());
    }

    #[tokio::test]
    async fn sweep_keeps_sessions_mid_turn() {
        let store = SessionStore::new(5);
        let handle = store.insert("busy", store.start(&[])).await;
        let _guard = handle.lock().await;
        assert_eq!(store.sweep_idle(Duration::ZERO), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn transcript_outlives_buffer_capacity() {
        let mut session = ChatSession::seeded(1, &[]);
        for i in 0..3 {
            session.buffer.add(Role::User, format!("q{}", i));
            session.buffer.add(Role::Assistant, format!("a{}", i));
            session.record_latest(2);
        }
        assert_eq!(session.buffer.len(), 2);
        assert_eq!(session.transcript.len(), 6);
        assert_eq!(session.transcript[0].content(), "q0");
        assert_eq!(session.transcript[5].content(), "a2");
    }
}
