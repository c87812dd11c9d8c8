//! Session history storage for the agent endpoint.
//!
//! Message histories are keyed by session id and held in a bounded store:
//! entries expire after a TTL and the oldest session is evicted when the
//! capacity is reached. Nothing here is global — the server owns one store
//! and passes it around explicitly.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One conversational turn as exposed over the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

struct SessionEntry {
    turns: Vec<ChatTurn>,
    last_active: Instant,
    seq: u64,
}

/// Bounded, TTL-evicting map from session id to message history.
pub struct SessionStore {
    inner: Mutex<Inner>,
    max_sessions: usize,
    ttl: Duration,
}

struct Inner {
    sessions: HashMap<String, SessionEntry>,
    counter: u64,
}

impl SessionStore {
    pub fn new(max_sessions: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                counter: 0,
            }),
            max_sessions: max_sessions.max(1),
            ttl,
        }
    }

    /// History for a session; empty when unknown or expired.
    pub fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        let mut inner = self.inner.lock().expect("session store poisoned");
        Self::purge_expired(&mut inner, self.ttl);
        inner
            .sessions
            .get(session_id)
            .map(|entry| entry.turns.clone())
            .unwrap_or_default()
    }

    /// Append turns to a session, creating it if needed.
    pub fn append(&self, session_id: &str, turns: &[ChatTurn]) {
        let mut inner = self.inner.lock().expect("session store poisoned");
        Self::purge_expired(&mut inner, self.ttl);

        inner.counter += 1;
        let seq = inner.counter;

        let entry = inner
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionEntry {
                turns: Vec::new(),
                last_active: Instant::now(),
                seq,
            });
        entry.turns.extend_from_slice(turns);
        entry.last_active = Instant::now();
        entry.seq = seq;

        // Capacity bound: evict the least recently touched session.
        while inner.sessions.len() > self.max_sessions {
            if let Some(oldest) = inner
                .sessions
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(id, _)| id.clone())
            {
                debug!("Evicting session '{}' (capacity reached)", oldest);
                inner.sessions.remove(&oldest);
            }
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let mut inner = self.inner.lock().expect("session store poisoned");
        Self::purge_expired(&mut inner, self.ttl);
        inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(inner: &mut Inner, ttl: Duration) {
        if ttl.is_zero() {
            return; // zero TTL disables expiry rather than evicting everything
        }
        let now = Instant::now();
        inner
            .sessions
            .retain(|_, entry| now.duration_since(entry.last_active) < ttl);
    }
}

impl Default for SessionStore {
    /// 1024 sessions, one hour of inactivity.
    fn default() -> Self {
        Self::new(1024, Duration::from_secs(3600))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_round_trips_appended_turns() {
        let store = SessionStore::default();

        store.append("s1", &[ChatTurn::user("Hallo"), ChatTurn::assistant("Hi!")]);
        store.append("s1", &[ChatTurn::user("Wie lang ist die Probezeit?")]);

        let history = store.history("s1");
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].role, "assistant");
        assert_eq!(history[2].content, "Wie lang ist die Probezeit?");
    }

    #[test]
    fn unknown_session_has_empty_history() {
        let store = SessionStore::default();
        assert!(store.history("nope").is_empty());
    }

    #[test]
    fn sessions_are_isolated() {
        let store = SessionStore::default();
        store.append("a", &[ChatTurn::user("first")]);
        store.append("b", &[ChatTurn::user("second")]);

        assert_eq!(store.history("a").len(), 1);
        assert_eq!(store.history("b").len(), 1);
        assert_eq!(store.history("a")[0].content, "first");
    }

    #[test]
    fn expired_sessions_are_purged() {
        let store = SessionStore::new(16, Duration::from_nanos(1));
        store.append("old", &[ChatTurn::user("hello")]);

        std::thread::sleep(Duration::from_millis(2));
        assert!(store.history("old").is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn capacity_evicts_least_recently_touched() {
        let store = SessionStore::new(2, Duration::from_secs(3600));
        store.append("a", &[ChatTurn::user("1")]);
        store.append("b", &[ChatTurn::user("2")]);
        store.append("a", &[ChatTurn::user("3")]); // touch a again
        store.append("c", &[ChatTurn::user("4")]); // evicts b

        assert_eq!(store.len(), 2);
        assert!(store.history("b").is_empty());
        assert_eq!(store.history("a").len(), 2);
        assert_eq!(store.history("c").len(), 1);
    }

    #[test]
    fn zero_ttl_disables_expiry() {
        let store = SessionStore::new(8, Duration::ZERO);
        store.append("keep", &[ChatTurn::user("hi")]);
        assert_eq!(store.history("keep").len(), 1);
    }

    #[test]
    fn turn_constructors_set_roles() {
        assert_eq!(ChatTurn::user("x").role, "user");
        assert_eq!(ChatTurn::assistant("y").role, "assistant");
    }
}
