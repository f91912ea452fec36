//! TTL-bounded session state.
//!
//! Holds per-conversation scratch data that should NOT be part of the durable
//! conversation log — currently the last generated routing plan, kept around
//! for debugging. Entries expire lazily on access.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

/// Time source, injectable so expiry is testable without sleeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str, key: &str) -> Option<Value>;
    async fn put(&self, session_id: &str, key: &str, value: Value, ttl: Duration);
    /// Drop a session's entries immediately, ahead of their TTL.
    async fn expire(&self, session_id: &str);
}

struct Entry {
    value: Value,
    expires_at: DateTime<Utc>,
}

pub struct InMemorySessionStore {
    clock: Arc<dyn Clock>,
    sessions: Mutex<HashMap<String, HashMap<String, Entry>>>,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Drop every expired entry. Runs on each access; session counts are
    /// small enough that a sweeper task is not worth its complexity.
    fn sweep(&self, sessions: &mut HashMap<String, HashMap<String, Entry>>, now: DateTime<Utc>) {
        let mut dropped = 0usize;
        sessions.retain(|_, entries| {
            entries.retain(|_, e| {
                let live = e.expires_at > now;
                if !live {
                    dropped += 1;
                }
                live
            });
            !entries.is_empty()
        });
        if dropped > 0 {
            debug!(dropped, "Expired session entries swept");
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions, now);
        sessions
            .get(session_id)
            .and_then(|entries| entries.get(key))
            .map(|e| e.value.clone())
    }

    async fn put(&self, session_id: &str, key: &str, value: Value, ttl: Duration) {
        let now = self.clock.now();
        let expires_at = now + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        let mut sessions = self.sessions.lock().await;
        self.sweep(&mut sessions, now);
        sessions.entry(session_id.to_string()).or_default().insert(
            key.to_string(),
            Entry { value, expires_at },
        );
    }

    async fn expire(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        if sessions.remove(session_id).is_some() {
            debug!(session_id, "Session expired on request");
        }
    }
}
