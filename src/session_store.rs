use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{McqItem, McqSession};

/// In-memory MCQ answer-key cache with TTL-based, lazy expiry.
///
/// Entries are purged opportunistically: every store sweeps out expired
/// sessions and every lookup removes the entry it finds expired. There is no
/// background timer and no capacity bound; the store empties itself on
/// process restart. One instance lives in `AppState` for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct McqSessionStore {
    sessions: Arc<RwLock<HashMap<String, McqSession>>>,
    ttl_seconds: i64,
}

impl McqSessionStore {
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl_seconds,
        }
    }

    /// Cache a generated MCQ set and return its fresh session id. The
    /// answer key is the trimmed `answer` of each item, index-aligned with
    /// the stored items.
    pub async fn store(&self, items: Vec<McqItem>) -> String {
        self.store_at(items, Utc::now()).await
    }

    /// Look up an unexpired session. A session found past its expiry is
    /// removed and reported as a miss, matching the write-path purge.
    pub async fn get(&self, session_id: &str) -> Option<McqSession> {
        self.get_at(session_id, Utc::now()).await
    }

    pub(crate) async fn store_at(&self, items: Vec<McqItem>, now: DateTime<Utc>) -> String {
        let mut sessions = self.sessions.write().await;
        Self::purge_expired(&mut sessions, now);

        let session_id = Uuid::new_v4().to_string();
        let answers = items
            .iter()
            .map(|item| item.answer.trim().to_string())
            .collect();

        sessions.insert(
            session_id.clone(),
            McqSession {
                id: session_id.clone(),
                items,
                answers,
                expires_at: now + Duration::seconds(self.ttl_seconds),
            },
        );

        debug!(
            session_id = %session_id,
            session_count = sessions.len(),
            "Stored MCQ session"
        );
        session_id
    }

    pub(crate) async fn get_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<McqSession> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(session_id) {
            Some(session) if session.expires_at > now => Some(session.clone()),
            Some(_) => {
                sessions.remove(session_id);
                debug!(session_id = %session_id, "Removed expired MCQ session on read");
                None
            }
            None => None,
        }
    }

    fn purge_expired(sessions: &mut HashMap<String, McqSession>, now: DateTime<Utc>) {
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, session)| session.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in expired {
            sessions.remove(&id);
            debug!(session_id = %id, "Purged expired MCQ session");
        }
    }

    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}
