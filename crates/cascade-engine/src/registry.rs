//! In-memory session registry.
//!
//! One entry per live session, at most one unexpired entry per conversation.
//! Expiry is lazy: entries are checked against the TTL when looked up, and
//! there is no background sweep.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use cascade_core::{CascadeError, CascadeResult, ConversationId, SessionId};
use time::{Duration, OffsetDateTime};

use crate::clock::Clock;

pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(24);

/// Generate a new session ID: `ses_<ulid>`
pub fn new_session_id() -> SessionId {
    format!("ses_{}", ulid::Ulid::new().to_string().to_lowercase())
}

#[derive(Clone)]
pub struct SessionEntry {
    pub session_id: SessionId,
    pub conversation_id: ConversationId,
    pub started_at: OffsetDateTime,
    pub last_activity_at: OffsetDateTime,
    /// Analyzer credential. Lives only here, never persisted.
    pub credential: String,
    /// Held for the duration of one engine step.
    pub step: Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for SessionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEntry")
            .field("session_id", &self.session_id)
            .field("conversation_id", &self.conversation_id)
            .field("started_at", &self.started_at)
            .field("last_activity_at", &self.last_activity_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum Lookup {
    Active(SessionEntry),
    /// Found but past its TTL. The entry has already been removed.
    Expired(SessionEntry),
    Missing,
}

pub struct SessionRegistry {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: Mutex<HashMap<SessionId, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_expired(&self, entry: &SessionEntry, now: OffsetDateTime) -> bool {
        now - entry.last_activity_at > self.ttl
    }

    /// Register a new session for `conversation_id`.
    ///
    /// Fails with `Conflict` if the conversation already has an unexpired
    /// session. Expired entries for the conversation are evicted and returned
    /// so the caller can clean up their artifacts.
    pub fn create(
        &self,
        conversation_id: &str,
        credential: &str,
    ) -> CascadeResult<(SessionEntry, Vec<SessionEntry>)> {
        let now = self.clock.now();
        let mut entries = self.entries();

        let mut evicted = Vec::new();
        let ids: Vec<SessionId> = entries
            .values()
            .filter(|e| e.conversation_id == conversation_id)
            .map(|e| e.session_id.clone())
            .collect();
        for id in ids {
            let expired = entries
                .get(&id)
                .is_some_and(|e| self.is_expired(e, now));
            if !expired {
                return Err(CascadeError::Conflict {
                    conversation_id: conversation_id.to_string(),
                    session_id: id,
                });
            }
            if let Some(old) = entries.remove(&id) {
                evicted.push(old);
            }
        }

        let entry = SessionEntry {
            session_id: new_session_id(),
            conversation_id: conversation_id.to_string(),
            started_at: now,
            last_activity_at: now,
            credential: credential.to_string(),
            step: Arc::new(tokio::sync::Mutex::new(())),
        };
        entries.insert(entry.session_id.clone(), entry.clone());
        tracing::debug!(session_id = %entry.session_id, conversation_id, "session registered");
        Ok((entry, evicted))
    }

    pub fn get(&self, session_id: &str) -> Lookup {
        let now = self.clock.now();
        let mut entries = self.entries();
        let expired = match entries.get(session_id) {
            None => return Lookup::Missing,
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            entries
                .remove(session_id)
                .map_or(Lookup::Missing, Lookup::Expired)
        } else {
            entries
                .get(session_id)
                .cloned()
                .map_or(Lookup::Missing, Lookup::Active)
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries().contains_key(session_id)
    }

    /// Refresh `last_activity_at`. Returns the new timestamp, or None if
    /// the entry is gone.
    pub fn touch(&self, session_id: &str) -> Option<OffsetDateTime> {
        let now = self.clock.now();
        let mut entries = self.entries();
        let entry = entries.get_mut(session_id)?;
        entry.last_activity_at = now;
        Some(now)
    }

    pub fn remove(&self, session_id: &str) -> Option<SessionEntry> {
        self.entries().remove(session_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
