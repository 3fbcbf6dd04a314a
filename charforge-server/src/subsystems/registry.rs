//! Live conversation sessions, one per owner.
//!
//! The registry is the only place session state lives. Every operation is a
//! single atomic step on one owner's entry; nothing hands out references into
//! the map, and nothing here awaits, so no lock is ever held across a
//! generation or delivery call.

use chrono::{DateTime, Utc};
use charforge_core::Turn;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a session is already active for this owner")]
    AlreadyActive,

    #[error("no session for this owner")]
    NotFound,
}

/// Conversation state for one owner. Callers only ever get copies.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub owner: String,
    pub worldview_name: String,
    pub transcript: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub warned_idle: bool,
    pub warned_at: Option<DateTime<Utc>>,
}

impl Session {
    fn new(owner: &str, worldview_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            worldview_name: worldview_name.to_string(),
            transcript: Vec::new(),
            created_at: now,
            last_activity_at: now,
            warned_idle: false,
            warned_at: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session unless the owner already has one.
    pub fn try_create(&self, owner: &str, worldview_name: &str) -> Result<Session, RegistryError> {
        match self.sessions.entry(owner.to_string()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyActive),
            Entry::Vacant(slot) => {
                let session = Session::new(owner, worldview_name);
                slot.insert(session.clone());
                Ok(session)
            }
        }
    }

    pub fn get(&self, owner: &str) -> Option<Session> {
        self.sessions.get(owner).map(|s| s.value().clone())
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.sessions.contains_key(owner)
    }

    /// Append a USER turn, refresh activity and clear the idle warning.
    /// Returns the session as it is after the append.
    pub fn append_user_turn(&self, owner: &str, text: &str) -> Result<Session, RegistryError> {
        let mut session = self
            .sessions
            .get_mut(owner)
            .ok_or(RegistryError::NotFound)?;
        session.transcript.push(Turn::user(text));
        session.last_activity_at = Utc::now();
        session.warned_idle = false;
        session.warned_at = None;
        Ok(session.value().clone())
    }

    /// Append an ASSISTANT turn to the session `session_id`. Fails if the
    /// owner's session was removed or replaced since the caller read it.
    pub fn append_assistant_turn(
        &self,
        owner: &str,
        session_id: Uuid,
        text: &str,
    ) -> Result<(), RegistryError> {
        let mut session = self
            .sessions
            .get_mut(owner)
            .ok_or(RegistryError::NotFound)?;
        if session.id != session_id {
            return Err(RegistryError::NotFound);
        }
        session.transcript.push(Turn::assistant(text));
        Ok(())
    }

    /// Remove whatever session the owner has. Idempotent.
    pub fn remove(&self, owner: &str) -> Option<Session> {
        self.sessions.remove(owner).map(|(_, s)| s)
    }

    /// Remove the owner's session only if it is still `session_id`.
    pub fn remove_if(&self, owner: &str, session_id: Uuid) -> Option<Session> {
        self.sessions
            .remove_if(owner, |_, s| s.id == session_id)
            .map(|(_, s)| s)
    }

    /// Remove a warned session that is unchanged since the caller read it:
    /// same id, still warned and no USER turn after `observed_activity`.
    pub fn remove_if_still_warned(
        &self,
        owner: &str,
        session_id: Uuid,
        observed_activity: DateTime<Utc>,
    ) -> Option<Session> {
        self.sessions
            .remove_if(owner, |_, s| {
                s.id == session_id && s.warned_idle && s.last_activity_at == observed_activity
            })
            .map(|(_, s)| s)
    }

    /// Record that an idle warning reached the owner. No-op (returns false)
    /// if the session changed identity or saw a USER turn after `observed_activity`.
    pub fn mark_warned(
        &self,
        owner: &str,
        session_id: Uuid,
        observed_activity: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.sessions.get_mut(owner) {
            Some(mut session)
                if session.id == session_id && session.last_activity_at == observed_activity =>
            {
                session.warned_idle = true;
                session.warned_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Snapshot of current owners.
    pub fn owners(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
