//! Presence tracking for connected sessions.

use crate::config::PresenceConfig;
use crate::error::{CapError, Result};
use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A connected user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub session_id: SessionId,

    /// Display name.
    pub nickname: String,

    /// When the session joined (Unix timestamp).
    pub joined_at: i64,

    /// Last command issued by the session (Unix timestamp).
    pub last_active: i64,
}

impl Session {
    /// Seconds since the session last issued a command.
    pub fn idle_for(&self, now: i64) -> Duration {
        Duration::from_secs(now.saturating_sub(self.last_active).max(0) as u64)
    }
}

/// Live sessions in join order.
#[derive(Debug, Clone, Default)]
pub struct Presence {
    sessions: Vec<Session>,
    unique_nicknames: bool,
}

impl Presence {
    /// Creates an empty tracker.
    pub fn new(config: &PresenceConfig) -> Self {
        Self {
            sessions: Vec::new(),
            unique_nicknames: config.unique_nicknames,
        }
    }

    /// Registers a session.
    ///
    /// Joining again with a live session id returns the existing session
    /// unchanged apart from its activity time. Returns the session and whether
    /// it is new.
    pub fn join(
        &mut self,
        session_id: SessionId,
        nickname: &str,
        now: i64,
    ) -> Result<(Session, bool)> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(CapError::InvalidName("nickname must not be empty".to_string()));
        }

        if let Some(existing) = self.sessions.iter_mut().find(|s| s.session_id == session_id) {
            existing.last_active = now;
            return Ok((existing.clone(), false));
        }

        if self.unique_nicknames && self.sessions.iter().any(|s| s.nickname == nickname) {
            return Err(CapError::NicknameInUse(nickname.to_string()));
        }

        let session = Session {
            session_id,
            nickname: nickname.to_string(),
            joined_at: now,
            last_active: now,
        };
        self.sessions.push(session.clone());
        Ok((session, true))
    }

    /// Removes a session. Lock release is the caller's job.
    pub fn leave(&mut self, session_id: &SessionId) -> Result<Session> {
        let index = self
            .sessions
            .iter()
            .position(|s| &s.session_id == session_id)
            .ok_or_else(|| CapError::SessionNotFound(session_id.clone()))?;
        Ok(self.sessions.remove(index))
    }

    /// Looks up a live session.
    pub fn get(&self, session_id: &SessionId) -> Result<&Session> {
        self.sessions
            .iter()
            .find(|s| &s.session_id == session_id)
            .ok_or_else(|| CapError::SessionNotFound(session_id.clone()))
    }

    /// True when the session is live.
    pub fn is_active(&self, session_id: &SessionId) -> bool {
        self.sessions.iter().any(|s| &s.session_id == session_id)
    }

    /// Records activity for a live session.
    pub fn touch(&mut self, session_id: &SessionId, now: i64) -> Result<()> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| &s.session_id == session_id)
            .ok_or_else(|| CapError::SessionNotFound(session_id.clone()))?;
        session.last_active = now;
        Ok(())
    }

    /// Live sessions in join order.
    pub fn list(&self) -> &[Session] {
        &self.sessions
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions idle for at least `threshold`, in join order.
    ///
    /// Locks are never expired automatically; hosts use this to decide whom
    /// to disconnect.
    pub fn idle(&self, now: i64, threshold: Duration) -> Vec<&Session> {
        self.sessions
            .iter()
            .filter(|s| s.idle_for(now) >= threshold)
            .collect()
    }
}
