//! Versioned change feed.
//!
//! Every admitted state change gets the next global version and is appended
//! here. Hosts poll [`ChangeFeed::since`] to fan updates out to sessions; the
//! retained window also serves as the audit log.

use crate::types::{CapabilityId, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Kind of structural or content change to the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeAction {
    /// A capability was created.
    Created,
    /// Name or description changed.
    Updated,
    /// A subtree was removed.
    Deleted,
    /// A subtree was reparented or reordered.
    Moved,
    /// The whole tree was replaced by an import.
    Imported,
    /// The whole tree was cleared.
    Reset,
}

/// What changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeKind {
    /// The tree changed.
    TreeChanged {
        /// Change performed
        action: TreeAction,
        /// Capability at the root of the change, if it concerns one node
        capability: Option<CapabilityId>,
    },
    /// A lock was taken (`holder` set) or released (`holder` empty).
    LockChanged {
        /// Capability whose lock changed
        capability: CapabilityId,
        /// New holder
        holder: Option<SessionId>,
    },
    /// Several locks were released at once.
    LocksCleared {
        /// Session whose locks were cleared, `None` for all sessions
        session: Option<SessionId>,
        /// Released capabilities
        released: Vec<CapabilityId>,
    },
    /// A session joined or left.
    PresenceChanged {
        /// Session concerned
        session: SessionId,
        /// Its nickname
        nickname: String,
        /// True on join, false on leave
        joined: bool,
    },
}

/// One admitted state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// State version after this change.
    pub version: u64,
    /// When the change was admitted (Unix timestamp).
    pub at: i64,
    /// Session that caused it.
    pub actor: SessionId,
    /// What changed.
    pub kind: ChangeKind,
}

/// Changes after a given version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Current state version.
    pub version: u64,
    /// Retained events newer than the requested version, oldest first.
    pub events: Vec<ChangeEvent>,
    /// True when events the caller has not seen were dropped, or the
    /// requested version is unknown. The caller must re-read full state.
    pub truncated: bool,
}

/// Bounded log of state changes.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    version: u64,
    events: VecDeque<ChangeEvent>,
    retention: usize,
}

impl ChangeFeed {
    /// Creates an empty feed keeping at most `retention` events.
    pub fn new(retention: usize) -> Self {
        Self {
            version: 0,
            events: VecDeque::with_capacity(retention.min(1024)),
            retention: retention.max(1),
        }
    }

    /// Current state version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Appends a change and returns its version.
    pub fn record(&mut self, at: i64, actor: &SessionId, kind: ChangeKind) -> u64 {
        self.version += 1;
        if self.events.len() == self.retention {
            self.events.pop_front();
        }
        self.events.push_back(ChangeEvent {
            version: self.version,
            at,
            actor: actor.clone(),
            kind,
        });
        self.version
    }

    /// Events with a version greater than `version`.
    pub fn since(&self, version: u64) -> ChangeSet {
        if version > self.version {
            return ChangeSet {
                version: self.version,
                events: Vec::new(),
                truncated: true,
            };
        }

        let oldest = self.events.front().map(|e| e.version).unwrap_or(self.version + 1);
        let truncated = version + 1 < oldest && version < self.version;
        let events = self
            .events
            .iter()
            .filter(|e| e.version > version)
            .cloned()
            .collect();

        ChangeSet {
            version: self.version,
            events,
            truncated,
        }
    }

    /// All retained events, oldest first.
    pub fn retained(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter()
    }
}
