//! Error types for capmap_core operations.

use crate::types::{CapabilityId, SessionId};
use thiserror::Error;

/// Core error type for capmap_core operations.
///
/// Lock contention and rejected moves are ordinary traffic in a shared map,
/// so they are reported through this enum like any other outcome. Use
/// [`CapError::kind`] to switch on the category and
/// [`CapError::is_retryable`] to decide whether a gesture may be re-attempted.
#[derive(Error, Debug)]
pub enum CapError {
    /// No capability with the given id exists.
    #[error("capability not found: {0}")]
    CapabilityNotFound(CapabilityId),

    /// No live session with the given id exists.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The capability is already held by another session.
    #[error("capability {capability} is already locked by session {holder}{}", via_suffix(.via))]
    AlreadyLocked {
        /// Capability the caller tried to lock
        capability: CapabilityId,
        /// Session holding the conflicting lock
        holder: SessionId,
        /// Ancestor carrying the conflicting lock, when it is not the capability itself
        via: Option<CapabilityId>,
    },

    /// Unlock attempted by a session that does not hold the lock.
    #[error("capability {capability} is locked by session {holder}, not by the caller")]
    NotHolder {
        /// Capability the caller tried to unlock
        capability: CapabilityId,
        /// Actual holder
        holder: SessionId,
    },

    /// A capability cannot be moved onto itself.
    #[error("capability {0} cannot be moved onto itself")]
    SelfMove(CapabilityId),

    /// The move target lies inside the subtree being moved.
    #[error("cannot move capability {capability} under its own descendant {target}")]
    CycleViolation {
        /// Capability being moved
        capability: CapabilityId,
        /// Requested new parent
        target: CapabilityId,
    },

    /// The capability being moved is claimed by another session.
    #[error("capability {capability} is locked by session {holder}")]
    SourceLocked {
        /// Capability being moved
        capability: CapabilityId,
        /// Session whose lock blocks the move
        holder: SessionId,
    },

    /// The move target is claimed by another session.
    #[error("target capability {target} is locked by session {holder}")]
    TargetLocked {
        /// Requested new parent
        target: CapabilityId,
        /// Session whose lock blocks the move
        holder: SessionId,
    },

    /// The requested parent does not exist.
    #[error("invalid parent: capability {0} does not exist")]
    InvalidParent(CapabilityId),

    /// A content or delete operation touched a node claimed by another session.
    #[error("capability {capability} is locked by session {holder}")]
    Locked {
        /// Capability carrying the foreign lock
        capability: CapabilityId,
        /// Session holding it
        holder: SessionId,
    },

    /// Capability name is empty or too long.
    #[error("invalid capability name: {0}")]
    InvalidName(String),

    /// Nickname already used by a live session (only with unique nicknames enabled).
    #[error("nickname already in use: {0}")]
    NicknameInUse(String),

    /// Tree state violates the forest invariant. The operation was aborted.
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),

    /// A thread panicked while holding the map state.
    #[error("map state poisoned by a panicked writer")]
    StatePoisoned,

    /// Durable storage failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error while encoding records or exports.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error while decoding records or imports.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn via_suffix(via: &Option<CapabilityId>) -> String {
    match via {
        Some(ancestor) => format!(" (inherited from ancestor {})", ancestor),
        None => String::new(),
    }
}

/// Flat error taxonomy shared with hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Reference to a nonexistent capability or session.
    NotFound,
    /// Lock contention.
    AlreadyLocked,
    /// Unlock by the wrong session.
    NotHolder,
    /// Move onto itself.
    SelfMove,
    /// Move under its own descendant.
    CycleViolation,
    /// Moved node claimed by someone else.
    SourceLocked,
    /// Move target claimed by someone else.
    TargetLocked,
    /// Parent does not exist.
    InvalidParent,
    /// Delete or edit blocked by someone else's lock.
    Locked,
    /// Rejected input (names, nicknames, imports).
    Invalid,
    /// Invariant violation, poisoning, storage or I/O failure.
    Internal,
}

impl CapError {
    /// Maps this error onto the flat taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapabilityNotFound(_) | Self::SessionNotFound(_) => ErrorKind::NotFound,
            Self::AlreadyLocked { .. } => ErrorKind::AlreadyLocked,
            Self::NotHolder { .. } => ErrorKind::NotHolder,
            Self::SelfMove(_) => ErrorKind::SelfMove,
            Self::CycleViolation { .. } => ErrorKind::CycleViolation,
            Self::SourceLocked { .. } => ErrorKind::SourceLocked,
            Self::TargetLocked { .. } => ErrorKind::TargetLocked,
            Self::InvalidParent(_) => ErrorKind::InvalidParent,
            Self::Locked { .. } => ErrorKind::Locked,
            Self::InvalidName(_)
            | Self::NicknameInUse(_)
            | Self::Deserialization(_)
            | Self::ConfigError(_) => ErrorKind::Invalid,
            Self::InternalInconsistency(_)
            | Self::StatePoisoned
            | Self::Storage(_)
            | Self::Serialization(_)
            | Self::Io(_) => ErrorKind::Internal,
        }
    }

    /// Returns true for contention errors that may succeed when the user
    /// repeats the same gesture later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AlreadyLocked
                | ErrorKind::SourceLocked
                | ErrorKind::TargetLocked
                | ErrorKind::Locked
        )
    }

    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::AlreadyLocked { .. } | Self::Locked { .. } | Self::SourceLocked { .. } => {
                Some("Another user is editing this branch. Try again once they unlock it.")
            }
            Self::TargetLocked { .. } => {
                Some("The drop target is being edited by another user. Pick another target or wait.")
            }
            Self::NotHolder { .. } => Some("Only the session holding a lock can release it."),
            Self::SelfMove(_) | Self::CycleViolation { .. } => {
                Some("A capability cannot be placed inside itself. Choose a target outside its subtree.")
            }
            Self::SessionNotFound(_) => Some("The session has ended. Join again to continue."),
            Self::InternalInconsistency(_) => {
                Some("The capability tree is damaged. Run 'capmap check' and restore from an export.")
            }
            Self::NicknameInUse(_) => Some("Pick a different nickname."),
            _ => None,
        }
    }
}

/// Convenience Result type for capmap_core operations.
pub type Result<T> = std::result::Result<T, CapError>;
