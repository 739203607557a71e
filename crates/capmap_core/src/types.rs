//! Core data types for capmap.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Stable identifier of a capability. Never reused within one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(pub u64);

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CapabilityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().trim_start_matches('#').parse().map(CapabilityId)
    }
}

/// Identity of a connected session, unique per login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random session id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SessionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A node of the capability tree as stored in the arena.
///
/// `parent_id` and `children` are kept mutually consistent by the tree store:
/// if `a.parent_id == Some(b.id)` then `a.id` appears exactly once in
/// `b.children`, and the order of `children` is the display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    /// Stable identifier.
    pub id: CapabilityId,
    /// Short label, never empty.
    pub name: String,
    /// Markdown free text, may be empty.
    pub description: String,
    /// Owning capability, `None` for roots.
    pub parent_id: Option<CapabilityId>,
    /// Ordered child ids.
    pub children: Vec<CapabilityId>,
}

/// Nested, owned form of a subtree used by export and import.
///
/// `id` is filled on export and ignored on import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityNode {
    /// Identifier of the exported node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CapabilityId>,
    /// Node name.
    pub name: String,
    /// Node description.
    #[serde(default)]
    pub description: String,
    /// Ordered children.
    #[serde(default)]
    pub children: Vec<CapabilityNode>,
}

impl CapabilityNode {
    /// Creates a leaf node without an id, ready for import.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: String::new(),
            children: Vec::new(),
        }
    }

    /// Adds a child and returns self.
    pub fn with_child(mut self, child: CapabilityNode) -> Self {
        self.children.push(child);
        self
    }

    /// Sets the description and returns self.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Number of nodes in this subtree, including self.
    pub fn count(&self) -> usize {
        let mut stack = vec![self];
        let mut count = 0;
        while let Some(node) = stack.pop() {
            count += 1;
            stack.extend(node.children.iter());
        }
        count
    }

    /// Number of levels in this subtree; a leaf has depth 1.
    pub fn depth(&self) -> usize {
        let mut stack = vec![(self, 1)];
        let mut deepest = 0;
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            stack.extend(node.children.iter().map(|child| (child, depth + 1)));
        }
        deepest
    }
}

/// Effective lock state of a capability as seen by one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LockState {
    /// Nobody restricts structural edits for the observer.
    Free,
    /// The observer holds the lock on this node.
    LockedBySelf,
    /// Another session holds the lock on this node.
    LockedByOther {
        /// Holding session
        holder: SessionId,
    },
    /// A strict ancestor is held by another session.
    BlockedByAncestor {
        /// Nearest ancestor held by another session
        ancestor: CapabilityId,
        /// Session holding that ancestor
        holder: SessionId,
    },
}

impl LockState {
    /// True when the observer may not move, delete, drop onto or edit the node.
    pub fn blocks_observer(&self) -> bool {
        matches!(self, Self::LockedByOther { .. } | Self::BlockedByAncestor { .. })
    }

    /// The foreign session restricting the observer, if any.
    pub fn blocking_holder(&self) -> Option<&SessionId> {
        match self {
            Self::LockedByOther { holder } | Self::BlockedByAncestor { holder, .. } => Some(holder),
            Self::Free | Self::LockedBySelf => None,
        }
    }

    /// Short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::LockedBySelf => "locked-by-self",
            Self::LockedByOther { .. } => "locked-by-other",
            Self::BlockedByAncestor { .. } => "blocked-by-ancestor",
        }
    }
}

/// Subtree annotated with effective lock state for one observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeView {
    /// Capability id.
    pub id: CapabilityId,
    /// Capability name.
    pub name: String,
    /// Capability description.
    pub description: String,
    /// Effective lock state for the observer.
    pub lock: LockState,
    /// Ordered children.
    pub children: Vec<TreeView>,
}

// Nested values can be as deep as the tree; unlink children before the
// default drop so it never recurses.
impl Drop for TreeView {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut view) = pending.pop() {
            pending.append(&mut view.children);
        }
    }
}

impl Drop for CapabilityNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// A live session together with the locks it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    /// Session identity.
    pub session_id: SessionId,
    /// Display name, not necessarily unique.
    pub nickname: String,
    /// When the session joined (Unix timestamp).
    pub joined_at: i64,
    /// Last time the session issued a command (Unix timestamp).
    pub last_active: i64,
    /// Capabilities this session holds an exclusive lock on.
    pub locked_capabilities: BTreeSet<CapabilityId>,
}

/// Content changes for an existing capability. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityUpdate {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
}

/// Proposed structural move: drop `capability` as a child of `target_parent`
/// at `index`. A `None` target moves it to the root level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Capability to move together with its subtree.
    pub capability: CapabilityId,
    /// New parent, `None` for the root level.
    pub target_parent: Option<CapabilityId>,
    /// Position among the new siblings, clamped to `[0, len]`.
    pub index: usize,
}

impl MoveRequest {
    /// Move `capability` under `target` at `index`.
    pub fn under(capability: CapabilityId, target: CapabilityId, index: usize) -> Self {
        Self {
            capability,
            target_parent: Some(target),
            index,
        }
    }

    /// Move `capability` to the root level at `index`.
    pub fn to_root(capability: CapabilityId, index: usize) -> Self {
        Self {
            capability,
            target_parent: None,
            index,
        }
    }
}

/// Where a move took a capability from and to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// Capability that moved.
    pub capability: CapabilityId,
    /// Previous parent.
    pub from_parent: Option<CapabilityId>,
    /// Previous position among siblings.
    pub from_index: usize,
    /// New parent.
    pub to_parent: Option<CapabilityId>,
    /// Actual position after clamping.
    pub to_index: usize,
}

/// Result of a successful lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The lock was granted.
    Acquired,
    /// The caller already held it; nothing changed.
    AlreadyHeld,
}

/// Result of a successful unlock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockOutcome {
    /// The caller's lock was released.
    Released,
    /// Nobody held the lock; nothing changed.
    NotLocked,
}
