//! capmap Core Library
//!
//! A shared capability tree edited concurrently by many sessions, providing:
//! - An arena-backed tree store with ordered children
//! - Advisory session locks that propagate down subtrees
//! - Cycle- and lock-safe structural moves
//! - Presence tracking and a versioned change feed
//!
//! # Quick Start
//!
//! ```
//! use capmap_core::{CapabilityMap, LockState, MoveRequest};
//!
//! let map = CapabilityMap::in_memory();
//! let alice = map.join("alice").unwrap().session_id;
//! let bob = map.join("bob").unwrap().session_id;
//!
//! let sales = map.create_node(&alice, None, "Sales", "", None).unwrap().id;
//! let leads = map.create_node(&alice, Some(sales), "Leads", "", None).unwrap().id;
//!
//! // Locking a branch claims everything below it.
//! map.lock_node(&alice, sales).unwrap();
//! assert!(matches!(
//!     map.effective_lock_state(&bob, leads).unwrap(),
//!     LockState::BlockedByAncestor { .. }
//! ));
//!
//! // Bob cannot restructure the branch, Alice can.
//! assert!(map.move_node(&bob, MoveRequest::to_root(leads, 0)).is_err());
//! assert!(map.move_node(&alice, MoveRequest::to_root(leads, 0)).is_ok());
//! ```
//!
//! # Features
//!
//! ## Change Feed
//!
//! Every admitted change gets a version. Hosts poll for what they missed:
//!
//! ```
//! use capmap_core::CapabilityMap;
//!
//! let map = CapabilityMap::in_memory();
//! let seen = map.current_version().unwrap();
//!
//! let alice = map.join("alice").unwrap().session_id;
//! map.create_node(&alice, None, "Sales", "", None).unwrap();
//!
//! let changes = map.changes_since(seen).unwrap();
//! assert_eq!(changes.events.len(), 2);
//! assert!(!changes.truncated);
//! ```
//!
//! ## Import and Export
//!
//! ```
//! use capmap_core::CapabilityMap;
//!
//! let map = CapabilityMap::in_memory();
//! let alice = map.join("alice").unwrap().session_id;
//! map.import_json(&alice, r#"[{"name":"Sales","children":[{"name":"Leads"}]}]"#)
//!     .unwrap();
//!
//! let exported = map.export().unwrap();
//! assert_eq!(exported[0].children[0].name, "Leads");
//! ```

mod config;
mod error;
mod feed;
mod locks;
mod map;
mod mover;
mod presence;
mod storage;
mod tree;
mod types;

pub use config::{Config, FeedConfig, PresenceConfig, StorageConfig, TreeConfig, CONFIG_FILE};
pub use error::{CapError, ErrorKind, Result};
pub use feed::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSet, TreeAction};
pub use locks::LockRegistry;
pub use map::{CapabilityMap, DATA_DIR, MAX_JSON_DEPTH};
pub use mover::{execute_move, validate_move};
pub use presence::{Presence, Session};
pub use storage::{MemoryStorage, RedbStorage, TreeMutation, TreeStorage, STORAGE_SCHEMA_VERSION};
pub use tree::{Ancestors, TreeImage, TreeStore};
pub use types::*;

/// Time provider trait for testing.
///
/// Allows injecting controlled time into a map for testing activity and
/// change timestamps. Only used when explicitly set via `with_time_provider()`.
pub trait TimeProvider: Send + Sync {
    /// Returns the current Unix timestamp in seconds.
    fn now(&self) -> i64;
}

impl<F> TimeProvider for F
where
    F: Fn() -> i64 + Send + Sync,
{
    fn now(&self) -> i64 {
        self()
    }
}
