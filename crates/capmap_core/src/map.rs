//! Capability map handle providing the main capmap API.

use crate::config::Config;
use crate::error::{CapError, Result};
use crate::feed::{ChangeEvent, ChangeFeed, ChangeKind, ChangeSet, TreeAction};
use crate::locks::LockRegistry;
use crate::mover;
use crate::presence::{Presence, Session};
use crate::storage::{MemoryStorage, RedbStorage, TreeMutation, TreeStorage};
use crate::tree::TreeStore;
use crate::types::{
    Capability, CapabilityId, CapabilityNode, CapabilityUpdate, LockOutcome, LockState,
    MoveOutcome, MoveRequest, SessionId, SessionView, TreeView, UnlockOutcome,
};
use crate::TimeProvider;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Name of the data directory created by [`CapabilityMap::init`].
pub const DATA_DIR: &str = ".capmap";

/// Deepest forest `export_json` writes. Each level nests an object and an
/// array, and serde_json reads at most 128 nested values.
pub const MAX_JSON_DEPTH: usize = 60;

/// Tree, locks, presence and feed: one logical resource behind one lock.
#[derive(Debug)]
struct MapState {
    tree: TreeStore,
    locks: LockRegistry,
    presence: Presence,
    feed: ChangeFeed,
}

impl MapState {
    fn view(&self, session: &Session) -> SessionView {
        SessionView {
            session_id: session.session_id.clone(),
            nickname: session.nickname.clone(),
            joined_at: session.joined_at,
            last_active: session.last_active,
            locked_capabilities: self.locks.held_by(&session.session_id),
        }
    }

    /// Verifies the session is live and records its activity.
    fn admit(&mut self, session: &SessionId, now: i64) -> Result<()> {
        self.presence.touch(session, now)
    }
}

/// Shared capability map.
///
/// All mutations go through one `RwLock` write guard: validation and
/// execution of a command happen in the same critical section, so no two
/// commands can validate against the same pre-mutation state. Queries share
/// the read guard and always see a state between two commands.
///
/// Storage writes are queued inside the critical section and drained after
/// the guard is released, in admission order.
pub struct CapabilityMap {
    /// Data directory, for maps opened from disk.
    root: Option<PathBuf>,
    /// Tree, locks, presence and change feed.
    state: RwLock<MapState>,
    /// Durable tree store.
    storage: Box<dyn TreeStorage>,
    /// Mutations admitted but not yet written.
    pending: Mutex<VecDeque<TreeMutation>>,
    /// Serializes storage writers so queued mutations land in order.
    persist: Mutex<()>,
    /// Active configuration.
    config: Config,
    /// Time provider for testing (None = use system time).
    time_provider: Option<Arc<dyn TimeProvider>>,
}

impl CapabilityMap {
    /// Creates an empty map kept only in memory.
    ///
    /// # Examples
    ///
    /// ```
    /// use capmap_core::CapabilityMap;
    ///
    /// let map = CapabilityMap::in_memory();
    /// let alice = map.join("alice").unwrap();
    /// let root = map
    ///     .create_node(&alice.session_id, None, "Sales", "", None)
    ///     .unwrap();
    /// assert_eq!(map.get_node(root.id).unwrap().name, "Sales");
    /// ```
    pub fn in_memory() -> Self {
        let config = Config::default();
        Self::assemble(
            Box::new(MemoryStorage::new()),
            TreeStore::new(&config.tree),
            config,
        )
    }

    /// Opens a map over any storage backend.
    ///
    /// A stored image is loaded and checked; an inconsistent image is
    /// rejected rather than repaired.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the storage can't be
    /// read, or the stored tree violates the forest invariant.
    pub fn with_storage(storage: impl TreeStorage + 'static, config: Config) -> Result<Self> {
        config.validate()?;
        let tree = match storage.load()? {
            Some(image) => {
                let tree = TreeStore::from_image(image, &config.tree)?;
                info!(capabilities = tree.len(), "Loaded capability tree");
                tree
            }
            None => TreeStore::new(&config.tree),
        };
        Ok(Self::assemble(Box::new(storage), tree, config))
    }

    /// Initializes a new map in `path/.capmap`.
    ///
    /// Writes the default configuration and creates an empty database.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory already exists or can't be
    /// created.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use capmap_core::CapabilityMap;
    ///
    /// let map = CapabilityMap::init(".").unwrap();
    /// ```
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().join(DATA_DIR);
        if root.exists() {
            return Err(CapError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("capmap data directory already exists: {}", root.display()),
            )));
        }

        fs::create_dir_all(&root)?;
        let config = Config::default();
        config.save(&root)?;
        let storage = RedbStorage::open(root.join(&config.storage.database))?;

        let mut map = Self::with_storage(storage, config)?;
        // Write an empty image so reopening sees an initialized store.
        map.persist_now(TreeMutation::full(&TreeStore::new(&map.config.tree)))?;
        map.root = Some(root);
        info!("Initialized capability map");
        Ok(map)
    }

    /// Opens an existing map from `path/.capmap`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory doesn't exist or is invalid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().join(DATA_DIR);
        if !root.exists() {
            return Err(CapError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a capmap directory: {}", path.as_ref().display()),
            )));
        }

        let config = Config::load(&root)?;
        let storage = RedbStorage::open(root.join(&config.storage.database))?;
        let mut map = Self::with_storage(storage, config)?;
        map.root = Some(root);
        Ok(map)
    }

    /// Sets a custom time provider for testing.
    ///
    /// Join times, activity times and change event times are taken from it.
    pub fn with_time_provider(mut self, provider: impl TimeProvider + 'static) -> Self {
        self.time_provider = Some(Arc::new(provider));
        self
    }

    fn assemble(
        storage: Box<dyn TreeStorage>,
        tree: TreeStore,
        config: Config,
    ) -> Self {
        let state = MapState {
            tree,
            locks: LockRegistry::new(),
            presence: Presence::new(&config.presence),
            feed: ChangeFeed::new(config.feed.retention),
        };
        Self {
            root: None,
            state: RwLock::new(state),
            storage,
            pending: Mutex::new(VecDeque::new()),
            persist: Mutex::new(()),
            config,
            time_provider: None,
        }
    }

    /// Data directory, if this map was opened from disk.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- sessions ----

    /// Joins with a freshly generated session id.
    pub fn join(&self, nickname: &str) -> Result<Session> {
        self.join_with_id(SessionId::generate(), nickname)
    }

    /// Joins with a caller-chosen session id.
    ///
    /// Joining again with a live id returns the existing session.
    pub fn join_with_id(&self, session_id: SessionId, nickname: &str) -> Result<Session> {
        self.mutate(|state, now| {
            let (session, created) = state.presence.join(session_id, nickname, now)?;
            if created {
                let version = state.feed.record(
                    now,
                    &session.session_id,
                    ChangeKind::PresenceChanged {
                        session: session.session_id.clone(),
                        nickname: session.nickname.clone(),
                        joined: true,
                    },
                );
                info!(
                    session = %session.session_id,
                    nickname = %session.nickname,
                    version,
                    "Session joined"
                );
            }
            Ok((session, None))
        })
    }

    /// Ends a session and releases every lock it held.
    ///
    /// Returns the released capability ids.
    pub fn leave(&self, session: &SessionId) -> Result<Vec<CapabilityId>> {
        self.mutate(|state, now| {
            let gone = state.presence.leave(session)?;
            let released = state.locks.clear_session(session);
            if !released.is_empty() {
                state.feed.record(
                    now,
                    session,
                    ChangeKind::LocksCleared {
                        session: Some(session.clone()),
                        released: released.clone(),
                    },
                );
            }
            let version = state.feed.record(
                now,
                session,
                ChangeKind::PresenceChanged {
                    session: session.clone(),
                    nickname: gone.nickname.clone(),
                    joined: false,
                },
            );
            info!(
                session = %session,
                nickname = %gone.nickname,
                released = released.len(),
                version,
                "Session left"
            );
            Ok((released, None))
        })
    }

    /// Live sessions in join order, with the locks each holds.
    pub fn list_active_sessions(&self) -> Result<Vec<SessionView>> {
        let state = self.read()?;
        Ok(state
            .presence
            .list()
            .iter()
            .map(|s| state.view(s))
            .collect())
    }

    /// One live session.
    pub fn session(&self, session: &SessionId) -> Result<SessionView> {
        let state = self.read()?;
        let found = state.presence.get(session)?;
        Ok(state.view(found))
    }

    /// Sessions that issued no command for at least `threshold`.
    ///
    /// Their locks stay in place; disconnecting them is the host's call.
    pub fn idle_sessions(&self, threshold: Duration) -> Result<Vec<SessionView>> {
        let now = self.now();
        let state = self.read()?;
        Ok(state
            .presence
            .idle(now, threshold)
            .into_iter()
            .map(|s| state.view(s))
            .collect())
    }

    // ---- tree commands ----

    /// Creates a capability under `parent` (or at root level) at `index`,
    /// appending when `index` is `None`.
    pub fn create_node(
        &self,
        session: &SessionId,
        parent: Option<CapabilityId>,
        name: &str,
        description: &str,
        index: Option<usize>,
    ) -> Result<Capability> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let id = state.tree.create(parent, name, description, index)?;
            let mutation = TreeMutation::new(&state.tree)
                .touch(&state.tree, id)
                .touch_slot(&state.tree, parent);
            let version = state.feed.record(
                now,
                session,
                ChangeKind::TreeChanged {
                    action: TreeAction::Created,
                    capability: Some(id),
                },
            );
            debug!(capability = %id, session = %session, version, "Created capability");
            Ok((state.tree.get(id)?.clone(), Some(mutation)))
        })
    }

    /// Changes name and/or description.
    ///
    /// Refused with `Locked` when another session holds the node or one of
    /// its ancestors.
    pub fn update_node(
        &self,
        session: &SessionId,
        id: CapabilityId,
        update: &CapabilityUpdate,
    ) -> Result<Capability> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let lock = state.locks.effective_state(&state.tree, id, session)?;
            if let Some(holder) = lock.blocking_holder() {
                return Err(CapError::Locked {
                    capability: id,
                    holder: holder.clone(),
                });
            }

            state.tree.update(id, update)?;
            let mutation = TreeMutation::new(&state.tree).touch(&state.tree, id);
            let version = state.feed.record(
                now,
                session,
                ChangeKind::TreeChanged {
                    action: TreeAction::Updated,
                    capability: Some(id),
                },
            );
            debug!(capability = %id, session = %session, version, "Updated capability");
            Ok((state.tree.get(id)?.clone(), Some(mutation)))
        })
    }

    /// Removes a capability and its whole subtree.
    ///
    /// Refused with `Locked` when the node is claimed by another session,
    /// directly or through an ancestor, or when any descendant is held by
    /// another session. Locks the caller held inside the subtree are dropped.
    ///
    /// Returns the removed ids in pre-order.
    pub fn delete_node(&self, session: &SessionId, id: CapabilityId) -> Result<Vec<CapabilityId>> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let lock = state.locks.effective_state(&state.tree, id, session)?;
            if let Some(holder) = lock.blocking_holder() {
                return Err(CapError::Locked {
                    capability: id,
                    holder: holder.clone(),
                });
            }
            if let Some((capability, holder)) =
                state.locks.foreign_lock_in_subtree(&state.tree, id, session)?
            {
                return Err(CapError::Locked { capability, holder });
            }

            let parent = state.tree.get(id)?.parent_id;
            let removed = state.tree.remove_subtree(id)?;
            let released: Vec<CapabilityId> = removed
                .iter()
                .copied()
                .filter(|node| state.locks.holder(*node).is_some())
                .collect();
            state.locks.release_all(&released);

            let mutation = TreeMutation::new(&state.tree)
                .remove(&removed)
                .touch_slot(&state.tree, parent);
            if !released.is_empty() {
                state.feed.record(
                    now,
                    session,
                    ChangeKind::LocksCleared {
                        session: Some(session.clone()),
                        released,
                    },
                );
            }
            let version = state.feed.record(
                now,
                session,
                ChangeKind::TreeChanged {
                    action: TreeAction::Deleted,
                    capability: Some(id),
                },
            );
            debug!(
                capability = %id,
                session = %session,
                removed = removed.len(),
                version,
                "Deleted capability subtree"
            );
            Ok((removed, Some(mutation)))
        })
    }

    /// Validates and performs a structural move in one critical section.
    pub fn move_node(&self, session: &SessionId, request: MoveRequest) -> Result<MoveOutcome> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let outcome = mover::execute_move(&mut state.tree, &state.locks, &request, session)?;

            let mutation = TreeMutation::new(&state.tree)
                .touch(&state.tree, outcome.capability)
                .touch_slot(&state.tree, outcome.from_parent)
                .touch_slot(&state.tree, outcome.to_parent);
            let version = state.feed.record(
                now,
                session,
                ChangeKind::TreeChanged {
                    action: TreeAction::Moved,
                    capability: Some(outcome.capability),
                },
            );
            debug!(
                capability = %outcome.capability,
                session = %session,
                to_parent = ?outcome.to_parent,
                to_index = outcome.to_index,
                version,
                "Moved capability"
            );
            Ok((outcome, Some(mutation)))
        })
    }

    // ---- lock commands ----

    /// Acquires the advisory lock on `id`. Never waits.
    pub fn lock_node(&self, session: &SessionId, id: CapabilityId) -> Result<LockOutcome> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let outcome = state.locks.lock(&state.tree, id, session)?;
            if outcome == LockOutcome::Acquired {
                let version = state.feed.record(
                    now,
                    session,
                    ChangeKind::LockChanged {
                        capability: id,
                        holder: Some(session.clone()),
                    },
                );
                debug!(capability = %id, session = %session, version, "Locked capability");
            }
            Ok((outcome, None))
        })
    }

    /// Releases the caller's lock on `id`.
    pub fn unlock_node(&self, session: &SessionId, id: CapabilityId) -> Result<UnlockOutcome> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let outcome = state.locks.unlock(id, session)?;
            if outcome == UnlockOutcome::Released {
                let version = state.feed.record(
                    now,
                    session,
                    ChangeKind::LockChanged {
                        capability: id,
                        holder: None,
                    },
                );
                debug!(capability = %id, session = %session, version, "Unlocked capability");
            }
            Ok((outcome, None))
        })
    }

    /// Releases every lock the caller holds.
    pub fn clear_my_locks(&self, session: &SessionId) -> Result<Vec<CapabilityId>> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let released = state.locks.clear_session(session);
            if !released.is_empty() {
                let version = state.feed.record(
                    now,
                    session,
                    ChangeKind::LocksCleared {
                        session: Some(session.clone()),
                        released: released.clone(),
                    },
                );
                info!(
                    session = %session,
                    released = released.len(),
                    version,
                    "Cleared session locks"
                );
            }
            Ok((released, None))
        })
    }

    /// Releases every lock of every session.
    pub fn clear_all_locks(&self, session: &SessionId) -> Result<Vec<CapabilityId>> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let released = state.locks.clear();
            if !released.is_empty() {
                let version = state.feed.record(
                    now,
                    session,
                    ChangeKind::LocksCleared {
                        session: None,
                        released: released.clone(),
                    },
                );
                info!(
                    session = %session,
                    released = released.len(),
                    version,
                    "Cleared all locks"
                );
            }
            Ok((released, None))
        })
    }

    /// Removes every capability and every lock. Sessions stay connected.
    pub fn reset(&self, session: &SessionId) -> Result<()> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let released = state.locks.clear();
            state.tree.clear();
            if !released.is_empty() {
                state.feed.record(
                    now,
                    session,
                    ChangeKind::LocksCleared {
                        session: None,
                        released,
                    },
                );
            }
            let version = state.feed.record(
                now,
                session,
                ChangeKind::TreeChanged {
                    action: TreeAction::Reset,
                    capability: None,
                },
            );
            info!(session = %session, version, "Reset capability map");
            Ok(((), Some(TreeMutation::full(&state.tree))))
        })
    }

    // ---- import / export ----

    /// Replaces the whole tree with `forest`, assigning fresh ids in
    /// pre-order. All locks are released. Nothing changes if any node is
    /// invalid.
    ///
    /// Returns the new root ids.
    pub fn import(
        &self,
        session: &SessionId,
        forest: &[CapabilityNode],
    ) -> Result<Vec<CapabilityId>> {
        self.mutate(|state, now| {
            state.admit(session, now)?;
            let roots = state.tree.replace_with(forest)?;
            let released = state.locks.clear();
            if !released.is_empty() {
                state.feed.record(
                    now,
                    session,
                    ChangeKind::LocksCleared {
                        session: None,
                        released,
                    },
                );
            }
            let version = state.feed.record(
                now,
                session,
                ChangeKind::TreeChanged {
                    action: TreeAction::Imported,
                    capability: None,
                },
            );
            info!(
                session = %session,
                capabilities = state.tree.len(),
                version,
                "Imported capability tree"
            );
            Ok((roots, Some(TreeMutation::full(&state.tree))))
        })
    }

    /// Imports a JSON array of nested nodes, or a single node.
    pub fn import_json(&self, session: &SessionId, json: &str) -> Result<Vec<CapabilityId>> {
        let forest = parse_forest(json)?;
        self.import(session, &forest)
    }

    /// The whole forest as nested nodes, in order.
    pub fn export(&self) -> Result<Vec<CapabilityNode>> {
        self.read()?.tree.export()
    }

    /// The whole forest as pretty-printed JSON.
    ///
    /// Forests deeper than [`MAX_JSON_DEPTH`] levels are refused, since the
    /// JSON reader could not import them again.
    pub fn export_json(&self) -> Result<String> {
        let forest = self.export()?;
        let depth = forest.iter().map(CapabilityNode::depth).max().unwrap_or(0);
        if depth > MAX_JSON_DEPTH {
            return Err(CapError::Serialization(format!(
                "tree is {} levels deep; JSON export supports at most {}",
                depth, MAX_JSON_DEPTH
            )));
        }
        serde_json::to_string_pretty(&forest)
            .map_err(|e| CapError::Serialization(format!("failed to encode export: {}", e)))
    }

    // ---- queries ----

    /// One capability record.
    pub fn get_node(&self, id: CapabilityId) -> Result<Capability> {
        Ok(self.read()?.tree.get(id)?.clone())
    }

    /// Ordered child records of `parent`, or the roots for `None`.
    pub fn children(&self, parent: Option<CapabilityId>) -> Result<Vec<Capability>> {
        let state = self.read()?;
        state
            .tree
            .children_of(parent)?
            .iter()
            .map(|id| state.tree.get(*id).cloned())
            .collect()
    }

    /// Nested tree annotated with effective lock states for `observer`:
    /// every root for `None`, or the subtree rooted at `root`.
    pub fn get_tree(
        &self,
        observer: &SessionId,
        root: Option<CapabilityId>,
    ) -> Result<Vec<TreeView>> {
        let state = self.read()?;
        match root {
            Some(id) => Ok(vec![state.locks.annotate(&state.tree, id, observer)?]),
            None => state
                .tree
                .roots()
                .iter()
                .map(|id| state.locks.annotate(&state.tree, *id, observer))
                .collect(),
        }
    }

    /// Effective lock state of `id` as seen by `observer`.
    pub fn effective_lock_state(
        &self,
        observer: &SessionId,
        id: CapabilityId,
    ) -> Result<LockState> {
        let state = self.read()?;
        state.locks.effective_state(&state.tree, id, observer)
    }

    /// Number of capabilities.
    pub fn capability_count(&self) -> Result<usize> {
        Ok(self.read()?.tree.len())
    }

    /// Tree-wide version, bumped by tree mutations only.
    pub fn tree_version(&self) -> Result<u64> {
        Ok(self.read()?.tree.version())
    }

    /// Global state version, bumped by every admitted change.
    pub fn current_version(&self) -> Result<u64> {
        Ok(self.read()?.feed.version())
    }

    /// Changes after `version`, for fanning out updates.
    pub fn changes_since(&self, version: u64) -> Result<ChangeSet> {
        Ok(self.read()?.feed.since(version))
    }

    /// Retained change events, oldest first.
    pub fn audit_log(&self) -> Result<Vec<ChangeEvent>> {
        Ok(self.read()?.feed.retained().cloned().collect())
    }

    /// Runs the full invariant check over tree and locks.
    pub fn check_consistency(&self) -> Result<()> {
        let state = self.read()?;
        state.tree.check_consistency()?;
        for session in state.presence.list() {
            for id in state.locks.held_by(&session.session_id) {
                state.tree.get(id).map_err(|_| {
                    CapError::InternalInconsistency(format!(
                        "session {} holds a lock on missing capability {}",
                        session.session_id, id
                    ))
                })?;
            }
        }
        let live: usize = state
            .presence
            .list()
            .iter()
            .map(|s| state.locks.held_by(&s.session_id).len())
            .sum();
        if live != state.locks.len() {
            return Err(CapError::InternalInconsistency(format!(
                "{} locks are held by sessions that are not live",
                state.locks.len() - live
            )));
        }
        Ok(())
    }

    // ---- persistence ----

    /// Writes every queued mutation, in admission order.
    ///
    /// Returns how many were written. On failure the failed mutation stays
    /// queued and is retried by the next flush.
    pub fn flush_storage(&self) -> Result<usize> {
        let _writer = self.persist.lock().map_err(|_| CapError::StatePoisoned)?;
        let mut written = 0;
        loop {
            let next = self.pending_queue()?.pop_front();
            let Some(mutation) = next else {
                break;
            };
            if let Err(e) = self.storage.save(&mutation) {
                self.pending_queue()?.push_front(mutation);
                return Err(e);
            }
            written += 1;
        }
        Ok(written)
    }

    /// Number of mutations admitted but not yet written.
    pub fn pending_writes(&self) -> Result<usize> {
        Ok(self.pending_queue()?.len())
    }

    fn persist_now(&self, mutation: TreeMutation) -> Result<()> {
        self.pending_queue()?.push_back(mutation);
        self.flush_storage().map(|_| ())
    }

    fn pending_queue(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<TreeMutation>>> {
        self.pending.lock().map_err(|_| CapError::StatePoisoned)
    }

    // ---- plumbing ----

    /// Runs `op` under the write guard, queues its storage mutation, then
    /// flushes after the guard is released.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut MapState, i64) -> Result<(T, Option<TreeMutation>)>,
    ) -> Result<T> {
        let now = self.now();
        let value = {
            let mut state = self.write()?;
            let (value, mutation) = op(&mut state, now)?;
            if let Some(mutation) = mutation {
                self.pending_queue()?.push_back(mutation);
            }
            value
        };

        if let Err(e) = self.flush_storage() {
            warn!(
                error = %e,
                pending = self.pending_writes().unwrap_or(0),
                "Failed to persist tree mutation, will retry on next write"
            );
        }
        Ok(value)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MapState>> {
        self.state.read().map_err(|_| CapError::StatePoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MapState>> {
        self.state.write().map_err(|_| CapError::StatePoisoned)
    }

    fn now(&self) -> i64 {
        match &self.time_provider {
            Some(provider) => provider.now(),
            None => current_timestamp(),
        }
    }
}

/// Returns the current Unix timestamp in seconds.
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn parse_forest(json: &str) -> Result<Vec<CapabilityNode>> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| CapError::Deserialization(format!("invalid import JSON: {}", e)))?;
    let forest: std::result::Result<Vec<CapabilityNode>, serde_json::Error> = if value.is_array()
    {
        serde_json::from_value(value)
    } else {
        serde_json::from_value::<CapabilityNode>(value).map(|node| vec![node])
    };
    forest.map_err(|e| CapError::Deserialization(format!("invalid capability data: {}", e)))
}

// Manual Debug implementation to skip storage and time_provider
impl std::fmt::Debug for CapabilityMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityMap")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
