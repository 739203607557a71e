//! Lock registry with ancestor-aware effective state.
//!
//! The registry owns the single mapping from capability to holding session.
//! A session's locked set is derived from it, so mutual exclusion holds by
//! construction: a map key has one value.

use crate::error::{CapError, Result};
use crate::tree::TreeStore;
use crate::types::{CapabilityId, LockOutcome, LockState, SessionId, TreeView, UnlockOutcome};
use std::collections::{BTreeSet, HashMap};

/// Advisory locks held by live sessions.
#[derive(Debug, Clone, Default)]
pub struct LockRegistry {
    holders: HashMap<CapabilityId, SessionId>,
}

impl LockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct holder of `id`, if any.
    pub fn holder(&self, id: CapabilityId) -> Option<&SessionId> {
        self.holders.get(&id)
    }

    /// Number of held locks.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    /// True when nobody holds a lock.
    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Acquires the lock on `id` for `session`.
    ///
    /// Re-locking one's own node is a no-op. A node below a strict ancestor
    /// held by another session cannot be locked either; the conflict reports
    /// that ancestor in `via`.
    pub fn lock(
        &mut self,
        tree: &TreeStore,
        id: CapabilityId,
        session: &SessionId,
    ) -> Result<LockOutcome> {
        tree.get(id)?;

        match self.holders.get(&id) {
            Some(holder) if holder == session => return Ok(LockOutcome::AlreadyHeld),
            Some(holder) => {
                return Err(CapError::AlreadyLocked {
                    capability: id,
                    holder: holder.clone(),
                    via: None,
                })
            }
            None => {}
        }

        if let Some((ancestor, holder)) = self.foreign_ancestor(tree, id, session) {
            return Err(CapError::AlreadyLocked {
                capability: id,
                holder: holder.clone(),
                via: Some(ancestor),
            });
        }

        self.holders.insert(id, session.clone());
        Ok(LockOutcome::Acquired)
    }

    /// Releases the lock on `id` held by `session`.
    ///
    /// Releasing a node nobody holds is tolerated, and so is a node that no
    /// longer exists.
    pub fn unlock(&mut self, id: CapabilityId, session: &SessionId) -> Result<UnlockOutcome> {
        match self.holders.get(&id) {
            None => Ok(UnlockOutcome::NotLocked),
            Some(holder) if holder == session => {
                self.holders.remove(&id);
                Ok(UnlockOutcome::Released)
            }
            Some(holder) => Err(CapError::NotHolder {
                capability: id,
                holder: holder.clone(),
            }),
        }
    }

    /// Effective lock state of `id` as seen by `observer`.
    pub fn effective_state(
        &self,
        tree: &TreeStore,
        id: CapabilityId,
        observer: &SessionId,
    ) -> Result<LockState> {
        tree.get(id)?;
        Ok(self.state_unchecked(tree, id, observer))
    }

    /// Releases every lock `session` holds. Returns the released ids, sorted.
    pub fn clear_session(&mut self, session: &SessionId) -> Vec<CapabilityId> {
        let mut released: Vec<CapabilityId> = self
            .holders
            .iter()
            .filter(|(_, holder)| *holder == session)
            .map(|(id, _)| *id)
            .collect();
        released.sort();
        for id in &released {
            self.holders.remove(id);
        }
        released
    }

    /// Releases every lock of every session. Returns the released ids, sorted.
    pub fn clear(&mut self) -> Vec<CapabilityId> {
        let mut released: Vec<CapabilityId> = self.holders.drain().map(|(id, _)| id).collect();
        released.sort();
        released
    }

    /// Drops locks on capabilities that were removed from the tree.
    pub fn release_all(&mut self, ids: &[CapabilityId]) {
        for id in ids {
            self.holders.remove(id);
        }
    }

    /// Capabilities held by `session`.
    pub fn held_by(&self, session: &SessionId) -> BTreeSet<CapabilityId> {
        self.holders
            .iter()
            .filter(|(_, holder)| *holder == session)
            .map(|(id, _)| *id)
            .collect()
    }

    /// First node of the subtree rooted at `id` (pre-order) that is held by a
    /// session other than `session`.
    pub fn foreign_lock_in_subtree(
        &self,
        tree: &TreeStore,
        id: CapabilityId,
        session: &SessionId,
    ) -> Result<Option<(CapabilityId, SessionId)>> {
        if self.holders.is_empty() {
            tree.get(id)?;
            return Ok(None);
        }
        Ok(tree.subtree(id)?.into_iter().find_map(|node| {
            self.holders
                .get(&node)
                .filter(|holder| *holder != session)
                .map(|holder| (node, holder.clone()))
        }))
    }

    /// Subtree rooted at `id` annotated with effective states for `observer`.
    ///
    /// The nearest foreign ancestor is found once for `id` and then handed
    /// down, so each node costs one holder lookup.
    pub fn annotate(
        &self,
        tree: &TreeStore,
        id: CapabilityId,
        observer: &SessionId,
    ) -> Result<TreeView> {
        tree.get(id)?;
        let inherited = self
            .foreign_ancestor(tree, id, observer)
            .map(|(ancestor, holder)| (ancestor, holder.clone()));

        tree.build_nested(
            id,
            inherited,
            |parent, blocked| match self.holders.get(&parent.id) {
                Some(holder) if holder != observer => Some((parent.id, holder.clone())),
                _ => blocked.clone(),
            },
            |capability, blocked, children| TreeView {
                id: capability.id,
                name: capability.name.clone(),
                description: capability.description.clone(),
                lock: match (self.holders.get(&capability.id), blocked) {
                    (Some(holder), _) if holder == observer => LockState::LockedBySelf,
                    (Some(holder), _) => LockState::LockedByOther {
                        holder: holder.clone(),
                    },
                    (None, Some((ancestor, holder))) => LockState::BlockedByAncestor {
                        ancestor: *ancestor,
                        holder: holder.clone(),
                    },
                    (None, None) => LockState::Free,
                },
                children,
            },
        )
    }

    fn state_unchecked(
        &self,
        tree: &TreeStore,
        id: CapabilityId,
        observer: &SessionId,
    ) -> LockState {
        match self.holders.get(&id) {
            Some(holder) if holder == observer => LockState::LockedBySelf,
            Some(holder) => LockState::LockedByOther {
                holder: holder.clone(),
            },
            None => match self.foreign_ancestor(tree, id, observer) {
                Some((ancestor, holder)) => LockState::BlockedByAncestor {
                    ancestor,
                    holder: holder.clone(),
                },
                None => LockState::Free,
            },
        }
    }

    /// Nearest strict ancestor of `id` held by someone other than `observer`.
    /// Ancestors held by the observer do not block and the walk continues.
    fn foreign_ancestor(
        &self,
        tree: &TreeStore,
        id: CapabilityId,
        observer: &SessionId,
    ) -> Option<(CapabilityId, &SessionId)> {
        if self.holders.is_empty() {
            return None;
        }
        tree.ancestors(id).find_map(|ancestor| {
            self.holders
                .get(&ancestor)
                .filter(|holder| *holder != observer)
                .map(|holder| (ancestor, holder))
        })
    }
}
