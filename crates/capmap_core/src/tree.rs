//! Capability tree store.
//!
//! The tree is kept as a flat arena: a map from id to node record, where each
//! record carries its `parent_id` and ordered `children`. Ancestor walks and
//! subtree tests are iterative parent-pointer traversals, so detaching and
//! reattaching a subtree is O(depth) and never rebuilds nested structures.

use crate::config::TreeConfig;
use crate::error::{CapError, Result};
use crate::types::{Capability, CapabilityId, CapabilityNode, CapabilityUpdate, MoveOutcome};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Full durable image of a tree, as loaded from and written to storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeImage {
    /// Every capability record, in id order.
    pub capabilities: Vec<Capability>,
    /// Ordered root ids.
    pub roots: Vec<CapabilityId>,
    /// Next id the allocator hands out.
    pub next_id: u64,
}

/// Canonical owner of the capability forest.
#[derive(Debug, Clone)]
pub struct TreeStore {
    nodes: HashMap<CapabilityId, Capability>,
    roots: Vec<CapabilityId>,
    next_id: u64,
    version: u64,
    max_name_length: usize,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new(&TreeConfig::default())
    }
}

impl TreeStore {
    /// Creates an empty tree.
    pub fn new(config: &TreeConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: 1,
            version: 0,
            max_name_length: config.max_name_length,
        }
    }

    /// Rebuilds a tree from a stored image.
    ///
    /// # Errors
    ///
    /// Returns `InternalInconsistency` if the image is not a well-formed forest.
    pub fn from_image(image: TreeImage, config: &TreeConfig) -> Result<Self> {
        let mut nodes = HashMap::with_capacity(image.capabilities.len());
        for capability in image.capabilities {
            let id = capability.id;
            if nodes.insert(id, capability).is_some() {
                return Err(CapError::InternalInconsistency(format!(
                    "capability {} stored twice",
                    id
                )));
            }
        }

        let max_id = nodes.keys().map(|id| id.0).max().unwrap_or(0);
        let tree = Self {
            nodes,
            roots: image.roots,
            next_id: image.next_id.max(max_id + 1),
            version: 0,
            max_name_length: config.max_name_length,
        };
        tree.check_consistency()?;
        Ok(tree)
    }

    /// Returns the full image of this tree, records sorted by id.
    pub fn image(&self) -> TreeImage {
        let mut capabilities: Vec<Capability> = self.nodes.values().cloned().collect();
        capabilities.sort_by_key(|c| c.id);
        TreeImage {
            capabilities,
            roots: self.roots.clone(),
            next_id: self.next_id,
        }
    }

    /// Tree-wide version, incremented by every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Next id the allocator will hand out.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Number of capabilities.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the tree holds no capability.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when a capability with this id exists.
    pub fn contains(&self, id: CapabilityId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Looks up a capability.
    pub fn get(&self, id: CapabilityId) -> Result<&Capability> {
        self.nodes.get(&id).ok_or(CapError::CapabilityNotFound(id))
    }

    /// Ordered root ids.
    pub fn roots(&self) -> &[CapabilityId] {
        &self.roots
    }

    /// Ordered children of `parent`, or the roots for `None`.
    pub fn children_of(&self, parent: Option<CapabilityId>) -> Result<&[CapabilityId]> {
        match parent {
            None => Ok(&self.roots),
            Some(id) => Ok(&self.get(id)?.children),
        }
    }

    /// Strict ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: CapabilityId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.nodes.get(&id).and_then(|c| c.parent_id),
            remaining: self.nodes.len(),
        }
    }

    /// True if `candidate` is `root` itself or lies anywhere below it.
    pub fn is_in_subtree(&self, candidate: CapabilityId, root: CapabilityId) -> bool {
        candidate == root || self.ancestors(candidate).any(|a| a == root)
    }

    /// Ids of the subtree rooted at `id`, in pre-order.
    pub fn subtree(&self, id: CapabilityId) -> Result<Vec<CapabilityId>> {
        self.get(id)?;
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if out.len() >= self.nodes.len() {
                return Err(CapError::InternalInconsistency(format!(
                    "subtree of {} revisits nodes",
                    id
                )));
            }
            let capability = self.nodes.get(&current).ok_or_else(|| {
                CapError::InternalInconsistency(format!("child {} has no record", current))
            })?;
            out.push(current);
            stack.extend(capability.children.iter().rev().copied());
        }
        Ok(out)
    }

    /// Creates a capability under `parent` (or at root level) at `index`,
    /// appending when `index` is `None`. Positions beyond the end append.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParent` if `parent` does not exist and `InvalidName`
    /// if the name is empty or too long.
    pub fn create(
        &mut self,
        parent: Option<CapabilityId>,
        name: &str,
        description: &str,
        index: Option<usize>,
    ) -> Result<CapabilityId> {
        let name = self.validate_name(name)?;
        if let Some(parent_id) = parent {
            if !self.nodes.contains_key(&parent_id) {
                return Err(CapError::InvalidParent(parent_id));
            }
        }

        let id = CapabilityId(self.next_id);
        let siblings = self.siblings_mut(parent)?;
        let at = index.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(at, id);

        self.nodes.insert(
            id,
            Capability {
                id,
                name,
                description: description.to_string(),
                parent_id: parent,
                children: Vec::new(),
            },
        );
        self.next_id += 1;
        self.version += 1;
        Ok(id)
    }

    /// Changes name and/or description of a capability.
    pub fn update(&mut self, id: CapabilityId, update: &CapabilityUpdate) -> Result<()> {
        let name = match &update.name {
            Some(name) => Some(self.validate_name(name)?),
            None => None,
        };
        let capability = self
            .nodes
            .get_mut(&id)
            .ok_or(CapError::CapabilityNotFound(id))?;
        if let Some(name) = name {
            capability.name = name;
        }
        if let Some(description) = &update.description {
            capability.description = description.clone();
        }
        self.version += 1;
        Ok(())
    }

    /// Removes a capability and its whole subtree.
    ///
    /// Returns the removed ids in pre-order.
    pub fn remove_subtree(&mut self, id: CapabilityId) -> Result<Vec<CapabilityId>> {
        let removed = self.subtree(id)?;
        let (parent, index) = self.position_in_parent(id)?;
        self.siblings_mut(parent)?.remove(index);
        for gone in &removed {
            self.nodes.remove(gone);
        }
        self.version += 1;
        Ok(removed)
    }

    /// Detaches `id` and inserts it under `new_parent` at `index`, clamped to
    /// the new sibling count.
    ///
    /// Lock rules are not checked here; go through the move validator.
    pub(crate) fn reparent(
        &mut self,
        id: CapabilityId,
        new_parent: Option<CapabilityId>,
        index: usize,
    ) -> Result<MoveOutcome> {
        if let Some(target) = new_parent {
            if !self.nodes.contains_key(&target) {
                return Err(CapError::InvalidParent(target));
            }
            if self.is_in_subtree(target, id) {
                return Err(CapError::CycleViolation {
                    capability: id,
                    target,
                });
            }
        }

        let (from_parent, from_index) = self.position_in_parent(id)?;
        self.siblings_mut(from_parent)?.remove(from_index);

        let siblings = self.siblings_mut(new_parent)?;
        let to_index = index.min(siblings.len());
        siblings.insert(to_index, id);

        if let Some(capability) = self.nodes.get_mut(&id) {
            capability.parent_id = new_parent;
        }
        self.version += 1;

        Ok(MoveOutcome {
            capability: id,
            from_parent,
            from_index,
            to_parent: new_parent,
            to_index,
        })
    }

    /// Removes every capability. The id allocator keeps counting.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.version += 1;
    }

    /// Replaces the whole forest with `forest`, assigning fresh ids in
    /// pre-order. On error the current tree is left untouched.
    ///
    /// Returns the new root ids.
    pub fn replace_with(&mut self, forest: &[CapabilityNode]) -> Result<Vec<CapabilityId>> {
        let mut fresh = Self {
            nodes: HashMap::new(),
            roots: Vec::new(),
            next_id: self.next_id,
            version: self.version,
            max_name_length: self.max_name_length,
        };

        let mut stack: Vec<(Option<CapabilityId>, &CapabilityNode)> =
            forest.iter().rev().map(|node| (None, node)).collect();
        while let Some((parent, node)) = stack.pop() {
            let id = fresh.create(parent, &node.name, &node.description, None)?;
            stack.extend(node.children.iter().rev().map(|child| (Some(id), child)));
        }

        fresh.version = self.version + 1;
        let roots = fresh.roots.clone();
        *self = fresh;
        Ok(roots)
    }

    /// Nested copy of the whole forest.
    pub fn export(&self) -> Result<Vec<CapabilityNode>> {
        self.roots.iter().map(|id| self.export_subtree(*id)).collect()
    }

    /// Nested copy of the subtree rooted at `id`.
    pub fn export_subtree(&self, id: CapabilityId) -> Result<CapabilityNode> {
        self.build_nested(
            id,
            (),
            |_, _| (),
            |capability, _, children| CapabilityNode {
                id: Some(capability.id),
                name: capability.name.clone(),
                description: capability.description.clone(),
                children,
            },
        )
    }

    /// Builds a nested value for the subtree rooted at `id` with an explicit
    /// stack, so depth is bounded by memory rather than by the call stack.
    ///
    /// `descend` derives a child's context from its parent's record and
    /// context. `assemble` runs once per node after all of its children, which
    /// arrive in display order.
    pub(crate) fn build_nested<C, T>(
        &self,
        id: CapabilityId,
        context: C,
        mut descend: impl FnMut(&Capability, &C) -> C,
        mut assemble: impl FnMut(&Capability, &C, Vec<T>) -> T,
    ) -> Result<T> {
        struct Frame<'a, C, T> {
            capability: &'a Capability,
            context: C,
            built: Vec<T>,
        }

        let root = self.get(id)?;
        let mut stack = vec![Frame {
            capability: root,
            context,
            built: Vec::with_capacity(root.children.len()),
        }];

        while let Some(top) = stack.last_mut() {
            if let Some(&child) = top.capability.children.get(top.built.len()) {
                let context = descend(top.capability, &top.context);
                let capability = self.get(child)?;
                stack.push(Frame {
                    capability,
                    context,
                    built: Vec::with_capacity(capability.children.len()),
                });
                continue;
            }

            let Some(frame) = stack.pop() else { break };
            let value = assemble(frame.capability, &frame.context, frame.built);
            match stack.last_mut() {
                Some(parent) => parent.built.push(value),
                None => return Ok(value),
            }
        }

        Err(CapError::InternalInconsistency(format!(
            "subtree of {} ended without a root",
            id
        )))
    }

    /// Verifies the forest invariant.
    ///
    /// Every record is reachable from exactly one root position, every child
    /// list entry points back at its parent, and no id exceeds the allocator.
    pub fn check_consistency(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.nodes.len());
        let mut stack = Vec::with_capacity(self.roots.len());

        for root in &self.roots {
            let capability = self.nodes.get(root).ok_or_else(|| {
                CapError::InternalInconsistency(format!("root {} has no record", root))
            })?;
            if let Some(parent) = capability.parent_id {
                return Err(CapError::InternalInconsistency(format!(
                    "root {} claims parent {}",
                    root, parent
                )));
            }
            stack.push(*root);
        }

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(CapError::InternalInconsistency(format!(
                    "capability {} is listed more than once",
                    id
                )));
            }
            let capability = self.nodes.get(&id).ok_or_else(|| {
                CapError::InternalInconsistency(format!("capability {} has no record", id))
            })?;
            if capability.id != id {
                return Err(CapError::InternalInconsistency(format!(
                    "record under key {} carries id {}",
                    id, capability.id
                )));
            }
            if id.0 >= self.next_id {
                return Err(CapError::InternalInconsistency(format!(
                    "capability {} is beyond the id allocator ({})",
                    id, self.next_id
                )));
            }
            for child in &capability.children {
                let record = self.nodes.get(child).ok_or_else(|| {
                    CapError::InternalInconsistency(format!(
                        "child {} of {} has no record",
                        child, id
                    ))
                })?;
                if record.parent_id != Some(id) {
                    return Err(CapError::InternalInconsistency(format!(
                        "capability {} is listed under {} but its parent is {:?}",
                        child, id, record.parent_id
                    )));
                }
                stack.push(*child);
            }
        }

        if seen.len() != self.nodes.len() {
            return Err(CapError::InternalInconsistency(format!(
                "{} capabilities are unreachable from the roots",
                self.nodes.len() - seen.len()
            )));
        }
        Ok(())
    }

    fn validate_name(&self, name: &str) -> Result<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(CapError::InvalidName("name must not be empty".to_string()));
        }
        if trimmed.chars().count() > self.max_name_length {
            return Err(CapError::InvalidName(format!(
                "name exceeds {} characters",
                self.max_name_length
            )));
        }
        Ok(trimmed.to_string())
    }

    /// Parent and position of `id` among its siblings.
    fn position_in_parent(&self, id: CapabilityId) -> Result<(Option<CapabilityId>, usize)> {
        let capability = self.get(id)?;
        let siblings: &[CapabilityId] = match capability.parent_id {
            None => &self.roots,
            Some(parent) => {
                &self
                    .nodes
                    .get(&parent)
                    .ok_or_else(|| {
                        CapError::InternalInconsistency(format!(
                            "capability {} references missing parent {}",
                            id, parent
                        ))
                    })?
                    .children
            }
        };
        siblings
            .iter()
            .position(|c| *c == id)
            .map(|index| (capability.parent_id, index))
            .ok_or_else(|| {
                CapError::InternalInconsistency(format!(
                    "capability {} is missing from its parent's child list",
                    id
                ))
            })
    }

    fn siblings_mut(&mut self, parent: Option<CapabilityId>) -> Result<&mut Vec<CapabilityId>> {
        match parent {
            None => Ok(&mut self.roots),
            Some(id) => self
                .nodes
                .get_mut(&id)
                .map(|c| &mut c.children)
                .ok_or(CapError::InvalidParent(id)),
        }
    }
}

/// Iterator over strict ancestors, nearest first.
///
/// Bounded by the node count so a corrupted parent chain cannot loop forever.
pub struct Ancestors<'a> {
    tree: &'a TreeStore,
    next: Option<CapabilityId>,
    remaining: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = CapabilityId;

    fn next(&mut self) -> Option<CapabilityId> {
        if self.remaining == 0 {
            return None;
        }
        let current = self.next?;
        self.remaining -= 1;
        self.next = self.tree.nodes.get(&current).and_then(|c| c.parent_id);
        Some(current)
    }
}
