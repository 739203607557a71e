//! Move validation and execution.
//!
//! A move is checked in a fixed order and stops at the first failure:
//! existence, self-move, cycle, source lock, target lock. Validation and the
//! reparent that follows must run under the same exclusive borrow of the
//! tree, which callers get from the map's write guard.

use crate::error::{CapError, Result};
use crate::locks::LockRegistry;
use crate::tree::TreeStore;
use crate::types::{MoveOutcome, MoveRequest, SessionId};

/// Checks whether `session` may perform `request`.
pub fn validate_move(
    tree: &TreeStore,
    locks: &LockRegistry,
    request: &MoveRequest,
    session: &SessionId,
) -> Result<()> {
    let id = request.capability;
    tree.get(id)?;

    if let Some(target) = request.target_parent {
        if target == id {
            return Err(CapError::SelfMove(id));
        }
        if !tree.contains(target) {
            return Err(CapError::InvalidParent(target));
        }
        // Upward walk from the target: cheaper than scanning the moved subtree.
        if tree.is_in_subtree(target, id) {
            return Err(CapError::CycleViolation {
                capability: id,
                target,
            });
        }
    }

    if let Some(holder) = locks.holder(id).filter(|holder| *holder != session) {
        return Err(CapError::SourceLocked {
            capability: id,
            holder: holder.clone(),
        });
    }
    let source_state = locks.effective_state(tree, id, session)?;
    if let Some(holder) = source_state.blocking_holder() {
        return Err(CapError::SourceLocked {
            capability: id,
            holder: holder.clone(),
        });
    }

    if let Some(target) = request.target_parent {
        let target_state = locks.effective_state(tree, target, session)?;
        if let Some(holder) = target_state.blocking_holder() {
            return Err(CapError::TargetLocked {
                target,
                holder: holder.clone(),
            });
        }
    }

    Ok(())
}

/// Validates `request` and performs the reparent.
///
/// The index is clamped to the new sibling count after the node has been
/// detached, so moving within the same parent behaves like a reorder.
pub fn execute_move(
    tree: &mut TreeStore,
    locks: &LockRegistry,
    request: &MoveRequest,
    session: &SessionId,
) -> Result<MoveOutcome> {
    validate_move(tree, locks, request, session)?;
    tree.reparent(request.capability, request.target_parent, request.index)
}
