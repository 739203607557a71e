//! Move a capability under a new parent.

use anyhow::Result;
use capmap_core::{CapabilityId, MoveRequest};
use console::style;
use std::path::Path;

pub fn run(dir: &Path, id: CapabilityId, parent: Option<CapabilityId>, index: usize) -> Result<()> {
    let request = MoveRequest {
        capability: id,
        target_parent: parent,
        index,
    };
    let outcome = super::with_session(dir, |map, session| map.move_node(session, request))?;

    let place = |parent: Option<CapabilityId>| match parent {
        Some(id) => format!("#{}", id),
        None => "root level".to_string(),
    };
    println!(
        "{} #{}: {} [{}] -> {} [{}]",
        style("Moved").green(),
        outcome.capability,
        place(outcome.from_parent),
        outcome.from_index,
        place(outcome.to_parent),
        outcome.to_index
    );
    Ok(())
}
