//! Delete a capability and its subtree.

use anyhow::Result;
use capmap_core::CapabilityId;
use console::style;
use std::path::Path;

pub fn run(dir: &Path, id: CapabilityId) -> Result<()> {
    let removed = super::with_session(dir, |map, session| map.delete_node(session, id))?;

    println!(
        "{} #{} ({} capabilit{})",
        style("Deleted").red(),
        id,
        removed.len(),
        if removed.len() == 1 { "y" } else { "ies" }
    );
    Ok(())
}
