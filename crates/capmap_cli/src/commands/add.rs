//! Create a capability.

use anyhow::Result;
use capmap_core::CapabilityId;
use console::style;
use std::path::Path;

/// Create a capability under `parent`, or at root level.
pub fn run(
    dir: &Path,
    name: &str,
    parent: Option<CapabilityId>,
    index: Option<usize>,
    description: &str,
) -> Result<()> {
    let created = super::with_session(dir, |map, session| {
        map.create_node(session, parent, name, description, index)
    })?;

    println!(
        "{} #{} {}",
        style("Created").green(),
        created.id,
        created.name
    );
    if let Some(parent) = created.parent_id {
        println!("  under #{}", parent);
    }
    Ok(())
}
