//! Change a capability's name or description.

use anyhow::{bail, Result};
use capmap_core::{CapabilityId, CapabilityUpdate};
use console::style;
use std::path::Path;

pub fn run(
    dir: &Path,
    id: CapabilityId,
    name: Option<String>,
    description: Option<String>,
) -> Result<()> {
    if name.is_none() && description.is_none() {
        bail!("Nothing to change. Pass --name and/or --description.");
    }

    let update = CapabilityUpdate { name, description };
    let updated = super::with_session(dir, |map, session| map.update_node(session, id, &update))?;

    println!("{} #{} {}", style("Updated").green(), updated.id, updated.name);
    Ok(())
}
