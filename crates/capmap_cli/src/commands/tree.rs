//! Print the capability tree.

use anyhow::Result;
use capmap_core::CapabilityId;
use std::path::Path;

pub fn run(dir: &Path, id: Option<CapabilityId>) -> Result<()> {
    let forest = super::with_session(dir, |map, session| map.get_tree(session, id))?;
    super::render::print_tree(&forest);
    Ok(())
}
