//! Tree consistency check.

use anyhow::Result;
use console::style;
use std::path::Path;

/// Verify the stored tree satisfies the forest invariant.
pub fn run(dir: &Path) -> Result<()> {
    // Opening already rejects an inconsistent image; run the full check anyway
    // so the report covers lock state too.
    let map = super::open(dir)?;
    map.check_consistency().map_err(super::describe)?;

    let count = map.capability_count().map_err(super::describe)?;
    let roots = map.children(None).map_err(super::describe)?.len();

    println!("{}", style("Consistency Report:").bold());
    println!("  Capabilities: {}", style(count).cyan());
    println!("  Roots:        {}", style(roots).cyan());
    println!();
    println!("{}", style("✓ Capability tree is consistent").green());
    Ok(())
}
