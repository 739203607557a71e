//! Replace the tree with a JSON export.

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;

pub fn run(dir: &Path, file: &Path) -> Result<()> {
    let json = fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let (roots, count) = super::with_session(dir, |map, session| {
        let roots = map.import_json(session, &json)?;
        Ok((roots, map.capability_count()?))
    })?;

    println!(
        "{} {} capabilities in {} root(s) from {}",
        style("Imported").green(),
        count,
        roots.len(),
        file.display()
    );
    Ok(())
}
