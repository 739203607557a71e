//! Export the tree as JSON.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub fn run(dir: &Path, output: Option<&Path>) -> Result<()> {
    let map = super::open(dir)?;
    let json = map.export_json().map_err(super::describe)?;

    match output {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            let count = map.capability_count().map_err(super::describe)?;
            eprintln!("Exported {} capabilities to {}", count, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
