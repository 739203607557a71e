//! Initialize a new capability map.

use anyhow::{Context, Result};
use capmap_core::{CapabilityMap, CONFIG_FILE, DATA_DIR};
use std::path::Path;

/// Initialize a new capability map in `dir`.
pub fn run(dir: &Path) -> Result<()> {
    let map = CapabilityMap::init(dir).context("Failed to initialize capability map")?;
    let config = map.config();

    println!("Initialized capability map in {}/", DATA_DIR);
    println!();
    println!("  {}/{:<14} - configuration", DATA_DIR, CONFIG_FILE);
    println!(
        "  {}/{:<14} - capability tree",
        DATA_DIR, config.storage.database
    );
    println!();
    println!("Locks and sessions live only while a host runs; 'capmap shell' starts one.");

    Ok(())
}
