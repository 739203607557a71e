//! CLI commands.

pub mod add;
pub mod check;
pub mod edit;
pub mod export;
pub mod import;
pub mod init;
pub mod mv;
pub mod remove;
pub mod render;
pub mod shell;
pub mod tree;

use anyhow::{Context, Result};
use capmap_core::{CapError, CapabilityMap, SessionId};
use std::path::Path;

/// Nickname of the transient session single commands run as.
const CLI_NICKNAME: &str = "cli";

/// Opens the map in `dir` and runs `f` as one transient session.
///
/// The session leaves before returning, so it never keeps locks behind.
pub fn with_session<T>(
    dir: &Path,
    f: impl FnOnce(&CapabilityMap, &SessionId) -> capmap_core::Result<T>,
) -> Result<T> {
    let map = open(dir)?;
    let session = map.join(CLI_NICKNAME)?.session_id;
    tracing::debug!(session = %session, "cli session joined");
    let result = f(&map, &session);
    map.leave(&session)?;
    map.flush_storage()
        .context("Failed to write the capability map")?;
    result.map_err(describe)
}

/// Opens the map in `dir`.
pub fn open(dir: &Path) -> Result<CapabilityMap> {
    CapabilityMap::open(dir).with_context(|| {
        format!(
            "Failed to open capability map in {} (run 'capmap init' first)",
            dir.display()
        )
    })
}

/// Turns a core error into a user-facing error carrying its recovery hint.
pub fn describe(err: CapError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{}\n  hint: {}", err, hint),
        None => anyhow::Error::new(err),
    }
}
