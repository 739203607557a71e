use anyhow::{Context, Result};
use capmap_core::{CapabilityMap, DATA_DIR};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated directory holding one map's data directory
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create an empty workspace
    pub fn empty() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp directory")?;
        Ok(Self { dir })
    }

    /// Get workspace path
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the data directory a map creates here
    pub fn data_dir(&self) -> PathBuf {
        self.path().join(DATA_DIR)
    }

    /// Initialize a map in the workspace
    pub fn init_map(&self) -> Result<CapabilityMap> {
        Ok(CapabilityMap::init(self.path())?)
    }

    /// Open the existing map
    pub fn open_map(&self) -> Result<CapabilityMap> {
        Ok(CapabilityMap::open(self.path())?)
    }

    /// Write a file relative to the workspace
    pub fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directories for {}", path))?;
        }
        fs::write(&full_path, content).with_context(|| format!("Failed to write file: {}", path))
    }

    /// Read a file relative to the workspace
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.path().join(path);
        fs::read(&full_path).with_context(|| format!("Failed to read file: {}", path))
    }
}
