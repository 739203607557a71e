//! Durable storage for the capability tree.
//!
//! The map persists through the [`TreeStorage`] trait: load the full image
//! once at open, then save one [`TreeMutation`] per admitted change. Locks,
//! presence and the change feed are session state and are never stored.

use crate::error::{CapError, Result};
use crate::tree::{TreeImage, TreeStore};
use crate::types::{Capability, CapabilityId};
use redb::{Database, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Storage schema version for migration support.
pub const STORAGE_SCHEMA_VERSION: u64 = 1;

// Table definitions
const META_TABLE: TableDefinition<&str, u64> = TableDefinition::new("meta");
const BLOB_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");
const CAPABILITY_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("capabilities");

const SCHEMA_KEY: &str = "schema_version";
const NEXT_ID_KEY: &str = "next_id";
const ROOTS_KEY: &str = "roots";

/// Records changed by one admitted mutation.
///
/// Applied in order: `clear`, then `removals`, then `upserts`, then `roots`
/// when present. `next_id` is always written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeMutation {
    /// Drop every stored record first.
    pub clear: bool,
    /// Records to insert or overwrite.
    pub upserts: Vec<Capability>,
    /// Records to delete.
    pub removals: Vec<CapabilityId>,
    /// New root order, if it changed.
    pub roots: Option<Vec<CapabilityId>>,
    /// Id allocator state after the mutation.
    pub next_id: u64,
}

impl TreeMutation {
    /// Starts an empty mutation for the current tree state.
    pub fn new(tree: &TreeStore) -> Self {
        Self {
            next_id: tree.next_id(),
            ..Self::default()
        }
    }

    /// A mutation replacing the stored tree with `tree` entirely.
    pub fn full(tree: &TreeStore) -> Self {
        let image = tree.image();
        Self {
            clear: true,
            upserts: image.capabilities,
            removals: Vec::new(),
            roots: Some(image.roots),
            next_id: image.next_id,
        }
    }

    /// Records the current content of `id`. Ids no longer in the tree are skipped.
    pub fn touch(mut self, tree: &TreeStore, id: CapabilityId) -> Self {
        if let Ok(capability) = tree.get(id) {
            self.upserts.retain(|c| c.id != id);
            self.upserts.push(capability.clone());
        }
        self
    }

    /// Records the child list owning a position: a parent record, or the
    /// root order for `None`.
    pub fn touch_slot(self, tree: &TreeStore, parent: Option<CapabilityId>) -> Self {
        match parent {
            Some(id) => self.touch(tree, id),
            None => Self {
                roots: Some(tree.roots().to_vec()),
                ..self
            },
        }
    }

    /// Records deleted ids.
    pub fn remove(mut self, ids: &[CapabilityId]) -> Self {
        self.removals.extend_from_slice(ids);
        self
    }
}

/// Abstract durable store for tree state.
pub trait TreeStorage: Send + Sync {
    /// Loads the full stored tree, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<TreeImage>>;

    /// Applies one mutation atomically.
    fn save(&self, mutation: &TreeMutation) -> Result<()>;
}

impl<S: TreeStorage + ?Sized> TreeStorage for Arc<S> {
    fn load(&self) -> Result<Option<TreeImage>> {
        (**self).load()
    }

    fn save(&self, mutation: &TreeMutation) -> Result<()> {
        (**self).save(mutation)
    }
}

fn storage_err<E: Display>(context: &'static str) -> impl FnOnce(E) -> CapError {
    move |e| CapError::Storage(format!("{}: {}", context, e))
}

#[derive(Debug, Default)]
struct MemoryState {
    saved: bool,
    records: BTreeMap<CapabilityId, Capability>,
    roots: Vec<CapabilityId>,
    next_id: u64,
}

/// In-process storage for tests and ephemeral hosts.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
    failing: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `save` fail until reset. Used to exercise
    /// write retry.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TreeStorage for MemoryStorage {
    fn load(&self) -> Result<Option<TreeImage>> {
        let state = self.state.lock().map_err(|_| CapError::StatePoisoned)?;
        if !state.saved {
            return Ok(None);
        }
        Ok(Some(TreeImage {
            capabilities: state.records.values().cloned().collect(),
            roots: state.roots.clone(),
            next_id: state.next_id,
        }))
    }

    fn save(&self, mutation: &TreeMutation) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CapError::Storage("memory storage is set to fail".to_string()));
        }
        let mut state = self.state.lock().map_err(|_| CapError::StatePoisoned)?;
        if mutation.clear {
            state.records.clear();
            state.roots.clear();
        }
        for id in &mutation.removals {
            state.records.remove(id);
        }
        for capability in &mutation.upserts {
            state.records.insert(capability.id, capability.clone());
        }
        if let Some(roots) = &mutation.roots {
            state.roots = roots.clone();
        }
        state.next_id = mutation.next_id;
        state.saved = true;
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// redb-backed storage.
///
/// Capability records are postcard-encoded, keyed by id. The root order
/// lives in a blob table and the id allocator in the metadata table.
pub struct RedbStorage {
    db: Database,
    path: PathBuf,
}

impl RedbStorage {
    /// Opens or creates a database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the database can't be opened or was written with a
    /// different schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path).map_err(storage_err("failed to open database"))?;

        let write_txn = db
            .begin_write()
            .map_err(storage_err("failed to begin write transaction"))?;
        {
            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(storage_err("failed to open metadata table"))?;
            let found = meta
                .get(SCHEMA_KEY)
                .map_err(storage_err("failed to read schema version"))?
                .map(|v| v.value());
            match found {
                Some(version) if version != STORAGE_SCHEMA_VERSION => {
                    return Err(CapError::Storage(format!(
                        "schema version mismatch: found {}, expected {}",
                        version, STORAGE_SCHEMA_VERSION
                    )));
                }
                Some(_) => {}
                None => {
                    meta.insert(SCHEMA_KEY, STORAGE_SCHEMA_VERSION)
                        .map_err(storage_err("failed to write schema version"))?;
                }
            }
            write_txn
                .open_table(BLOB_TABLE)
                .map_err(storage_err("failed to open blob table"))?;
            write_txn
                .open_table(CAPABILITY_TABLE)
                .map_err(storage_err("failed to open capability table"))?;
        }
        write_txn
            .commit()
            .map_err(storage_err("failed to commit"))?;

        Ok(Self { db, path })
    }

    /// Path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeStorage for RedbStorage {
    fn load(&self) -> Result<Option<TreeImage>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(storage_err("failed to begin read transaction"))?;

        let meta = read_txn
            .open_table(META_TABLE)
            .map_err(storage_err("failed to open metadata table"))?;
        let next_id = match meta
            .get(NEXT_ID_KEY)
            .map_err(storage_err("failed to read id allocator"))?
        {
            Some(value) => value.value(),
            None => return Ok(None),
        };

        let blobs = read_txn
            .open_table(BLOB_TABLE)
            .map_err(storage_err("failed to open blob table"))?;
        let roots: Vec<CapabilityId> = match blobs
            .get(ROOTS_KEY)
            .map_err(storage_err("failed to read roots"))?
        {
            Some(bytes) => postcard::from_bytes(bytes.value())
                .map_err(|e| CapError::Deserialization(format!("roots: {}", e)))?,
            None => Vec::new(),
        };

        let table = read_txn
            .open_table(CAPABILITY_TABLE)
            .map_err(storage_err("failed to open capability table"))?;
        let mut capabilities = Vec::new();
        for entry in table.iter().map_err(storage_err("failed to iterate capabilities"))? {
            let (key, value) = entry.map_err(storage_err("failed to read capability"))?;
            let capability: Capability = postcard::from_bytes(value.value()).map_err(|e| {
                CapError::Deserialization(format!("capability {}: {}", key.value(), e))
            })?;
            capabilities.push(capability);
        }

        Ok(Some(TreeImage {
            capabilities,
            roots,
            next_id,
        }))
    }

    fn save(&self, mutation: &TreeMutation) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(storage_err("failed to begin write transaction"))?;

        {
            let mut capabilities = write_txn
                .open_table(CAPABILITY_TABLE)
                .map_err(storage_err("failed to open capability table"))?;

            if mutation.clear {
                let keys = capabilities
                    .iter()
                    .map_err(storage_err("failed to iterate capabilities"))?
                    .map(|entry| entry.map(|(key, _)| key.value()))
                    .collect::<std::result::Result<Vec<u64>, _>>()
                    .map_err(storage_err("failed to read capability"))?;
                for key in keys {
                    capabilities
                        .remove(key)
                        .map_err(storage_err("failed to remove capability"))?;
                }
            }

            for id in &mutation.removals {
                capabilities
                    .remove(id.0)
                    .map_err(storage_err("failed to remove capability"))?;
            }

            for capability in &mutation.upserts {
                let bytes = postcard::to_allocvec(capability)
                    .map_err(|e| CapError::Serialization(format!("capability {}: {}", capability.id, e)))?;
                capabilities
                    .insert(capability.id.0, bytes.as_slice())
                    .map_err(storage_err("failed to write capability"))?;
            }
        }

        if let Some(roots) = &mutation.roots {
            let bytes = postcard::to_allocvec(roots)
                .map_err(|e| CapError::Serialization(format!("roots: {}", e)))?;
            let mut blobs = write_txn
                .open_table(BLOB_TABLE)
                .map_err(storage_err("failed to open blob table"))?;
            blobs
                .insert(ROOTS_KEY, bytes.as_slice())
                .map_err(storage_err("failed to write roots"))?;
        }

        {
            let mut meta = write_txn
                .open_table(META_TABLE)
                .map_err(storage_err("failed to open metadata table"))?;
            meta.insert(NEXT_ID_KEY, mutation.next_id)
                .map_err(storage_err("failed to write id allocator"))?;
        }

        write_txn
            .commit()
            .map_err(storage_err("failed to commit"))?;
        Ok(())
    }
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").field("path", &self.path).finish()
    }
}
