//! A snapshot pairs one vector index with the metadata store built in the
//! same run.
//!
//! The pair is immutable once built: a rebuild writes new artifacts and
//! readers move to them via [`SnapshotHandle::swap`], which exchanges an
//! `Arc` pointer under a write lock held only for the exchange. An
//! in-flight request keeps the `Arc` it already cloned, so it finishes on
//! the snapshot it started on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::meta::MetadataStore;
use crate::models::ChunkRecord;

/// Index artifact file name inside the data dir.
pub const INDEX_FILE: &str = "index.dvx";
/// Metadata artifact file name inside the data dir.
pub const META_FILE: &str = "meta.json";

/// One consistent, immutable index + metadata pair.
#[derive(Debug, Clone)]
pub struct Snapshot {
    index: VectorIndex,
    meta: MetadataStore,
}

impl Snapshot {
    /// Bind an index and a metadata store, refusing any disagreement
    /// between them.
    ///
    /// # Errors
    ///
    /// `Integrity` if the snapshot ids differ, the row counts differ, or
    /// the metadata header's dimension does not match the index.
    pub fn new(index: VectorIndex, meta: MetadataStore) -> Result<Self> {
        if index.snapshot_id() != meta.snapshot_id() {
            return Err(Error::Integrity(format!(
                "snapshot id mismatch: index {} vs metadata {}",
                index.snapshot_id(),
                meta.snapshot_id()
            )));
        }
        if index.len() != meta.len() {
            return Err(Error::Integrity(format!(
                "row count mismatch: index has {} rows, metadata has {}",
                index.len(),
                meta.len()
            )));
        }
        if meta.dims() != index.dim() {
            return Err(Error::Integrity(format!(
                "dimension mismatch: index is {}-dim, metadata header says {}",
                index.dim(),
                meta.dims()
            )));
        }
        Ok(Self { index, meta })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn meta(&self) -> &MetadataStore {
        &self.meta
    }

    pub fn snapshot_id(&self) -> Uuid {
        self.index.snapshot_id()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// The metadata record for an index row.
    pub fn record(&self, row: usize) -> Option<ChunkRecord> {
        self.meta.get(row)
    }

    pub fn index_path(dir: &Path) -> PathBuf {
        dir.join(INDEX_FILE)
    }

    pub fn meta_path(dir: &Path) -> PathBuf {
        dir.join(META_FILE)
    }

    /// Persist both artifacts into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        self.index.save(&Self::index_path(dir))?;
        self.meta.save(&Self::meta_path(dir))?;
        Ok(())
    }

    /// Load and validate the artifact pair from `dir`.
    ///
    /// # Errors
    ///
    /// `Integrity` when either artifact is missing or unreadable, or when
    /// the pair fails [`Snapshot::new`] validation.
    pub fn load(dir: &Path) -> Result<Self> {
        let index_path = Self::index_path(dir);
        let meta_path = Self::meta_path(dir);
        if !index_path.exists() && !meta_path.exists() {
            return Err(Error::Integrity(format!(
                "no snapshot found in {} (run `dvx build` first)",
                dir.display()
            )));
        }
        let index = VectorIndex::load(&index_path)?;
        let meta = MetadataStore::load(&meta_path)?;
        Self::new(index, meta)
    }
}

/// Shared, swappable reference to the live snapshot.
#[derive(Debug)]
pub struct SnapshotHandle {
    inner: RwLock<Arc<Snapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Clone the current snapshot pointer. Callers hold it for as long as
    /// they need a consistent view; a concurrent swap does not affect them.
    pub fn current(&self) -> Arc<Snapshot> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Replace the live snapshot. The lock is held only for the pointer
    /// exchange.
    pub fn swap(&self, snapshot: Snapshot) {
        let next = Arc::new(snapshot);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}
