//! Guarded holder for the current metadata snapshot of one kind.
//!
//! `MetaOwner` pairs an `ArcSwap` (lock-free snapshot reads from any number
//! of request-serving threads) with a writer mutex held across
//! compare-decide-install critical sections. Readers always observe some
//! fully installed snapshot; writers serialize through [`MetaOwner::lock`].
//!
//! Persistence is local-only: one file per node holding the last installed
//! snapshot, written via temp-file-and-rename so a crash cannot leave a
//! torn file behind.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use reefstore_core::VersionedMeta;

use super::errors::OwnerError;

/// Single-writer owner of the current snapshot for one metadata kind.
pub struct MetaOwner<T: VersionedMeta> {
    current: ArcSwap<T>,
    writer: Mutex<()>,
    persist_path: Option<PathBuf>,
}

impl<T> MetaOwner<T>
where
    T: VersionedMeta + Serialize + DeserializeOwned,
{
    /// Creates an owner with no persistence backing (tests, bucket
    /// metadata — which is persisted by the metasync pathway, not here).
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            persist_path: None,
        }
    }

    /// Creates an owner that loads from and persists to `path`.
    #[must_use]
    pub fn with_persistence(initial: T, path: PathBuf) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            persist_path: Some(path),
        }
    }

    /// Returns the last installed snapshot. Lock-free.
    #[must_use]
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Acquires the writer lock.
    ///
    /// Must be held across any compare-decide-install sequence, and must
    /// never be held across an await point.
    #[must_use]
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Installs a new snapshot.
    ///
    /// No version check happens here: monotonicity is the caller's
    /// responsibility, enforced by deciding under [`MetaOwner::lock`].
    pub fn put(&self, snapshot: T) {
        self.current.store(Arc::new(snapshot));
    }

    /// Reads the persisted snapshot from disk.
    ///
    /// Returns [`OwnerError::NotPersisted`] when the owner has no
    /// persistence path or the file does not exist yet.
    pub fn load(&self) -> Result<T, OwnerError> {
        let path = self.persist_path.as_ref().ok_or(OwnerError::NotPersisted)?;
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(OwnerError::NotPersisted)
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Durably writes `snapshot` to the configured path.
    ///
    /// A no-op for owners without persistence. Failures are surfaced to the
    /// caller; at finalize they are fatal.
    pub fn persist(&self, snapshot: &T) -> Result<(), OwnerError> {
        let Some(path) = self.persist_path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}
