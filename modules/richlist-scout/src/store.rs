//! Snapshot store: one JSON document holding the current list.
//!
//! Saves go through a temp file in the target directory that is synced and
//! then renamed over the old file, so readers only ever see the previous
//! complete snapshot or the new complete one.

use std::io::Write;
use std::path::{Path, PathBuf};

use richlist_common::Snapshot;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::PersistenceError;

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current snapshot, or empty if there is none yet or it cannot be read.
    /// Never fails: a bad baseline must not stop a live run from producing data.
    pub fn load(&self) -> Snapshot {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No previous snapshot, starting empty");
                return Snapshot::empty();
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Previous snapshot unreadable, starting empty");
                return Snapshot::empty();
            }
        };

        let snapshot: Snapshot = match serde_json::from_slice(&bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Previous snapshot undecodable, starting empty");
                return Snapshot::empty();
            }
        };

        if let Err(defects) = snapshot.validate() {
            for defect in &defects {
                warn!(path = %self.path.display(), %defect, "Previous snapshot defect");
            }
        }

        info!(
            path = %self.path.display(),
            records = snapshot.len(),
            placeholders = snapshot.placeholder_count(),
            "Loaded previous snapshot"
        );
        snapshot
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<(), PersistenceError> {
        if snapshot.is_empty() {
            return Err(PersistenceError::EmptySnapshot);
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|source| io_error(&dir, source))?;

        let json = serde_json::to_vec_pretty(snapshot)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|source| io_error(&dir, source))?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|source| io_error(tmp.path(), source))?;
        tmp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;

        info!(
            path = %self.path.display(),
            records = snapshot.len(),
            bytes = json.len(),
            "Snapshot saved"
        );
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PersistenceError {
    PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    }
}
