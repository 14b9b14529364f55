//! Per-device configuration snapshot store.
//!
//! Keeps exactly one snapshot per device address, overwritten on every batch
//! run. This is a single-level rollback, not a history: restoring a device
//! replays the most recent saved configuration in full.

use std::path::PathBuf;

use log::debug;

use crate::error::SweepError;

/// File-backed snapshot store, one file per device address.
#[derive(Debug, Clone)]
pub struct RollbackStore {
    dir: PathBuf,
}

impl RollbackStore {
    /// Opens the store, creating the directory if needed.
    ///
    /// Storage locations are created up front so every later save is a plain
    /// file write; the store carries no other state.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, SweepError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// Saves the snapshot for `address`, replacing any previous one.
    ///
    /// Concurrent saves for distinct addresses are safe; within one batch
    /// each address is owned by a single worker, so same-address writes
    /// never race.
    pub async fn save(&self, address: &str, text: &str) -> Result<(), SweepError> {
        let path = self.snapshot_path(address);
        tokio::fs::write(&path, text).await?;
        debug!("{}: snapshot saved ({} bytes)", address, text.len());
        Ok(())
    }

    /// Loads the latest snapshot for `address`.
    ///
    /// Returns [`SweepError::NoSnapshot`] when no batch has snapshotted this
    /// address yet.
    pub async fn load(&self, address: &str) -> Result<String, SweepError> {
        let path = self.snapshot_path(address);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(SweepError::NoSnapshot(address.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    // Addresses are sanitized so a hostname cannot point outside the
    // snapshot directory.
    fn snapshot_path(&self, address: &str) -> PathBuf {
        let safe: String = address
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.cfg"))
    }
}
