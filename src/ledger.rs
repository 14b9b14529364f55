//! Append-only job history.
//!
//! Every batch run leaves one timestamped record with the number of devices
//! it targeted. Records are never rewritten or removed; history order is
//! append order, which is chronological.

use std::path::PathBuf;

use chrono::Local;
use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::SweepError;

/// One recorded batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Calendar date of the run, `YYYY-MM-DD`.
    pub date: String,
    /// Wall-clock time of the run, `HH:MM:SS`.
    pub time: String,
    /// Number of devices targeted by the batch.
    pub devices: usize,
}

/// JSON-file-backed ledger of batch runs.
#[derive(Debug, Clone)]
pub struct JobLedger {
    path: PathBuf,
}

impl JobLedger {
    /// Opens the ledger, creating parent directories if needed. The file
    /// itself is created lazily on the first append.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SweepError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self { path })
    }

    /// Appends one record stamped with the current local date and time.
    ///
    /// Failures surface as [`SweepError::LedgerWrite`]; callers report them
    /// without discarding the batch result that triggered the append.
    pub async fn record(&self, device_count: usize) -> Result<JobRecord, SweepError> {
        let now = Local::now();
        let record = JobRecord {
            date: now.format("%Y-%m-%d").to_string(),
            time: now.format("%H:%M:%S").to_string(),
            devices: device_count,
        };

        let mut records = self.read_all().await;
        records.push(record.clone());

        let encoded = serde_json::to_vec_pretty(&records)
            .map_err(|err| SweepError::LedgerWrite(err.to_string()))?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(|err| SweepError::LedgerWrite(err.to_string()))?;

        debug!("job ledger: recorded batch of {} devices", device_count);
        Ok(record)
    }

    /// Returns all records, oldest first.
    pub async fn history(&self) -> Vec<JobRecord> {
        self.read_all().await
    }

    // An unreadable or corrupt ledger reads as empty history; the next
    // successful append rewrites the file wholesale, which repairs it.
    async fn read_all(&self) -> Vec<JobRecord> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!("job ledger unreadable, treating as empty: {err}");
                return Vec::new();
            }
        };
        match serde_json::from_slice(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!("job ledger corrupt, treating as empty: {err}");
                Vec::new()
            }
        }
    }
}
