//! Error types for batch device automation.
//!
//! This module defines all errors that can occur during dialect detection,
//! command execution, snapshot handling, and job history persistence.

use thiserror::Error;
use tokio::sync::mpsc::error::SendError;

/// Errors that can occur while driving device sessions and batch runs.
#[derive(Error, Debug)]
pub enum SweepError {
    /// No supported dialect managed to authenticate and reach privileged mode.
    ///
    /// Per-dialect failure detail is logged at debug level during detection;
    /// only this summary error is surfaced to the caller.
    #[error("dialect detection failed for {0}")]
    DetectionFailed(String),

    /// The connection dropped, was refused, or closed mid-operation.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device reported an error for a command or configuration set.
    ///
    /// Contains the device output that matched one of the dialect's error
    /// patterns, for operator diagnosis.
    #[error("command rejected by device: {0}")]
    Execution(String),

    /// A connect attempt or command exchange exceeded its timeout.
    ///
    /// The error carries the partial output received before the timeout.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Rollback was requested for an address with no stored snapshot.
    #[error("no rollback snapshot for {0}")]
    NoSnapshot(String),

    /// Job history could not be persisted.
    ///
    /// Reported to the caller but never invalidates an already-computed
    /// batch result.
    #[error("job ledger write failed: {0}")]
    LedgerWrite(String),

    /// Filesystem error from the snapshot store or ledger.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Ledger file could not be encoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error occurred in the async-ssh2-tokio library.
    #[error("async ssh2 error: {0}")]
    Ssh2(#[from] async_ssh2_tokio::Error),

    /// An error occurred in the russh library.
    #[error("russh error: {0}")]
    Russh(#[from] russh::Error),

    /// Failed to send data through the shell channel.
    #[error("failed to send data: {0}")]
    SendData(#[from] SendError<String>),
}
