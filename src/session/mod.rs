//! Device sessions and connection establishment.
//!
//! A [`DeviceSession`] is an authenticated, privilege-elevated connection to
//! exactly one device, used for one batch operation and released on every
//! exit path. A [`Connector`] knows how to open such a session for a given
//! dialect; [`detect`] walks the dialect priority order until one connector
//! attempt succeeds.
//!
//! # Main Components
//!
//! - [`DeviceSession`] / [`Connector`] - the seams the orchestrator works
//!   against, mockable in tests
//! - [`SshConnector`] - production implementation over async-ssh2-tokio
//! - [`detect`] - dialect auto-detection with first-match-wins semantics

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::dialect::Dialect;
use crate::error::SweepError;

mod detect;
mod ssh;

pub use detect::detect;
pub use ssh::{SshConnector, SshSession};

/// Credential bundle shared by every device in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Privileged-mode secret. May be empty when the device has none.
    #[serde(default)]
    pub enable_secret: String,
}

/// One target device, built per batch per address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceTarget {
    /// Hostname or IP the device is reachable at.
    pub address: String,
    /// SSH port, usually 22.
    pub port: u16,
    pub credentials: Credentials,
}

impl DeviceTarget {
    /// Builds a target on the default SSH port.
    pub fn new(address: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            address: address.into(),
            port: config::DEFAULT_SSH_PORT,
            credentials,
        }
    }
}

/// An authenticated, privilege-elevated connection to one device.
///
/// Implementations must tolerate `disconnect` being called after a failed
/// command; the orchestrator releases sessions unconditionally.
#[async_trait]
pub trait DeviceSession: Send {
    /// Executes a single read-only command and returns its raw text output.
    ///
    /// Commands are opaque strings; no parsing or validation is applied.
    async fn run_command(&mut self, command: &str) -> Result<String, SweepError>;

    /// Pushes a set of configuration lines as one transaction and returns
    /// the combined device output.
    async fn run_config_set(&mut self, lines: &[String]) -> Result<String, SweepError>;

    /// Releases the connection. Idempotent.
    async fn disconnect(&mut self) -> Result<(), SweepError>;
}

/// Opens sessions for a specific dialect.
///
/// One `open` call covers the full capability chain: connect, authenticate,
/// elevate to privileged mode. Any step failing closes whatever was opened
/// and returns the error.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(
        &self,
        dialect: Dialect,
        target: &DeviceTarget,
    ) -> Result<Box<dyn DeviceSession>, SweepError>;
}
