//! # cfgsweep - Bulk Configuration Runner for Network Devices
//!
//! `cfgsweep` automates configuration changes across a fleet of network
//! devices (routers, firewalls) reachable over interactive SSH CLI sessions.
//! For a list of addresses sharing one credential bundle it detects each
//! device's command dialect, executes a batch of commands, captures a
//! pre-change configuration snapshot for rollback, and reports a unified
//! diff of what changed - with every device isolated from its siblings'
//! failures.
//!
//! ## Features
//!
//! - **Dialect Auto-Detection**: Tries a fixed priority order of CLI flavors
//!   until one authenticates and reaches privileged mode
//! - **Failure Isolation**: A device that cannot be reached or rejects a
//!   command never aborts the rest of the batch
//! - **Rollback Snapshots**: The pre-change configuration of every device is
//!   stored and can be pushed back in full
//! - **Unified Diffs**: Before/after configuration diffs per device, in
//!   standard unified format
//! - **Job History**: Every batch run is recorded in an append-only ledger
//! - **Async/Await**: Built on Tokio with a bounded per-batch worker pool
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cfgsweep::batch::{BatchRunner, RunOptions};
//! use cfgsweep::ledger::JobLedger;
//! use cfgsweep::rollback::RollbackStore;
//! use cfgsweep::session::{Credentials, SshConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = RollbackStore::open("data/rollback").await?;
//!     let ledger = JobLedger::open("data/jobs.json").await?;
//!     let runner = BatchRunner::new(Arc::new(SshConnector::new()), store, ledger);
//!
//!     let credentials = Credentials {
//!         username: "admin".to_string(),
//!         password: "password".to_string(),
//!         enable_secret: "enable".to_string(),
//!     };
//!     let addresses = vec!["192.168.1.1".to_string(), "192.168.1.2".to_string()];
//!     let commands = vec!["show version".to_string()];
//!
//!     let result = runner
//!         .run_batch(
//!             &addresses,
//!             &credentials,
//!             &commands,
//!             RunOptions {
//!                 execute: true,
//!                 ..Default::default()
//!             },
//!         )
//!         .await;
//!
//!     for line in &result.output {
//!         println!("{line}");
//!     }
//!     for line in &result.diff {
//!         println!("{line}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`batch::BatchRunner`] - Orchestrates the per-device pipeline across a fleet
//! - [`session::SshConnector`] - Opens authenticated, privilege-elevated sessions
//! - [`dialect::Dialect`] - Supported CLI flavors and their interaction profiles
//! - [`rollback::RollbackStore`] - One-generation-deep snapshot store
//! - [`ledger::JobLedger`] - Append-only batch history
//! - [`error::SweepError`] - Error types for all batch operations

pub mod batch;
pub mod config;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod ledger;
pub mod rollback;
pub mod session;
