//! Batch orchestration across a device fleet.
//!
//! A [`BatchRunner`] drives the per-device pipeline (detect dialect →
//! snapshot → execute → snapshot → diff → release) for every requested
//! address, with bounded concurrency and full failure isolation: one
//! device's failure never aborts its siblings, and every requested address
//! appears exactly once in the aggregated result.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, warn};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config;
use crate::diff;
use crate::error::SweepError;
use crate::ledger::{JobLedger, JobRecord};
use crate::rollback::RollbackStore;
use crate::session::{Connector, Credentials, DeviceSession, DeviceTarget, detect};

/// Execution mode flags for one batch run.
///
/// All flags off is a connectivity-and-snapshot pass: every device is
/// detected and snapshotted but nothing executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RunOptions {
    /// Run each command read-only and capture its output.
    pub execute: bool,
    /// Push the commands as one configuration-set transaction.
    pub configure: bool,
    /// Snapshot only: skip execution entirely, mutate nothing.
    pub dry_run: bool,
}

/// Outcome recorded for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeviceOutcome {
    pub success: bool,
    /// `ok` on success, otherwise the underlying error text for operator
    /// diagnosis.
    pub message: String,
}

/// Aggregated result of one batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct BatchResult {
    /// Every requested address maps to exactly one outcome, regardless of
    /// where in the pipeline it failed.
    pub outcomes: BTreeMap<String, DeviceOutcome>,
    /// Human-readable step lines, in input device order.
    pub output: Vec<String>,
    /// Concatenated unified-diff lines across all devices.
    pub diff: Vec<String>,
    /// Set when the job ledger could not be updated. The batch result
    /// itself stays valid.
    pub ledger_error: Option<String>,
}

/// Cancels devices that have not started yet.
///
/// In-flight devices are left to finish or time out so no device is
/// abandoned mid-transaction. The flag covers one run: it is cleared when
/// the run it cancelled finishes, so later batches on the same runner
/// start fresh.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Top-level coordinator for batch operations.
///
/// Storage handles are passed in explicitly; the runner keeps no global
/// state and can coexist with other runners over separate directories.
pub struct BatchRunner {
    connector: Arc<dyn Connector>,
    store: RollbackStore,
    ledger: JobLedger,
    max_concurrency: usize,
    cancelled: Arc<AtomicBool>,
}

// Per-device result assembled by a worker before aggregation.
struct DeviceReport {
    outcome: DeviceOutcome,
    lines: Vec<String>,
    diff: Vec<String>,
}

impl DeviceReport {
    fn failed(address: &str, err: &SweepError, mut lines: Vec<String>) -> Self {
        lines.push(format!("[{address}] FAILED: {err}"));
        Self {
            outcome: DeviceOutcome {
                success: false,
                message: err.to_string(),
            },
            lines,
            diff: Vec::new(),
        }
    }
}

impl BatchRunner {
    pub fn new(connector: Arc<dyn Connector>, store: RollbackStore, ledger: JobLedger) -> Self {
        Self {
            connector,
            store,
            ledger,
            max_concurrency: config::MAX_CONCURRENT_DEVICES,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bounds how many devices are processed concurrently. Clamped to at
    /// least one.
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit.max(1);
        self
    }

    /// Handle for aborting not-yet-started devices of the batch currently
    /// running (or the next one to start) on this runner.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Checks which devices can be reached and authenticated.
    ///
    /// Each successful detection releases its session immediately; no
    /// snapshot is taken and nothing is recorded in the ledger.
    pub async fn check_connectivity(
        &self,
        addresses: &[String],
        credentials: &Credentials,
    ) -> BTreeMap<String, bool> {
        let futures: Vec<_> = addresses
            .iter()
            .map(|address| {
                let connector = Arc::clone(&self.connector);
                let target = DeviceTarget::new(address.clone(), credentials.clone());
                async move {
                    match detect(connector.as_ref(), &target).await {
                        Ok((mut session, dialect)) => {
                            debug!("{}: reachable as {}", target.address, dialect);
                            if let Err(err) = session.disconnect().await {
                                debug!("{}: disconnect failed: {}", target.address, err);
                            }
                            true
                        }
                        Err(err) => {
                            debug!("{}: unreachable: {}", target.address, err);
                            false
                        }
                    }
                }
            })
            .collect();

        let results = self.scatter(futures).await;
        addresses
            .iter()
            .zip(results)
            .map(|(address, reachable)| (address.clone(), reachable.unwrap_or(false)))
            .collect()
    }

    /// Runs one batch across all addresses and aggregates per-device
    /// outcomes, step lines, and diffs.
    ///
    /// Devices run concurrently under the configured bound, each through
    /// the full pipeline. After all devices are processed the ledger is
    /// updated once with the device count; a ledger failure is reported in
    /// the result rather than propagated.
    pub async fn run_batch(
        &self,
        addresses: &[String],
        credentials: &Credentials,
        commands: &[String],
        options: RunOptions,
    ) -> BatchResult {
        let futures: Vec<_> = addresses
            .iter()
            .map(|address| {
                let connector = Arc::clone(&self.connector);
                let store = self.store.clone();
                let target = DeviceTarget::new(address.clone(), credentials.clone());
                let commands = commands.to_vec();
                async move { process_device(connector, store, target, &commands, options).await }
            })
            .collect();

        let reports = self.scatter(futures).await;
        let mut result = self.assemble(addresses, reports);

        if let Err(err) = self.ledger.record(addresses.len()).await {
            warn!("batch finished but ledger update failed: {err}");
            result.ledger_error = Some(err.to_string());
        }

        result
    }

    /// Restores every address from its stored snapshot.
    ///
    /// The whole saved configuration is pushed back as one config-set per
    /// device; this is a blunt full restore, not a reverse-diff. A missing
    /// snapshot fails that device only.
    pub async fn rollback_batch(
        &self,
        addresses: &[String],
        credentials: &Credentials,
    ) -> BatchResult {
        let futures: Vec<_> = addresses
            .iter()
            .map(|address| {
                let connector = Arc::clone(&self.connector);
                let store = self.store.clone();
                let target = DeviceTarget::new(address.clone(), credentials.clone());
                async move { rollback_device(connector, store, target).await }
            })
            .collect();

        let reports = self.scatter(futures).await;
        self.assemble(addresses, reports)
    }

    /// Full job history, oldest first.
    pub async fn history(&self) -> Vec<JobRecord> {
        self.ledger.history().await
    }

    // Runs the prepared per-device futures under the concurrency bound.
    // `None` in a slot means the device never started (cancelled or its
    // worker aborted); slots line up with input order.
    async fn scatter<T, Fut>(&self, futures: Vec<Fut>) -> Vec<Option<T>>
    where
        T: Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let total = futures.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for (index, device_future) in futures.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&self.cancelled);
            join_set.spawn(async move {
                let permit = semaphore.acquire_owned().await;
                if permit.is_err() || cancelled.load(Ordering::SeqCst) {
                    return (index, None);
                }
                (index, Some(device_future.await))
            });
        }

        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(total).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, value)) => results[index] = value,
                Err(err) => warn!("device worker aborted: {err}"),
            }
        }

        // A cancellation is consumed by the run that observed it; the next
        // run on this runner starts with a clear flag.
        if self.cancelled.swap(false, Ordering::SeqCst) {
            debug!("cancellation consumed, runner reset for the next batch");
        }
        results
    }

    fn assemble(&self, addresses: &[String], reports: Vec<Option<DeviceReport>>) -> BatchResult {
        let mut result = BatchResult::default();
        for (address, report) in addresses.iter().zip(reports) {
            match report {
                Some(report) => {
                    result.output.extend(report.lines);
                    result.diff.extend(report.diff);
                    result.outcomes.insert(address.clone(), report.outcome);
                }
                None => {
                    result.output.push(format!("[{address}] CANCELLED"));
                    result.outcomes.insert(
                        address.clone(),
                        DeviceOutcome {
                            success: false,
                            message: "cancelled before start".to_string(),
                        },
                    );
                }
            }
        }
        result
    }
}

/// One device's full pipeline. Isolated from siblings: every error is
/// converted into the report, nothing propagates.
async fn process_device(
    connector: Arc<dyn Connector>,
    store: RollbackStore,
    target: DeviceTarget,
    commands: &[String],
    options: RunOptions,
) -> DeviceReport {
    let address = target.address.clone();
    let mut lines = Vec::new();
    let mut diff_lines = Vec::new();

    let (mut session, dialect) = match detect(connector.as_ref(), &target).await {
        Ok(pair) => pair,
        Err(err) => return DeviceReport::failed(&address, &err, lines),
    };
    lines.push(format!("[{address}] dialect: {dialect}"));

    let pipeline = run_device_pipeline(
        session.as_mut(),
        &store,
        &address,
        dialect.profile().show_running,
        commands,
        options,
        &mut lines,
        &mut diff_lines,
    )
    .await;

    // Released unconditionally, whatever the pipeline did.
    if let Err(err) = session.disconnect().await {
        debug!("{address}: disconnect failed: {err}");
    }

    match pipeline {
        Ok(()) => {
            lines.push(format!("[{address}] SUCCESS"));
            DeviceReport {
                outcome: DeviceOutcome {
                    success: true,
                    message: "ok".to_string(),
                },
                lines,
                diff: diff_lines,
            }
        }
        Err(err) => {
            let mut report = DeviceReport::failed(&address, &err, lines);
            report.diff = diff_lines;
            report
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_device_pipeline(
    session: &mut dyn DeviceSession,
    store: &RollbackStore,
    address: &str,
    show_running: &str,
    commands: &[String],
    options: RunOptions,
    lines: &mut Vec<String>,
    diff_lines: &mut Vec<String>,
) -> Result<(), SweepError> {
    let before = session.run_command(show_running).await?;
    store.save(address, &before).await?;

    if !options.dry_run {
        if options.execute {
            for command in commands {
                let out = session.run_command(command).await?;
                lines.push(format!("[{address}] $ {command}\n{out}"));
            }
        }
        if options.configure {
            let out = session.run_config_set(commands).await?;
            lines.push(format!("[{address}] CONFIG:\n{out}"));
        }
    }

    let after = session.run_command(show_running).await?;
    // Empty for an unchanged device.
    diff_lines.extend(diff::unified(&before, &after));
    Ok(())
}

async fn rollback_device(
    connector: Arc<dyn Connector>,
    store: RollbackStore,
    target: DeviceTarget,
) -> DeviceReport {
    let address = target.address.clone();
    let mut lines = Vec::new();

    let snapshot = match store.load(&address).await {
        Ok(snapshot) => snapshot,
        Err(err) => return DeviceReport::failed(&address, &err, lines),
    };

    let (mut session, dialect) = match detect(connector.as_ref(), &target).await {
        Ok(pair) => pair,
        Err(err) => return DeviceReport::failed(&address, &err, lines),
    };

    let config_lines: Vec<String> = snapshot.lines().map(str::to_string).collect();
    let pushed = session.run_config_set(&config_lines).await;

    if let Err(err) = session.disconnect().await {
        debug!("{address}: disconnect failed: {err}");
    }

    match pushed {
        Ok(_) => {
            lines.push(format!("[{address}] ROLLED BACK ({dialect})"));
            DeviceReport {
                outcome: DeviceOutcome {
                    success: true,
                    message: "rolled back".to_string(),
                },
                lines,
                diff: Vec::new(),
            }
        }
        Err(err) => DeviceReport::failed(&address, &err, lines),
    }
}
