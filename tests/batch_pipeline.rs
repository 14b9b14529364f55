//! End-to-end batch pipeline tests over a scripted connector.
//!
//! Devices are simulated in memory: each address is scripted with the
//! dialect it accepts, its running configuration, and optional failure
//! modes. No SSH is involved, so every test drives the real orchestrator,
//! rollback store, diff engine, and ledger.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cfgsweep::batch::{BatchRunner, RunOptions};
use cfgsweep::dialect::Dialect;
use cfgsweep::error::SweepError;
use cfgsweep::ledger::JobLedger;
use cfgsweep::rollback::RollbackStore;
use cfgsweep::session::{Connector, Credentials, DeviceSession, DeviceTarget};

/// Scripted behavior for one simulated device.
#[derive(Clone)]
struct DeviceScript {
    /// The only dialect this device authenticates for.
    dialect: Dialect,
    /// Mutable running configuration, shared with open sessions.
    running_config: Arc<Mutex<String>>,
    /// Refuse every connection attempt.
    reject_auth: bool,
    /// Read-only command that the device rejects.
    failing_command: Option<String>,
    /// Reject every configuration set.
    reject_config: bool,
    /// Every config-set pushed to the device, in order.
    config_sets: Arc<Mutex<Vec<Vec<String>>>>,
    /// Successful session opens and disconnects, for leak checks.
    opens: Arc<Mutex<usize>>,
    disconnects: Arc<Mutex<usize>>,
}

impl DeviceScript {
    fn new(dialect: Dialect, config: &str) -> Self {
        Self {
            dialect,
            running_config: Arc::new(Mutex::new(config.to_string())),
            reject_auth: false,
            failing_command: None,
            reject_config: false,
            config_sets: Arc::new(Mutex::new(Vec::new())),
            opens: Arc::new(Mutex::new(0)),
            disconnects: Arc::new(Mutex::new(0)),
        }
    }

    fn rejecting_auth(mut self) -> Self {
        self.reject_auth = true;
        self
    }

    fn rejecting_command(mut self, command: &str) -> Self {
        self.failing_command = Some(command.to_string());
        self
    }

    fn rejecting_config(mut self) -> Self {
        self.reject_config = true;
        self
    }

    fn config(&self) -> String {
        self.running_config.lock().expect("config lock").clone()
    }

    fn open_count(&self) -> usize {
        *self.opens.lock().expect("opens lock")
    }

    fn disconnect_count(&self) -> usize {
        *self.disconnects.lock().expect("disconnects lock")
    }
}

struct MockConnector {
    devices: HashMap<String, DeviceScript>,
}

struct MockSession {
    script: DeviceScript,
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        dialect: Dialect,
        target: &DeviceTarget,
    ) -> Result<Box<dyn DeviceSession>, SweepError> {
        let script = self
            .devices
            .get(&target.address)
            .ok_or_else(|| SweepError::Transport(format!("{}: no route", target.address)))?;
        if script.reject_auth {
            return Err(SweepError::Transport(format!(
                "{}: authentication failed",
                target.address
            )));
        }
        if dialect != script.dialect {
            return Err(SweepError::Transport(format!(
                "{}: prompt never matched for {}",
                target.address, dialect
            )));
        }
        *script.opens.lock().expect("opens lock") += 1;
        Ok(Box::new(MockSession {
            script: script.clone(),
        }))
    }
}

#[async_trait]
impl DeviceSession for MockSession {
    async fn run_command(&mut self, command: &str) -> Result<String, SweepError> {
        if command == self.script.dialect.profile().show_running {
            return Ok(self.script.config());
        }
        if self.script.failing_command.as_deref() == Some(command) {
            return Err(SweepError::Execution(format!(
                "% Invalid input detected: {command}"
            )));
        }
        Ok(format!("{command}: ok"))
    }

    async fn run_config_set(&mut self, lines: &[String]) -> Result<String, SweepError> {
        if self.script.reject_config {
            return Err(SweepError::Execution("config rejected".to_string()));
        }
        self.script
            .config_sets
            .lock()
            .expect("config_sets lock")
            .push(lines.to_vec());
        for line in lines {
            if line.starts_with("hostname ") {
                let mut config = self.script.running_config.lock().expect("config lock");
                *config = format!("{line}\n");
            }
        }
        Ok("applied".to_string())
    }

    async fn disconnect(&mut self) -> Result<(), SweepError> {
        *self.script.disconnects.lock().expect("disconnects lock") += 1;
        Ok(())
    }
}

struct Fixture {
    runner: BatchRunner,
    devices: HashMap<String, DeviceScript>,
    // Keeps the temp dir alive for the store and ledger underneath.
    _dir: tempfile::TempDir,
}

async fn fixture<S: Into<String>>(devices: Vec<(S, DeviceScript)>) -> Fixture {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = RollbackStore::open(dir.path().join("rollback"))
        .await
        .expect("open store");
    let ledger = JobLedger::open(dir.path().join("jobs.json"))
        .await
        .expect("open ledger");

    let devices: HashMap<String, DeviceScript> = devices
        .into_iter()
        .map(|(addr, script)| (addr.into(), script))
        .collect();
    let connector = Arc::new(MockConnector {
        devices: devices.clone(),
    });

    Fixture {
        runner: BatchRunner::new(connector, store, ledger),
        devices,
        _dir: dir,
    }
}

fn credentials() -> Credentials {
    Credentials {
        username: "admin".to_string(),
        password: "secret".to_string(),
        enable_secret: "enable".to_string(),
    }
}

fn addresses(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn outcome_keys_equal_input_address_set() {
    let fx = fixture(vec![
        ("10.0.0.1", DeviceScript::new(Dialect::CiscoIos, "hostname R1\n")),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoNxos, "hostname N2\n")),
        ("10.0.0.3", DeviceScript::new(Dialect::CiscoAsa, "hostname FW\n").rejecting_auth()),
    ])
    .await;

    let addrs = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    let result = fx
        .runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;

    let keys: BTreeSet<&String> = result.outcomes.keys().collect();
    let wanted: BTreeSet<&String> = addrs.iter().collect();
    assert_eq!(keys, wanted);
}

#[tokio::test]
async fn failing_credentials_do_not_fail_sibling_devices() {
    let fx = fixture(vec![
        ("10.0.0.1", DeviceScript::new(Dialect::CiscoIos, "hostname R1\n")),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoIos, "hostname R2\n").rejecting_auth()),
        ("10.0.0.3", DeviceScript::new(Dialect::CiscoIos, "hostname R3\n")),
    ])
    .await;

    let addrs = addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    let result = fx
        .runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;

    assert!(result.outcomes["10.0.0.1"].success);
    assert!(!result.outcomes["10.0.0.2"].success);
    assert!(result.outcomes["10.0.0.3"].success);
    assert!(
        result.outcomes["10.0.0.2"]
            .message
            .contains("dialect detection failed")
    );
}

#[tokio::test]
async fn detection_reports_the_matching_dialect() {
    let fx = fixture(vec![(
        "10.0.0.9",
        DeviceScript::new(Dialect::CiscoAsa, "hostname FW\n"),
    )])
    .await;

    let result = fx
        .runner
        .run_batch(
            &addresses(&["10.0.0.9"]),
            &credentials(),
            &[],
            RunOptions::default(),
        )
        .await;

    assert!(result.outcomes["10.0.0.9"].success);
    assert!(
        result
            .output
            .iter()
            .any(|line| line.contains("dialect: cisco_asa"))
    );
}

#[tokio::test]
async fn dry_run_never_touches_the_config_path() {
    let script = DeviceScript::new(Dialect::CiscoIos, "hostname R1\n");
    let fx = fixture(vec![("10.0.0.1", script)]).await;

    let result = fx
        .runner
        .run_batch(
            &addresses(&["10.0.0.1"]),
            &credentials(),
            &["hostname R2".to_string()],
            RunOptions {
                configure: true,
                dry_run: true,
                ..Default::default()
            },
        )
        .await;

    assert!(result.outcomes["10.0.0.1"].success);
    // No config-set reached the device, so before == after and the diff is empty.
    let script = &fx.devices["10.0.0.1"];
    assert!(script.config_sets.lock().expect("lock").is_empty());
    assert_eq!(script.config(), "hostname R1\n");
    assert!(result.diff.is_empty());
}

#[tokio::test]
async fn configure_mode_produces_hostname_diff() {
    let fx = fixture(vec![(
        "10.0.0.1",
        DeviceScript::new(Dialect::CiscoIos, "hostname R1\n"),
    )])
    .await;

    let result = fx
        .runner
        .run_batch(
            &addresses(&["10.0.0.1"]),
            &credentials(),
            &["hostname R2".to_string()],
            RunOptions {
                configure: true,
                ..Default::default()
            },
        )
        .await;

    assert!(result.outcomes["10.0.0.1"].success);
    assert!(result.diff.iter().any(|l| l.starts_with("-hostname R1")));
    assert!(result.diff.iter().any(|l| l.starts_with("+hostname R2")));
}

#[tokio::test]
async fn execute_mode_captures_per_command_output() {
    let fx = fixture(vec![(
        "10.0.0.1",
        DeviceScript::new(Dialect::CiscoIos, "hostname R1\n"),
    )])
    .await;

    let result = fx
        .runner
        .run_batch(
            &addresses(&["10.0.0.1"]),
            &credentials(),
            &["show version".to_string()],
            RunOptions {
                execute: true,
                ..Default::default()
            },
        )
        .await;

    assert!(result.outcomes["10.0.0.1"].success);
    assert!(
        result
            .output
            .iter()
            .any(|line| line.contains("$ show version") && line.contains("show version: ok"))
    );
}

#[tokio::test]
async fn sessions_are_released_even_when_a_command_fails() {
    let fx = fixture(vec![
        (
            "10.0.0.1",
            DeviceScript::new(Dialect::CiscoIos, "hostname R1\n").rejecting_command("show broken"),
        ),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoIos, "hostname R2\n")),
    ])
    .await;

    let result = fx
        .runner
        .run_batch(
            &addresses(&["10.0.0.1", "10.0.0.2"]),
            &credentials(),
            &["show broken".to_string()],
            RunOptions {
                execute: true,
                ..Default::default()
            },
        )
        .await;

    assert!(!result.outcomes["10.0.0.1"].success);
    assert!(result.outcomes["10.0.0.2"].success);

    for script in fx.devices.values() {
        assert_eq!(script.open_count(), script.disconnect_count());
    }
}

#[tokio::test]
async fn before_snapshot_survives_a_failed_config_set() {
    let fx = fixture(vec![(
        "10.0.0.1",
        DeviceScript::new(Dialect::CiscoIos, "hostname R1\n").rejecting_config(),
    )])
    .await;

    let addrs = addresses(&["10.0.0.1"]);
    let result = fx
        .runner
        .run_batch(
            &addrs,
            &credentials(),
            &["hostname R2".to_string()],
            RunOptions {
                configure: true,
                ..Default::default()
            },
        )
        .await;
    assert!(!result.outcomes["10.0.0.1"].success);
    assert!(result.outcomes["10.0.0.1"].message.contains("rejected"));

    // The pre-change snapshot was persisted before the config-set ran:
    // rollback finds it and gets past the snapshot load (the device still
    // rejects config pushes, so the push itself fails).
    let rollback = fx.runner.rollback_batch(&addrs, &credentials()).await;
    assert!(!rollback.outcomes["10.0.0.1"].success);
    assert!(rollback.outcomes["10.0.0.1"].message.contains("rejected"));
    assert!(
        !rollback.outcomes["10.0.0.1"]
            .message
            .contains("no rollback snapshot")
    );
}

#[tokio::test]
async fn rollback_restores_the_pre_change_configuration() {
    let fx = fixture(vec![(
        "10.0.0.1",
        DeviceScript::new(Dialect::CiscoIos, "hostname R1\n"),
    )])
    .await;

    let addrs = addresses(&["10.0.0.1"]);
    fx.runner
        .run_batch(
            &addrs,
            &credentials(),
            &["hostname R2".to_string()],
            RunOptions {
                configure: true,
                ..Default::default()
            },
        )
        .await;
    assert_eq!(fx.devices["10.0.0.1"].config(), "hostname R2\n");

    let result = fx.runner.rollback_batch(&addrs, &credentials()).await;
    assert!(result.outcomes["10.0.0.1"].success);
    assert_eq!(fx.devices["10.0.0.1"].config(), "hostname R1\n");
    assert!(result.output.iter().any(|l| l.contains("ROLLED BACK")));
}

#[tokio::test]
async fn rollback_without_snapshot_fails_only_that_device() {
    let fx = fixture(vec![
        ("10.0.0.1", DeviceScript::new(Dialect::CiscoIos, "hostname R1\n")),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoIos, "hostname R2\n")),
    ])
    .await;

    // Only the first device has ever been snapshotted.
    fx.runner
        .run_batch(
            &addresses(&["10.0.0.1"]),
            &credentials(),
            &[],
            RunOptions::default(),
        )
        .await;

    let result = fx
        .runner
        .rollback_batch(&addresses(&["10.0.0.1", "10.0.0.2"]), &credentials())
        .await;

    assert!(result.outcomes["10.0.0.1"].success);
    assert!(!result.outcomes["10.0.0.2"].success);
    assert!(
        result.outcomes["10.0.0.2"]
            .message
            .contains("no rollback snapshot")
    );
}

#[tokio::test]
async fn ledger_grows_by_one_per_batch_regardless_of_failures() {
    let fx = fixture(vec![
        ("10.0.0.1", DeviceScript::new(Dialect::CiscoIos, "hostname R1\n")),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoIos, "hostname R2\n").rejecting_auth()),
    ])
    .await;

    let addrs = addresses(&["10.0.0.1", "10.0.0.2"]);
    fx.runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;
    fx.runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;

    let history = fx.runner.history().await;
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|record| record.devices == 2));
}

#[tokio::test]
async fn connectivity_check_maps_every_address() {
    let fx = fixture(vec![
        ("10.0.0.1", DeviceScript::new(Dialect::CiscoIos, "hostname R1\n")),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoIos, "hostname R2\n").rejecting_auth()),
    ])
    .await;

    let reachable = fx
        .runner
        .check_connectivity(&addresses(&["10.0.0.1", "10.0.0.2", "10.0.0.3"]), &credentials())
        .await;

    assert_eq!(reachable.len(), 3);
    assert!(reachable["10.0.0.1"]);
    assert!(!reachable["10.0.0.2"]);
    // Unknown address: unreachable, still present in the map.
    assert!(!reachable["10.0.0.3"]);

    // Connectivity probes release their sessions immediately.
    let script = &fx.devices["10.0.0.1"];
    assert_eq!(script.open_count(), script.disconnect_count());
}

#[tokio::test]
async fn cancelled_batch_skips_not_yet_started_devices() {
    let fx = fixture(vec![
        ("10.0.0.1", DeviceScript::new(Dialect::CiscoIos, "hostname R1\n")),
        ("10.0.0.2", DeviceScript::new(Dialect::CiscoIos, "hostname R2\n")),
    ])
    .await;

    fx.runner.cancel_handle().cancel();

    let addrs = addresses(&["10.0.0.1", "10.0.0.2"]);
    let result = fx
        .runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;

    // Every requested address still appears in the result.
    assert_eq!(result.outcomes.len(), 2);
    for outcome in result.outcomes.values() {
        assert!(!outcome.success);
        assert!(outcome.message.contains("cancelled"));
    }
    assert_eq!(fx.devices["10.0.0.1"].open_count(), 0);
    assert_eq!(fx.devices["10.0.0.2"].open_count(), 0);
}

#[tokio::test]
async fn cancellation_does_not_leak_into_the_next_batch() {
    let fx = fixture(vec![(
        "10.0.0.1",
        DeviceScript::new(Dialect::CiscoIos, "hostname R1\n"),
    )])
    .await;

    fx.runner.cancel_handle().cancel();

    let addrs = addresses(&["10.0.0.1"]);
    let cancelled = fx
        .runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;
    assert!(!cancelled.outcomes["10.0.0.1"].success);
    assert_eq!(fx.devices["10.0.0.1"].open_count(), 0);

    // The runner stays usable: a fresh batch on the same runner is not
    // affected by the earlier cancellation.
    let later = fx
        .runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;
    assert!(later.outcomes["10.0.0.1"].success);
    assert_eq!(fx.devices["10.0.0.1"].open_count(), 1);
}

#[tokio::test]
async fn ledger_failure_does_not_invalidate_the_batch_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = RollbackStore::open(dir.path().join("rollback"))
        .await
        .expect("open store");
    let ledger_dir = dir.path().join("jobs");
    let ledger = JobLedger::open(ledger_dir.join("jobs.json"))
        .await
        .expect("open ledger");

    // Turn the ledger's parent directory into a plain file so the append
    // after the batch cannot succeed.
    std::fs::remove_dir(&ledger_dir).expect("remove ledger dir");
    std::fs::write(&ledger_dir, b"in the way").expect("block ledger path");

    let devices: HashMap<String, DeviceScript> = [(
        "10.0.0.1".to_string(),
        DeviceScript::new(Dialect::CiscoIos, "hostname R1\n"),
    )]
    .into_iter()
    .collect();
    let connector = Arc::new(MockConnector {
        devices: devices.clone(),
    });
    let runner = BatchRunner::new(connector, store, ledger);

    let result = runner
        .run_batch(
            &addresses(&["10.0.0.1"]),
            &credentials(),
            &[],
            RunOptions::default(),
        )
        .await;

    // The write failure is reported, the device results stand.
    assert!(result.ledger_error.is_some());
    assert!(result.outcomes["10.0.0.1"].success);
    assert!(result.output.iter().any(|l| l.contains("SUCCESS")));
    let script = &devices["10.0.0.1"];
    assert_eq!(script.open_count(), script.disconnect_count());
}

#[tokio::test]
async fn large_batch_respects_input_order_in_output_lines() {
    let mut devices = Vec::new();
    let mut addrs = Vec::new();
    for i in 1..=12 {
        let addr = format!("10.1.0.{i}");
        devices.push((
            addr.clone(),
            DeviceScript::new(Dialect::CiscoIos, &format!("hostname R{i}\n")),
        ));
        addrs.push(addr);
    }
    let fx = fixture(devices).await;

    let result = fx
        .runner
        .run_batch(&addrs, &credentials(), &[], RunOptions::default())
        .await;

    // Workers run concurrently, but the report lines come back in input
    // order: the first line for device N precedes the first line for N+1.
    let first_positions: Vec<usize> = addrs
        .iter()
        .map(|addr| {
            result
                .output
                .iter()
                .position(|line| line.contains(&format!("[{addr}]")))
                .expect("device has output lines")
        })
        .collect();
    let mut sorted = first_positions.clone();
    sorted.sort_unstable();
    assert_eq!(first_positions, sorted);
}
