use std::borrow::Cow;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client};
use async_ssh2_tokio::{Config, ServerCheckMethod};
use async_trait::async_trait;
use log::{debug, trace};
use regex::Regex;
use russh::{ChannelMsg, Preferred};
use tokio::sync::mpsc::{self, Receiver, Sender};

use super::{Connector, DeviceSession, DeviceTarget};
use crate::config;
use crate::dialect::{Dialect, DialectProfile};
use crate::error::SweepError;

/// Timeouts applied by [`SshConnector`] to every session it opens.
#[derive(Debug, Clone, Copy)]
pub struct SshTimeouts {
    /// Full connect + authenticate + elevate attempt for one dialect.
    pub connect: Duration,
    /// Single command exchange.
    pub command: Duration,
    /// One configuration-set transaction line.
    pub config_set: Duration,
}

impl Default for SshTimeouts {
    fn default() -> Self {
        Self {
            connect: config::CONNECT_TIMEOUT,
            command: config::COMMAND_TIMEOUT,
            config_set: config::CONFIG_SET_TIMEOUT,
        }
    }
}

/// Production [`Connector`] backed by async-ssh2-tokio.
///
/// Each `open` call builds a fresh session; nothing is cached between
/// batches, so a device's dialect is rediscovered on every connection.
pub struct SshConnector {
    timeouts: SshTimeouts,
    server_check: ServerCheckMethod,
}

impl SshConnector {
    pub fn new() -> Self {
        Self::with_timeouts(SshTimeouts::default())
    }

    /// Managed device fleets rarely ship curated known-hosts files, so host
    /// key checking is off by default. Use [`SshConnector::with_server_check`]
    /// to tighten this.
    pub fn with_timeouts(timeouts: SshTimeouts) -> Self {
        Self {
            timeouts,
            server_check: ServerCheckMethod::NoCheck,
        }
    }

    pub fn with_server_check(mut self, server_check: ServerCheckMethod) -> Self {
        self.server_check = server_check;
        self
    }

    fn preferred() -> Preferred {
        Preferred {
            kex: Cow::Borrowed(config::COMPAT_KEX_ORDER),
            key: Cow::Borrowed(config::COMPAT_KEY_TYPES),
            cipher: Cow::Borrowed(config::COMPAT_CIPHERS),
            mac: Cow::Borrowed(config::COMPAT_MAC_ALGORITHMS),
            compression: Cow::Borrowed(config::COMPAT_COMPRESSION_ALGORITHMS),
        }
    }
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn open(
        &self,
        dialect: Dialect,
        target: &DeviceTarget,
    ) -> Result<Box<dyn DeviceSession>, SweepError> {
        let attempt = SshSession::establish(dialect, target, self.server_check.clone(), self.timeouts);
        let session = tokio::time::timeout(self.timeouts.connect, attempt)
            .await
            .map_err(|_| {
                SweepError::Timeout(format!(
                    "connect to {} as {} did not finish",
                    target.address, dialect
                ))
            })??;
        Ok(Box::new(session))
    }
}

/// One live SSH shell to a device, driven by its dialect profile.
pub struct SshSession {
    client: Client,
    sender: Sender<String>,
    recv: Receiver<String>,
    profile: &'static DialectProfile,
    timeouts: SshTimeouts,
    address: String,
}

impl SshSession {
    async fn establish(
        dialect: Dialect,
        target: &DeviceTarget,
        server_check: ServerCheckMethod,
        timeouts: SshTimeouts,
    ) -> Result<SshSession, SweepError> {
        let device_addr = format!(
            "{}@{}:{}",
            target.credentials.username, target.address, target.port
        );

        let ssh_config = Config {
            preferred: SshConnector::preferred(),
            inactivity_timeout: Some(Duration::from_secs(60)),
            ..Default::default()
        };

        let client = Client::connect_with_config(
            (target.address.clone(), target.port),
            &target.credentials.username,
            AuthMethod::with_password(&target.credentials.password),
            server_check,
            ssh_config,
        )
        .await?;
        debug!("{} TCP connection successful", device_addr);

        let mut channel = client.get_channel().await?;
        channel
            .request_pty(false, "xterm", 800, 600, 0, 0, &[])
            .await?;
        channel.request_shell(false).await?;
        debug!("{} shell request successful", device_addr);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);

        let task_addr = device_addr.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_user.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{} failed to send data to shell: {:?}", task_addr, e);
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                if let Ok(s) = std::str::from_utf8(data)
                                    && sender_to_user.send(s.to_string()).await.is_err() {
                                        debug!("{} shell output receiver dropped, closing task", task_addr);
                                        break;
                                    }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{} shell exited with status code {}", task_addr, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{} shell sent EOF", task_addr);
                                break;
                            }
                            _ => {}
                        }
                    }
                }
            }
            debug!("{} SSH I/O task ended", task_addr);
        });

        let profile = dialect.profile();
        let mut session = SshSession {
            client,
            sender: sender_to_shell,
            recv: receiver_from_shell,
            profile,
            timeouts,
            address: target.address.clone(),
        };

        session.elevate(dialect, &target.credentials.enable_secret).await?;

        if let Some(paging) = profile.disable_paging {
            session
                .exchange(Some(paging), &[&profile.privileged_prompt], timeouts.command)
                .await?;
        }

        debug!("{} session ready as {}", device_addr, dialect);
        Ok(session)
    }

    /// Waits out the login banner and brings the shell to privileged mode.
    async fn elevate(&mut self, dialect: Dialect, enable_secret: &str) -> Result<(), SweepError> {
        let profile = self.profile;

        // Privileged prompt is checked first: on dialects where both shapes
        // overlap the session is already elevated.
        let (_, matched) = self
            .exchange(
                None,
                &[&profile.privileged_prompt, &profile.user_prompt],
                self.timeouts.command,
            )
            .await?;
        if matched == 0 {
            return Ok(());
        }

        let Some(elevate) = profile.elevate else {
            return Err(SweepError::Transport(format!(
                "{}: {} login did not reach privileged mode",
                self.address, dialect
            )));
        };

        let (_, matched) = self
            .exchange(
                Some(elevate),
                &[&profile.privileged_prompt, &profile.password_prompt],
                self.timeouts.command,
            )
            .await?;
        if matched == 1 {
            self.exchange(
                Some(enable_secret),
                &[&profile.privileged_prompt],
                self.timeouts.command,
            )
            .await?;
        }

        Ok(())
    }

    /// Checks if the underlying SSH connection is still active.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }

    /// Sends `command` (when present) and reads output until one of the
    /// `expect` patterns matches the trailing partial line.
    ///
    /// Returns the raw accumulated output and the index of the pattern that
    /// matched. Pagination stops are answered with a space; a line matching
    /// the dialect's error patterns fails the exchange once the prompt
    /// returns, so the shell is left in a consistent state.
    async fn exchange(
        &mut self,
        send: Option<&str>,
        expect: &[&Regex],
        timeout: Duration,
    ) -> Result<(String, usize), SweepError> {
        if let Some(command) = send {
            // Drop residual output from earlier exchanges before sending.
            while self.recv.try_recv().is_ok() {}
            self.sender.send(format!("{command}\n")).await?;
        }

        let profile = self.profile;
        let mut output = String::new();
        let mut line_buffer = String::new();
        let mut device_error: Option<String> = None;

        let result = tokio::time::timeout(timeout, async {
            loop {
                match self.recv.recv().await {
                    Some(data) => {
                        trace!("{}: chunk {:?}", self.address, data);
                        line_buffer.push_str(&data);

                        while let Some(newline_pos) = line_buffer.find('\n') {
                            let line: String = line_buffer.drain(..=newline_pos).collect();
                            let trimmed = line.trim_end();
                            if device_error.is_none() && profile.errors.is_match(trimmed) {
                                device_error = Some(trimmed.to_string());
                            }
                            output.push_str(&line);
                        }

                        // The remaining partial line is where prompts and
                        // pagination stops show up, neither ends with a newline.
                        if !line_buffer.is_empty() {
                            if let Some(idx) =
                                expect.iter().position(|re| re.is_match(&line_buffer))
                            {
                                output.push_str(&line_buffer);
                                line_buffer.clear();
                                return Ok(idx);
                            }
                            if profile.more_prompt.is_match(&line_buffer) {
                                line_buffer.clear();
                                self.sender.send(" ".to_string()).await?;
                            }
                        }
                    }
                    None => {
                        return Err(SweepError::Transport(format!(
                            "{}: channel closed while waiting for prompt",
                            self.address
                        )));
                    }
                }
            }
        })
        .await;

        let matched = match result {
            Ok(Ok(idx)) => idx,
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(SweepError::Timeout(Self::timeout_payload(&self.address, output))),
        };

        if let Some(line) = device_error {
            return Err(SweepError::Execution(line));
        }

        Ok((output, matched))
    }

    // A timed-out exchange reports whatever the device sent so far; with
    // nothing captured, fall back to a descriptive message.
    fn timeout_payload(address: &str, output: String) -> String {
        if output.is_empty() {
            format!("{address}: no output before the deadline")
        } else {
            output
        }
    }

    /// Strips the echoed command from the front and the prompt line from the
    /// back of a raw exchange capture.
    fn strip_frame(command: &str, raw: &str) -> String {
        let mut content = raw;
        if !command.is_empty() && content.starts_with(command) {
            content = content
                .strip_prefix(command)
                .unwrap_or(content)
                .trim_start_matches(['\n', '\r']);
        }
        match content.rfind('\n') {
            Some(pos) => content[..pos].to_string(),
            None => String::new(),
        }
    }
}

#[async_trait]
impl DeviceSession for SshSession {
    async fn run_command(&mut self, command: &str) -> Result<String, SweepError> {
        let profile = self.profile;
        let (raw, _) = self
            .exchange(
                Some(command),
                &[&profile.privileged_prompt],
                self.timeouts.command,
            )
            .await?;
        Ok(Self::strip_frame(command, &raw))
    }

    async fn run_config_set(&mut self, lines: &[String]) -> Result<String, SweepError> {
        let profile = self.profile;
        let mut all = String::new();

        let (raw, _) = self
            .exchange(
                Some(profile.config_enter),
                &[&profile.config_prompt],
                self.timeouts.command,
            )
            .await?;
        all.push_str(&raw);

        for line in lines {
            let result = self
                .exchange(
                    Some(line),
                    &[&profile.config_prompt, &profile.privileged_prompt],
                    self.timeouts.config_set,
                )
                .await;
            match result {
                Ok((raw, _)) => all.push_str(&raw),
                Err(err) => {
                    // Best-effort return to privileged mode so disconnect
                    // does not leave the device parked in config mode.
                    let _ = self.sender.send(format!("{}\n", profile.config_exit)).await;
                    return Err(err);
                }
            }
        }

        let (raw, _) = self
            .exchange(
                Some(profile.config_exit),
                &[&profile.privileged_prompt],
                self.timeouts.command,
            )
            .await?;
        all.push_str(&raw);

        Ok(all)
    }

    async fn disconnect(&mut self) -> Result<(), SweepError> {
        debug!("{}: closing SSH session", self.address);

        self.recv.close();

        if self.is_connected() {
            if let Err(e) = self.sender.send("exit\n".to_string()).await {
                debug!("{}: failed to send exit command: {:?}", self.address, e);
            }
            // Give the device a moment to process the exit.
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        // The underlying client closes on drop; nothing further to release.
        Ok(())
    }
}
