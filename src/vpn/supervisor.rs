//! Lifecycle of the single VPN client process
//!
//! The supervisor spawns the client in its own process group, decides from its
//! output whether the tunnel came up, and tears the whole group down on
//! disconnect. The child process and its generated config are bundled in a
//! [`TunnelSession`] whose `Drop` kills the group and deletes the config, so
//! every exit path releases both.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, instrument, warn};

use super::artifact::ConfigArtifact;
use super::endpoint::Endpoint;
use super::output::{await_startup, drain_output, ClientFailure, OutputLines, StartupOutcome};
use crate::config::VpnConfig;
use crate::error::{CollectorError, Result};

/// Upper bound on reaping a child after SIGKILL
const REAP_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for spawning and stopping the client
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Program followed by leading arguments; `--config <file>` is appended
    pub client_command: Vec<String>,
    pub credentials_file: PathBuf,
    pub connect_timeout: Duration,
    pub disconnect_grace: Duration,
}

impl From<&VpnConfig> for SupervisorConfig {
    fn from(config: &VpnConfig) -> Self {
        Self {
            client_command: config.client_command.clone(),
            credentials_file: config.credentials_file.clone(),
            connect_timeout: config.connect_timeout,
            disconnect_grace: config.disconnect_grace,
        }
    }
}

/// Tunnel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why the last connection attempt did not produce a tunnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectFailure {
    MissingConfig(PathBuf),
    /// Writing the config or spawning the client failed
    Setup(String),
    ClientError { kind: ClientFailure, line: String },
    /// Client output ended before it reported success
    Exited,
    Timeout(Duration),
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectFailure::MissingConfig(path) => {
                write!(f, "config file not found: {}", path.display())
            }
            ConnectFailure::Setup(msg) => write!(f, "setup failed: {}", msg),
            ConnectFailure::ClientError { kind, line } => {
                write!(f, "client reported {}: {}", kind, line)
            }
            ConnectFailure::Exited => write!(f, "client exited before initialization completed"),
            ConnectFailure::Timeout(after) => {
                write!(f, "no initialization within {}s", after.as_secs())
            }
        }
    }
}

/// A running client, its process group and its generated config
struct TunnelSession {
    endpoint: Endpoint,
    child: Child,
    pgid: i32,
    started_at: DateTime<Utc>,
    drain: Option<JoinHandle<()>>,
    artifact: ConfigArtifact,
}

impl TunnelSession {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// SIGKILL the group and reap the child
    async fn kill(&mut self) {
        if let Err(e) = signal_group(self.pgid, libc::SIGKILL) {
            warn!("{}", e);
            let _ = self.child.start_kill();
        }
        match timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => debug!(%status, "VPN client killed"),
            Ok(Err(e)) => warn!("Failed to reap VPN client: {}", e),
            Err(_) => warn!(pgid = self.pgid, "VPN client still running after SIGKILL"),
        }
    }

    /// SIGTERM the group, escalating to SIGKILL after `grace`
    async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }

        signal_group(self.pgid, libc::SIGTERM)?;

        match timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(%status, "VPN terminated");
                Ok(())
            }
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs(),
                    "VPN did not exit gracefully, forcing termination"
                );
                signal_group(self.pgid, libc::SIGKILL)?;
                match timeout(REAP_TIMEOUT, self.child.wait()).await {
                    Ok(status) => {
                        let status = status?;
                        debug!(%status, "VPN killed");
                        Ok(())
                    }
                    Err(_) => Err(CollectorError::Internal(format!(
                        "VPN process group {} survived SIGKILL",
                        self.pgid
                    ))),
                }
            }
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
        if self.is_running() {
            if let Err(e) = signal_group(self.pgid, libc::SIGKILL) {
                warn!("{}", e);
            }
        }
    }
}

/// Owns at most one VPN client process
pub struct ConnectionSupervisor {
    config: SupervisorConfig,
    state: ConnectionState,
    session: Option<TunnelSession>,
    last_failure: Option<ConnectFailure>,
}

impl ConnectionSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            config,
            state: ConnectionState::Disconnected,
            session: None,
            last_failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn active_endpoint(&self) -> Option<&Endpoint> {
        self.session.as_ref().map(|s| &s.endpoint)
    }

    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        self.session.as_ref().map(|s| s.started_at)
    }

    pub fn last_failure(&self) -> Option<&ConnectFailure> {
        self.last_failure.as_ref()
    }

    /// Bring up a tunnel to `endpoint`
    ///
    /// Returns false without side effects when a tunnel is already held.
    /// Never returns an error; the reason for a failed attempt is kept in
    /// [`last_failure`](Self::last_failure).
    #[instrument(skip(self, endpoint), fields(endpoint = %endpoint))]
    pub async fn connect(&mut self, endpoint: &Endpoint) -> bool {
        if self.state != ConnectionState::Disconnected {
            warn!(state = %self.state, "A VPN connection is already active");
            return false;
        }

        if !endpoint.config_path.is_file() {
            let failure = ConnectFailure::MissingConfig(endpoint.config_path.clone());
            error!("Cannot connect: {}", failure);
            self.last_failure = Some(failure);
            return false;
        }

        let attempt = AttemptGuard::enter(&mut self.state);
        info!("Connecting to VPN server");

        match establish(&self.config, endpoint).await {
            Ok(session) => {
                attempt.resolve(ConnectionState::Connected);
                self.session = Some(session);
                self.last_failure = None;
                info!("VPN connection established");
                true
            }
            Err(failure) => {
                attempt.resolve(ConnectionState::Failed);
                error!("Failed to connect: {}", failure);
                self.last_failure = Some(failure);
                self.transition(ConnectionState::Disconnected);
                false
            }
        }
    }

    /// Liveness check; notices a client that exited on its own
    pub fn is_connected(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        match session.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                warn!(
                    endpoint = %session.endpoint,
                    %status,
                    "VPN process exited unexpectedly"
                );
                self.session = None;
                self.transition(ConnectionState::Disconnected);
                false
            }
            Err(e) => {
                warn!(endpoint = %session.endpoint, "Could not poll VPN process: {}", e);
                true
            }
        }
    }

    /// Tear down the tunnel; the state always ends `Disconnected`
    #[instrument(skip(self))]
    pub async fn disconnect(&mut self) {
        let Some(mut session) = self.session.take() else {
            if self.state != ConnectionState::Disconnected {
                warn!(state = %self.state, "Resetting VPN state without a running client");
                self.transition(ConnectionState::Disconnected);
            } else {
                warn!("No active VPN connection to disconnect");
            }
            return;
        };

        info!(endpoint = %session.endpoint, "Disconnecting from VPN server");
        if let Err(e) = session.terminate(self.config.disconnect_grace).await {
            error!(endpoint = %session.endpoint, "Error terminating VPN process: {}", e);
        }

        // Dropping the session removes the generated config.
        drop(session);
        self.transition(ConnectionState::Disconnected);
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "VPN state change");
        self.state = next;
    }
}

/// Holds the state at `Connecting` for one attempt
///
/// Dropping the guard without resolving it (the connect future was cancelled)
/// puts the state back to `Disconnected`.
struct AttemptGuard<'a> {
    state: &'a mut ConnectionState,
    resolved: bool,
}

impl<'a> AttemptGuard<'a> {
    fn enter(state: &'a mut ConnectionState) -> Self {
        debug!(from = %state, to = %ConnectionState::Connecting, "VPN state change");
        *state = ConnectionState::Connecting;
        Self {
            state,
            resolved: false,
        }
    }

    fn resolve(mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "VPN state change");
        *self.state = next;
        self.resolved = true;
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        if !self.resolved {
            warn!("VPN connection attempt cancelled");
            *self.state = ConnectionState::Disconnected;
        }
    }
}

/// Spawn the client for `endpoint` and wait for it to report startup
async fn establish(
    config: &SupervisorConfig,
    endpoint: &Endpoint,
) -> std::result::Result<TunnelSession, ConnectFailure> {
    let artifact = ConfigArtifact::create(endpoint, &config.credentials_file)
        .map_err(|e| ConnectFailure::Setup(e.to_string()))?;

    let mut child = spawn_client(&config.client_command, artifact.path())
        .map_err(|e| ConnectFailure::Setup(format!("spawn failed: {}", e)))?;

    let pgid = match child.id().and_then(|pid| i32::try_from(pid).ok()) {
        Some(pid) => pid,
        None => {
            let _ = child.start_kill();
            return Err(ConnectFailure::Setup(
                "client exited before it could be tracked".into(),
            ));
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let mut session = TunnelSession {
        endpoint: endpoint.clone(),
        child,
        pgid,
        started_at: Utc::now(),
        drain: None,
        artifact,
    };

    let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
        session.kill().await;
        return Err(ConnectFailure::Setup("client output not captured".into()));
    };
    let mut lines = merge_output(stdout, stderr);

    let deadline = Instant::now() + config.connect_timeout;
    let failure = match await_startup(&mut lines, deadline).await {
        StartupOutcome::Ready => {
            session.started_at = Utc::now();
            session.drain = Some(tokio::spawn(drain_output(lines, endpoint.to_string())));
            return Ok(session);
        }
        StartupOutcome::Failed { kind, line } => ConnectFailure::ClientError { kind, line },
        StartupOutcome::Closed => ConnectFailure::Exited,
        StartupOutcome::TimedOut => ConnectFailure::Timeout(config.connect_timeout),
    };

    session.kill().await;
    Err(failure)
}

fn spawn_client(command: &[String], config_path: &Path) -> std::io::Result<Child> {
    let (program, args) = command.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty VPN client command")
    })?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .arg("--config")
        .arg(config_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    cmd.spawn()
}

fn merge_output(stdout: ChildStdout, stderr: ChildStderr) -> OutputLines {
    let out = LinesStream::new(BufReader::new(stdout).lines());
    let err = LinesStream::new(BufReader::new(stderr).lines());
    Box::pin(out.merge(err))
}

fn signal_group(pgid: i32, signal: libc::c_int) -> Result<()> {
    // SAFETY: killpg only takes plain integers.
    let rc = unsafe { libc::killpg(pgid, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(CollectorError::ProcessSignal {
            pgid,
            source: std::io::Error::last_os_error(),
        })
    }
}
