//! Classification of VPN client output during startup

use std::io;
use std::pin::Pin;

use tokio::time::{timeout_at, Instant};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

/// Merged stdout/stderr lines of the client process
pub type OutputLines = Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>;

const READY_MARKER: &str = "Initialization Sequence Completed";
const AUTH_FAILED_MARKER: &str = "AUTH_FAILED";
const FATAL_MARKER: &str = "Exiting due to fatal error";
const ERROR_MARKERS: &[&str] = &["ERROR", "FAILED"];

/// Terminal startup signal recognized in a single output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientSignal {
    Ready,
    Failed(ClientFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientFailure {
    AuthFailed,
    Fatal,
    Error,
}

impl ClientFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientFailure::AuthFailed => "auth_failed",
            ClientFailure::Fatal => "fatal",
            ClientFailure::Error => "error",
        }
    }
}

impl std::fmt::Display for ClientFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Map one line of client output to a startup signal, if it carries one
pub fn classify_line(line: &str) -> Option<ClientSignal> {
    if line.contains(READY_MARKER) {
        return Some(ClientSignal::Ready);
    }
    if line.contains(AUTH_FAILED_MARKER) {
        return Some(ClientSignal::Failed(ClientFailure::AuthFailed));
    }
    if line.contains(FATAL_MARKER) {
        return Some(ClientSignal::Failed(ClientFailure::Fatal));
    }
    if ERROR_MARKERS.iter().any(|m| line.contains(m)) {
        return Some(ClientSignal::Failed(ClientFailure::Error));
    }
    None
}

/// How the startup wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    Ready,
    Failed { kind: ClientFailure, line: String },
    /// Output ended (client exited) before any marker
    Closed,
    TimedOut,
}

/// Read lines until the first marker, end of output, or `deadline`
pub async fn await_startup<S>(lines: &mut S, deadline: Instant) -> StartupOutcome
where
    S: Stream<Item = io::Result<String>> + Unpin + ?Sized,
{
    loop {
        let line = match timeout_at(deadline, lines.next()).await {
            Err(_) => return StartupOutcome::TimedOut,
            Ok(None) => return StartupOutcome::Closed,
            Ok(Some(Err(e))) => {
                warn!("VPN client output unreadable: {}", e);
                return StartupOutcome::Closed;
            }
            Ok(Some(Ok(line))) => line,
        };

        debug!(target: "bio_collector::vpn::client", "{}", line.trim_end());

        match classify_line(&line) {
            Some(ClientSignal::Ready) => return StartupOutcome::Ready,
            Some(ClientSignal::Failed(kind)) => {
                return StartupOutcome::Failed {
                    kind,
                    line: line.trim().to_string(),
                }
            }
            None => continue,
        }
    }
}

/// Log whatever the client prints after startup until its output closes
pub async fn drain_output(mut lines: OutputLines, endpoint: String) {
    while let Some(item) = lines.next().await {
        match item {
            Ok(line) => debug!(target: "bio_collector::vpn::client", endpoint = %endpoint, "{}", line.trim_end()),
            Err(e) => {
                debug!(endpoint = %endpoint, "Stopped reading VPN client output: {}", e);
                break;
            }
        }
    }
    debug!(endpoint = %endpoint, "VPN client output closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio_stream::wrappers::LinesStream;

    fn lines(items: &[&str]) -> impl Stream<Item = io::Result<String>> + Unpin {
        let owned: Vec<io::Result<String>> = items.iter().map(|s| Ok(s.to_string())).collect();
        tokio_stream::iter(owned)
    }

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(
            classify_line("2024-05-01 12:00:00 Initialization Sequence Completed"),
            Some(ClientSignal::Ready)
        );
        assert_eq!(
            classify_line("AUTH: Received control message: AUTH_FAILED"),
            Some(ClientSignal::Failed(ClientFailure::AuthFailed))
        );
        assert_eq!(
            classify_line("Exiting due to fatal error"),
            Some(ClientSignal::Failed(ClientFailure::Fatal))
        );
        assert_eq!(
            classify_line("ERROR: Cannot open TUN/TAP dev /dev/net/tun"),
            Some(ClientSignal::Failed(ClientFailure::Error))
        );
        assert_eq!(
            classify_line("TLS handshake FAILED"),
            Some(ClientSignal::Failed(ClientFailure::Error))
        );
        assert_eq!(classify_line("TCP/UDP: Preserving recently used remote address"), None);
        assert_eq!(classify_line("an error occurred in lowercase"), None);
    }

    #[tokio::test]
    async fn test_await_startup_ready() {
        let mut stream = lines(&[
            "OpenVPN 2.6.8 x86_64-pc-linux-gnu",
            "TUN/TAP device tun0 opened",
            "Initialization Sequence Completed",
            "ERROR: after the fact",
        ]);
        assert_eq!(
            await_startup(&mut stream, deadline_in(1000)).await,
            StartupOutcome::Ready
        );
    }

    #[tokio::test]
    async fn test_await_startup_first_marker_wins() {
        let mut stream = lines(&[
            "OpenVPN 2.6.8 x86_64-pc-linux-gnu",
            "AUTH: Received control message: AUTH_FAILED",
            "Initialization Sequence Completed",
        ]);
        assert_eq!(
            await_startup(&mut stream, deadline_in(1000)).await,
            StartupOutcome::Failed {
                kind: ClientFailure::AuthFailed,
                line: "AUTH: Received control message: AUTH_FAILED".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_await_startup_closed() {
        let mut stream = lines(&["OpenVPN 2.6.8", "Options error: bad"]);
        assert_eq!(
            await_startup(&mut stream, deadline_in(1000)).await,
            StartupOutcome::Closed
        );
    }

    #[tokio::test]
    async fn test_await_startup_times_out_on_silence() {
        let mut stream = tokio_stream::pending::<io::Result<String>>();
        assert_eq!(
            await_startup(&mut stream, deadline_in(50)).await,
            StartupOutcome::TimedOut
        );
    }

    #[tokio::test]
    async fn test_await_startup_over_slow_reader() {
        let mock = tokio_test::io::Builder::new()
            .read(b"OpenVPN 2.6.8\nPeer Connection Initiated\n")
            .wait(Duration::from_millis(20))
            .read(b"Initialization Sequence Completed\n")
            .build();
        let mut stream = LinesStream::new(BufReader::new(mock).lines());

        assert_eq!(
            await_startup(&mut stream, deadline_in(2000)).await,
            StartupOutcome::Ready
        );
    }

    #[tokio::test]
    async fn test_await_startup_deadline_during_stall() {
        let mock = tokio_test::io::Builder::new()
            .read(b"OpenVPN 2.6.8\n")
            .wait(Duration::from_secs(30))
            .build();
        let mut stream = LinesStream::new(BufReader::new(mock).lines());

        assert_eq!(
            await_startup(&mut stream, deadline_in(50)).await,
            StartupOutcome::TimedOut
        );
    }
}
