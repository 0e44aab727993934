//! VPN server endpoints parsed from OpenVPN configuration files

use std::fmt;
use std::path::{Path, PathBuf};

/// A single `remote` entry together with the config file it came from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub config_path: PathBuf,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(config_path: impl Into<PathBuf>, host: impl Into<String>, port: u16) -> Self {
        Self {
            config_path: config_path.into(),
            host: host.into(),
            port,
        }
    }

    /// Config file this endpoint was read from
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a `remote <host> <port> [...]` directive
///
/// Leading whitespace is allowed; anything after the port is ignored.
pub fn parse_remote_line(line: &str) -> Option<(String, u16)> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "remote" {
        return None;
    }

    let host = parts.next()?;
    let port = parts.next()?;
    if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    Some((host.to_string(), port.parse().ok()?))
}

/// True for any line carrying a `remote` directive, valid or not
pub fn is_remote_directive(line: &str) -> bool {
    line.split_whitespace().next() == Some("remote")
}
