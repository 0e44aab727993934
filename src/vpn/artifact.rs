//! Per-connection OpenVPN config derived from an endpoint's base file

use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use super::endpoint::{is_remote_directive, Endpoint};
use crate::error::Result;

const AUTH_DIRECTIVE: &str = "auth-user-pass";
const ARTIFACT_PREFIX: &str = "bio-collector-";
const ARTIFACT_SUFFIX: &str = ".ovpn";

/// Rewrite a base config so that it targets exactly one endpoint
///
/// Every `remote` line is dropped, `auth-user-pass` is pointed at the managed
/// credentials file and the endpoint is appended as the only remote.
pub fn render_config(base: &str, endpoint: &Endpoint, credentials: &Path) -> String {
    let auth_line = format!("{} \"{}\"\n", AUTH_DIRECTIVE, credentials.display());
    let mut output = String::with_capacity(base.len() + 64);
    let mut has_auth = false;

    for line in base.lines() {
        if is_remote_directive(line) {
            continue;
        }
        if line.split_whitespace().next() == Some(AUTH_DIRECTIVE) {
            output.push_str(&auth_line);
            has_auth = true;
            continue;
        }
        output.push_str(line);
        output.push('\n');
    }

    if !has_auth {
        output.push_str(&auth_line);
    }
    output.push_str(&format!("remote {} {}\n", endpoint.host, endpoint.port));
    output
}

/// A rendered config written to the temp directory, removed on drop
#[derive(Debug)]
pub struct ConfigArtifact {
    file: NamedTempFile,
}

impl ConfigArtifact {
    /// Render the endpoint's config into a fresh file under the system temp dir
    pub fn create(endpoint: &Endpoint, credentials: &Path) -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), endpoint, credentials)
    }

    pub fn create_in(dir: &Path, endpoint: &Endpoint, credentials: &Path) -> Result<Self> {
        let base = fs::read_to_string(&endpoint.config_path)?;
        let rendered = render_config(&base, endpoint, credentials);

        // Created with owner-only permissions; the file names the credentials path.
        let mut file = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .suffix(ARTIFACT_SUFFIX)
            .tempfile_in(dir)?;
        file.write_all(rendered.as_bytes())?;
        file.flush()?;
        debug!(path = %file.path().display(), endpoint = %endpoint, "Wrote VPN config");

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
