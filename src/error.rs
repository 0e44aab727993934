use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for the collector
#[derive(Error, Debug)]
pub enum CollectorError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("VPN credentials file not found: {}", path.display())]
    CredentialsNotFound { path: PathBuf },

    // Server pool errors
    #[error("No VPN configuration files found in {}", dir.display())]
    NoConfigFiles { dir: PathBuf },

    #[error("No remote servers found in the VPN configuration files of {}", dir.display())]
    NoRemotesFound { dir: PathBuf },

    #[error("Server list not loaded")]
    PoolNotLoaded,

    // Tunnel errors
    #[error("No VPN tunnel could be established after {attempts} attempts")]
    TunnelUnavailable { attempts: u32 },

    #[error("Failed to signal VPN process group {pgid}: {source}")]
    ProcessSignal {
        pgid: i32,
        #[source]
        source: std::io::Error,
    },

    // Scrape errors
    #[error("Profile not found: {username}")]
    ProfileNotFound { username: String },

    #[error("Upstream refused profile request ({status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("Unexpected profile response: {0}")]
    InvalidProfile(String),

    // Delivery errors
    #[error("API rejected payload ({status}): {body}")]
    Delivery { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database connection failed: {0}")]
    DatabaseConnection(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, CollectorError>;

/// Coarse error classes that decide how the collection loop reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fatal at startup
    Configuration,
    /// Rotate to the next endpoint and retry
    Connection,
    /// Recorded as a per-profile status
    Scrape,
    /// API or database write failure, logged and recorded
    Delivery,
    /// Failure to signal or reap the VPN client
    ProcessSupervision,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Connection => "connection",
            ErrorCategory::Scrape => "scrape",
            ErrorCategory::Delivery => "delivery",
            ErrorCategory::ProcessSupervision => "process_supervision",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl CollectorError {
    /// Get the category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            CollectorError::InvalidConfig(_)
            | CollectorError::MissingEnvVar(_)
            | CollectorError::CredentialsNotFound { .. }
            | CollectorError::NoConfigFiles { .. }
            | CollectorError::NoRemotesFound { .. }
            | CollectorError::PoolNotLoaded => ErrorCategory::Configuration,

            CollectorError::TunnelUnavailable { .. } => ErrorCategory::Connection,

            CollectorError::ProcessSignal { .. } => ErrorCategory::ProcessSupervision,

            CollectorError::ProfileNotFound { .. }
            | CollectorError::Upstream { .. }
            | CollectorError::InvalidProfile(_) => ErrorCategory::Scrape,

            CollectorError::Delivery { .. }
            | CollectorError::Http(_)
            | CollectorError::Database(_)
            | CollectorError::DatabaseConnection(_) => ErrorCategory::Delivery,

            CollectorError::Io(_) | CollectorError::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Errors that abort the run instead of being recorded and skipped
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Configuration | ErrorCategory::Internal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_mapping() {
        assert_eq!(
            CollectorError::MissingEnvVar("API_ROUTE".to_string()).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            CollectorError::NoRemotesFound {
                dir: PathBuf::from("vpn_files/nordvpn")
            }
            .category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            CollectorError::TunnelUnavailable { attempts: 3 }.category(),
            ErrorCategory::Connection
        );
        assert_eq!(
            CollectorError::Upstream {
                status: 429,
                message: "Please wait a few minutes before you try again.".to_string()
            }
            .category(),
            ErrorCategory::Scrape
        );
        assert_eq!(
            CollectorError::Delivery {
                status: 500,
                body: "boom".to_string()
            }
            .category(),
            ErrorCategory::Delivery
        );
        assert_eq!(
            CollectorError::ProcessSignal {
                pgid: 42,
                source: std::io::Error::from_raw_os_error(libc::ESRCH),
            }
            .category(),
            ErrorCategory::ProcessSupervision
        );
    }

    #[test]
    fn test_error_fatality() {
        assert!(CollectorError::CredentialsNotFound {
            path: PathBuf::from("nordvpn_credentials.txt")
        }
        .is_fatal());

        assert!(!CollectorError::ProfileNotFound {
            username: "someone".to_string()
        }
        .is_fatal());
        assert!(!CollectorError::DatabaseConnection("refused".to_string()).is_fatal());
        assert!(!CollectorError::TunnelUnavailable { attempts: 10 }.is_fatal());
    }

    #[test]
    fn test_upstream_message_is_in_display() {
        let err = CollectorError::Upstream {
            status: 401,
            message: "Please wait a few minutes before you try again.".to_string(),
        };
        assert!(err
            .to_string()
            .contains("Please wait a few minutes before you try again."));
    }
}
