//! Common error types for event-marker.
//!
//! This module provides a centralized Error enum using thiserror. Discovery
//! and configuration failures are fatal and surface to the process boundary;
//! connect and send failures are transient and absorbed by the streamer's
//! reconnect loop.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Main error type for event-marker operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No attached serial device reported the wanted product identifier.
    #[error("no serial device with product identifier '{product}' found")]
    DeviceNotFound { product: String },

    /// A fixed device path did not appear among the enumerated devices.
    #[error("serial device {} not present", .path.display())]
    PathNotFound { path: PathBuf },

    /// The line-configuration facility failed or could not be started.
    #[error(
        "{tool} failed to configure the serial line{}{}",
        fmt_status(.status),
        fmt_diagnostic(.diagnostic)
    )]
    Configuration {
        tool: String,
        status: Option<ExitStatus>,
        diagnostic: String,
    },

    /// Opening the channel failed. Retried by the streamer.
    #[error("failed to open {}: {source}", .path.display())]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing or flushing an event code failed. The code is lost.
    #[error("failed to send event code {code}: {source}")]
    Send {
        code: u8,
        #[source]
        source: io::Error,
    },

    /// Event codes are single bytes in 1..=255.
    #[error("invalid event code {0}: must be in 1..=255")]
    InvalidCode(i64),

    /// The streamer was shut down.
    #[error("event streamer is closed")]
    Closed,

    /// I/O errors from tokio or std
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port enumeration errors
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

fn fmt_status(status: &Option<ExitStatus>) -> String {
    match status {
        Some(status) => format!(" ({status})"),
        None => String::new(),
    }
}

fn fmt_diagnostic(diagnostic: &str) -> String {
    if diagnostic.is_empty() {
        String::new()
    } else {
        format!(": {diagnostic}")
    }
}

impl Error {
    /// Whether the streamer should treat this error as recoverable by
    /// reconnecting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Connect { .. } | Error::Send { .. })
    }

    /// Process exit status for a binary that stops because of this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InvalidCode(_) | Error::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let connect = Error::Connect {
            path: PathBuf::from("/dev/ttyACM0"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        let send = Error::Send {
            code: 4,
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert!(connect.is_transient());
        assert!(send.is_transient());
        assert!(!Error::Closed.is_transient());
        assert!(!Error::DeviceNotFound { product: "x".into() }.is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::DeviceNotFound { product: "x".into() }.exit_code(), 1);
        assert_eq!(Error::InvalidCode(256).exit_code(), 2);
        assert_eq!(Error::Config("bad baud".into()).exit_code(), 2);
    }

    #[test]
    fn test_configuration_message_carries_diagnostic() {
        let err = Error::Configuration {
            tool: "/usr/bin/stty".into(),
            status: None,
            diagnostic: "No such file or directory".into(),
        };
        assert_eq!(
            err.to_string(),
            "/usr/bin/stty failed to configure the serial line: No such file or directory"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_configuration_message_without_diagnostic() {
        use std::os::unix::process::ExitStatusExt;

        let err = Error::Configuration {
            tool: "/bin/false".into(),
            status: Some(ExitStatus::from_raw(1 << 8)),
            diagnostic: String::new(),
        };
        let message = err.to_string();
        assert!(message.starts_with("/bin/false failed to configure the serial line ("));
        assert!(message.ends_with(')'), "message: {message}");
    }

    #[test]
    fn test_path_not_found_names_the_path() {
        let err = Error::PathNotFound {
            path: PathBuf::from("/dev/ttyACM0"),
        };
        assert_eq!(err.to_string(), "serial device /dev/ttyACM0 not present");
        assert_eq!(err.exit_code(), 1);
    }
}
