//! Error types for the fleetwatch crate.
//!
//! Every failure that can reach a caller is represented here, together with
//! the stable `error_code` string surfaced in collection results.

use thiserror::Error;

/// Result type for fleetwatch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for all fleetwatch operations
#[derive(Error, Debug)]
pub enum Error {
    /// The system `ssh` binary could not be found in PATH
    #[error("ssh binary not found in PATH")]
    SshNotFound,

    /// The requested operation is not registered
    #[error("unknown operation: {operation}")]
    UnknownOperation {
        /// Operation name that missed the registry
        operation: String,
    },

    /// Command template substitution failed
    #[error("invalid parameters for {operation}: missing {missing}")]
    InvalidParameters {
        /// Operation whose template could not be formatted
        operation: String,
        /// The placeholder that had no matching parameter
        missing: String,
    },

    /// The device reference did not resolve to a registered device
    #[error("device not found: {device}")]
    DeviceNotFound {
        /// Hostname or id that failed to resolve
        device: String,
    },

    /// SSH handshake or session establishment failed
    #[error("SSH connection to {host} failed: {message}")]
    Connection {
        /// Target host
        host: String,
        /// Failure detail
        message: String,
    },

    /// A command attempt exceeded its timeout
    #[error("command timed out after {timeout_seconds}s")]
    Timeout {
        /// Per-attempt timeout that fired
        timeout_seconds: u64,
    },

    /// The remote process launched but execution failed non-transiently
    #[error("SSH command failed on {host}: {message}")]
    Command {
        /// Target host
        host: String,
        /// Failure detail
        message: String,
    },

    /// Exit code or output validation failure
    #[error("command execution failed: {command}")]
    ExecutionFailed {
        /// The command that failed (post-substitution)
        command: String,
        /// Exit code returned by the command
        exit_code: i32,
        /// Captured standard error
        stderr: String,
    },

    /// Cache read or write failed; never surfaced to collect callers
    #[error("cache operation failed: {message}")]
    Cache {
        /// Failure detail
        message: String,
    },

    /// A service was used before start or after shutdown
    #[error("service unavailable: {service}")]
    Unavailable {
        /// Name of the stopped service
        service: String,
    },

    /// Failed to parse remote command output
    #[error("failed to parse output: {message}")]
    Parse {
        /// Error message describing the parse failure
        message: String,
    },

    /// IO error occurred during operation
    #[error("IO error: {message}")]
    Io {
        /// Error message describing the IO failure
        message: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {message}")]
    Json {
        /// Error message describing the JSON failure
        message: String,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a new connection error
    pub fn connection(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a new execution-failed error
    pub fn execution_failed(
        command: impl Into<String>,
        exit_code: i32,
        stderr: impl Into<String>,
    ) -> Self {
        Self::ExecutionFailed {
            command: command.into(),
            exit_code,
            stderr: stderr.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Create a new cache error
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a new parse error
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a new service-unavailable error
    pub fn unavailable(service: impl Into<String>) -> Self {
        Self::Unavailable {
            service: service.into(),
        }
    }

    /// Stable error code surfaced in `CollectionResult.error_code`
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            Self::InvalidParameters { .. } => "INVALID_PARAMETERS",
            Self::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Self::SshNotFound | Self::Connection { .. } => "SSH_CONNECTION_ERROR",
            Self::Timeout { .. } => "SSH_TIMEOUT_ERROR",
            Self::Command { .. } | Self::Io { .. } => "SSH_COMMAND_ERROR",
            Self::ExecutionFailed { .. } => "COMMAND_EXECUTION_FAILED",
            Self::Cache { .. } => "CACHE_OPERATION_ERROR",
            Self::Unavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Parse { .. } | Self::Json { .. } => "COMMAND_EXECUTION_FAILED",
        }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::SshNotFound => "prerequisites",
            Self::UnknownOperation { .. } | Self::InvalidParameters { .. } => "validation",
            Self::DeviceNotFound { .. } => "device",
            Self::Connection { .. } | Self::Timeout { .. } | Self::Command { .. } => "ssh",
            Self::ExecutionFailed { .. } => "command",
            Self::Cache { .. } => "cache",
            Self::Unavailable { .. } => "lifecycle",
            Self::Parse { .. } | Self::Json { .. } => "parsing",
            Self::Io { .. } => "io",
        }
    }

    /// Check if this error is retryable at the transport layer
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Timeout { .. } | Self::Io { .. }
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
            source: err,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            Error::UnknownOperation {
                operation: "x".into()
            }
            .error_code(),
            "UNKNOWN_OPERATION"
        );
        assert_eq!(
            Error::InvalidParameters {
                operation: "x".into(),
                missing: "p".into()
            }
            .error_code(),
            "INVALID_PARAMETERS"
        );
        assert_eq!(
            Error::DeviceNotFound { device: "h".into() }.error_code(),
            "DEVICE_NOT_FOUND"
        );
        assert_eq!(
            Error::connection("h", "refused").error_code(),
            "SSH_CONNECTION_ERROR"
        );
        assert_eq!(Error::timeout(30).error_code(), "SSH_TIMEOUT_ERROR");
        assert_eq!(
            Error::command("h", "spawn failed").error_code(),
            "SSH_COMMAND_ERROR"
        );
        assert_eq!(
            Error::execution_failed("uname -a", 1, "").error_code(),
            "COMMAND_EXECUTION_FAILED"
        );
        assert_eq!(
            Error::cache("poisoned").error_code(),
            "CACHE_OPERATION_ERROR"
        );
        assert_eq!(
            Error::unavailable("pool").error_code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(Error::connection("h", "reset").is_retryable());
        assert!(Error::timeout(30).is_retryable());
        assert!(!Error::execution_failed("ls", 2, "").is_retryable());
        assert!(!Error::DeviceNotFound { device: "h".into() }.is_retryable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(Error::SshNotFound.category(), "prerequisites");
        assert_eq!(Error::connection("h", "x").category(), "ssh");
        assert_eq!(Error::execution_failed("ls", 1, "").category(), "command");
        assert_eq!(Error::cache("x").category(), "cache");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no ssh");
        let err: Error = io_err.into();
        match err {
            Error::Io { message, .. } => assert!(message.contains("no ssh")),
            _ => panic!("wrong error type"),
        }
    }
}
