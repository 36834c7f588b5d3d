//! Error types for Isobox.

use thiserror::Error;

/// Result type alias using Isobox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Isobox.
///
/// One variant per failure class the sandbox can surface. Creation
/// failures are fatal to the sandbox instance; timeouts poison the
/// session until it is restarted; everything else is per-call.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Sandbox creation failed: {0}")]
    Creation(String),

    #[error("Sandbox not initialized")]
    NotInitialized,

    #[error("Command execution timed out: {0}")]
    Timeout(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Unsafe path: {0}")]
    PathSafety(String),

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a sandbox creation error.
    pub fn creation(msg: impl Into<String>) -> Self {
        Self::Creation(msg.into())
    }

    /// Create a timeout error.
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a path safety violation error.
    pub fn path_safety(msg: impl Into<String>) -> Self {
        Self::PathSafety(msg.into())
    }

    /// Create a rejected command error.
    pub fn command_rejected(msg: impl Into<String>) -> Self {
        Self::CommandRejected(msg.into())
    }

    /// Create an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Whether this error means the session must be restarted before reuse.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether this error indicates a missing file or directory.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(Error::NotInitialized.to_string(), "Sandbox not initialized");
        assert_eq!(
            Error::creation("engine unreachable").to_string(),
            "Sandbox creation failed: engine unreachable"
        );
        assert_eq!(
            Error::not_found("/workspace/missing.txt").to_string(),
            "File not found: /workspace/missing.txt"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::timeout("after 1 seconds").is_timeout());
        assert!(!Error::io("broken pipe").is_timeout());
        assert!(Error::not_found("x").is_not_found());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
