//! Unified error types for the Bastion workspace.
//!
//! Timeouts are deliberately absent: an expired dispatch is reported as
//! [`DispatchOutcome::TimedOut`](crate::types::DispatchOutcome::TimedOut),
//! never as an error.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Platform;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BastionError {
    /// A dispatch request violated its contract (missing work, missing
    /// argument containers, or a result that cannot cross the process boundary).
    #[error("invalid dispatch: {reason}")]
    InvalidDispatch {
        /// Which part of the contract was violated.
        reason: String,
    },

    /// The working root was used before it was configured.
    #[error("working root is not configured")]
    NotConfigured,

    /// A directory was requested where a non-directory file already exists.
    #[error("not a directory: {path}")]
    NotADirectory {
        /// Path that exists but is not a directory.
        path: PathBuf,
    },

    /// The operating system refused to create a child process.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program that was being started.
        program: String,
        /// Underlying spawn error.
        source: std::io::Error,
    },

    /// A launch specification cannot be turned into a process.
    #[error("invalid launch specification: {reason}")]
    InvalidLaunch {
        /// Why the specification was rejected.
        reason: String,
    },

    /// A platform-dependent facility does not exist on the running platform.
    #[error("{facility} is not supported on {platform}")]
    UnsupportedPlatform {
        /// Name of the missing facility.
        facility: &'static str,
        /// Platform the lookup ran on.
        platform: Platform,
    },

    /// Dispatched work panicked instead of returning a value.
    #[error("dispatched work panicked: {message}")]
    WorkPanicked {
        /// Panic message, when one could be recovered.
        message: String,
    },

    /// An isolated worker process exited without relaying an outcome.
    #[error("isolated worker exited without a result ({status})")]
    WorkerLost {
        /// Description of how the worker terminated.
        status: String,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A system call or runtime facility failed outside any particular path.
    #[error("{operation} failed: {source}")]
    Os {
        /// What was being attempted (`fork`, `waitpid`, ...).
        operation: &'static str,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BastionError {
    /// Shorthand for an [`InvalidDispatch`](Self::InvalidDispatch) error.
    pub fn invalid_dispatch(reason: impl Into<String>) -> Self {
        Self::InvalidDispatch {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BastionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_directory_names_the_path() {
        let err = BastionError::NotADirectory {
            path: PathBuf::from("/tmp/file.txt"),
        };
        assert_eq!(err.to_string(), "not a directory: /tmp/file.txt");
    }

    #[test]
    fn os_error_names_the_operation() {
        let err = BastionError::Os {
            operation: "fork",
            source: std::io::Error::from_raw_os_error(11),
        };
        let rendered = err.to_string();
        assert!(rendered.starts_with("fork failed: "), "{rendered}");
        assert!(!rendered.contains("I/O error at"));
    }

    #[test]
    fn unsupported_platform_names_facility_and_platform() {
        let err = BastionError::UnsupportedPlatform {
            facility: "user lookup",
            platform: Platform::Windows,
        };
        assert_eq!(err.to_string(), "user lookup is not supported on windows");
    }
}
