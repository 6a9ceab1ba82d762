//! Error types for the HOLODECK session layer
//!
//! Every fallible operation returns [`HolodeckResult`]. Errors surface from the
//! call that triggered them and are never retried internally; retry or
//! session-recreation policy belongs to the caller.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the crate
pub type HolodeckResult<T> = Result<T, HolodeckError>;

#[derive(Debug, Error)]
pub enum HolodeckError {
    /// A named OS object the peer should have created does not exist (yet)
    #[error("failed to initialize '{name}': {source}")]
    Initialization {
        name: String,
        #[source]
        source: io::Error,
    },

    /// A bounded wait expired before the peer signaled
    #[error("timed out after {timeout:?} waiting on '{name}' for the engine")]
    Timeout { name: String, timeout: Duration },

    /// A shared memory segment could not be created, opened or resized
    #[error("failed to allocate shared buffer '{key}': {reason}")]
    Allocation { key: String, reason: String },

    /// Typed view or copy that does not fit the buffer's dtype or element
    /// count, or a write to a key that was never allocated
    #[error("invalid view of shared buffer '{key}': {reason}")]
    View { key: String, reason: String },

    /// Handshake operation issued after teardown or out of protocol order
    #[error("cannot {operation} while session is {state}")]
    State {
        operation: &'static str,
        state: String,
    },

    /// Host OS is not one of the supported platform families
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Invalid configuration file or environment value
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl HolodeckError {
    pub fn allocation(key: impl Into<String>, reason: impl ToString) -> Self {
        HolodeckError::Allocation {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn view(key: impl Into<String>, reason: impl ToString) -> Self {
        HolodeckError::View {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        HolodeckError::Config(msg.into())
    }

    pub fn initialization(name: impl Into<String>, source: io::Error) -> Self {
        HolodeckError::Initialization {
            name: name.into(),
            source,
        }
    }

    /// True for a bounded wait that expired; the session is still usable
    pub fn is_timeout(&self) -> bool {
        matches!(self, HolodeckError::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = HolodeckError::Timeout {
            name: "/HOLODECK_SEMAPHORE_CLIENTabc".into(),
            timeout: Duration::from_millis(50),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("HOLODECK_SEMAPHORE_CLIENTabc"));

        let err = HolodeckError::allocation("cmd", "zero dimension in shape [0]");
        assert!(!err.is_timeout());
        assert_eq!(
            err.to_string(),
            "failed to allocate shared buffer 'cmd': zero dimension in shape [0]"
        );
    }

    #[test]
    fn test_initialization_keeps_source() {
        use std::error::Error as _;

        let err = HolodeckError::initialization(
            "/HOLODECK_SEMAPHORE_SERVER",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.source().is_some());
    }
}
