//! # Playback Error Types
//!
//! Error taxonomy for session setup and control.

use std::fmt;

use bridge_traits::BridgeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while configuring or driving a session.
#[derive(Error, Debug)]
pub enum PlaybackError {
    // ========================================================================
    // Input Errors
    // ========================================================================
    /// Request is malformed or self-contradictory (bad URI, conflicting DRM
    /// options).
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    // ========================================================================
    // Host Errors
    // ========================================================================
    /// The host cannot provide a capability the request needs.
    #[error("Capability unavailable: {0}")]
    Capability(String),

    /// Fatal native playback failure.
    #[error("Engine error: {0}")]
    Engine(String),

    /// Cache storage could not be cleaned up completely.
    #[error("Resource error: {0}")]
    Resource(String),

    /// Source or notification setup failed.
    #[error("Setup failed: {0}")]
    Setup(String),

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// The session has been disposed.
    #[error("Session disposed")]
    Disposed,

    // ========================================================================
    // Generic Errors
    // ========================================================================
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error class reported across the host boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Capability,
    Engine,
    Resource,
    Setup,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Capability => "capability",
            ErrorKind::Engine => "engine",
            ErrorKind::Resource => "resource",
            ErrorKind::Setup => "setup",
        };
        f.write_str(name)
    }
}

impl PlaybackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlaybackError::Configuration(_) => ErrorKind::Configuration,
            PlaybackError::Capability(_) => ErrorKind::Capability,
            PlaybackError::Engine(_) => ErrorKind::Engine,
            PlaybackError::Resource(_) | PlaybackError::Io(_) => ErrorKind::Resource,
            PlaybackError::Setup(_) | PlaybackError::Disposed => ErrorKind::Setup,
            PlaybackError::Bridge(BridgeError::NotAvailable(_))
            | PlaybackError::Bridge(BridgeError::Unsupported(_)) => ErrorKind::Capability,
            PlaybackError::Bridge(_) => ErrorKind::Setup,
        }
    }

    /// Returns `true` if playback can continue, degraded, after this error.
    pub fn is_degradable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Capability | ErrorKind::Resource)
    }
}

/// Failure returned by a session command.
///
/// Always carries a non-empty diagnostic message.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind} error: {message}")]
pub struct CommandFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<PlaybackError> for CommandFailure {
    fn from(error: PlaybackError) -> Self {
        let kind = error.kind();
        let mut message = error.to_string();
        if message.trim().is_empty() {
            message = format!("{kind} failure");
        }
        CommandFailure { kind, message }
    }
}

/// Result type for playback operations.
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            PlaybackError::Configuration("both".into()).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(PlaybackError::Disposed.kind(), ErrorKind::Setup);
        assert_eq!(
            PlaybackError::Bridge(BridgeError::Unsupported("widevine".into())).kind(),
            ErrorKind::Capability
        );
        assert_eq!(
            PlaybackError::Bridge(BridgeError::OperationFailed("x".into())).kind(),
            ErrorKind::Setup
        );
        assert!(PlaybackError::Resource("partial".into()).is_degradable());
        assert!(!PlaybackError::Engine("decoder".into()).is_degradable());
    }

    #[test]
    fn test_command_failure_carries_message() {
        let failure = CommandFailure::from(PlaybackError::Setup(String::new()));
        assert_eq!(failure.kind, ErrorKind::Setup);
        assert!(!failure.message.is_empty());

        let failure = CommandFailure::from(PlaybackError::Configuration(
            "licenseUrl and clearKey are mutually exclusive".into(),
        ));
        assert!(failure.message.contains("mutually exclusive"));
        assert_eq!(
            failure.to_string(),
            "configuration error: Invalid configuration: licenseUrl and clearKey are mutually exclusive"
        );
    }
}
