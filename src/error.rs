//! Error types for the playback core.
//!
//! Recoverable conditions (malformed frames, buffer overrun, playback
//! underrun) are counted in [`crate::types::StatsSnapshot`] and never stop a
//! session. Only exhausted reconnection and device failures are terminal;
//! those surface as `SessionState::Failed(reason)` through `status`.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for session operations.
pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Main error type for the streaming playback core.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SessionError {
    #[error("transport failure: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("malformed frame: {reason}")]
    MalformedFrame { reason: String },

    #[error("buffer overrun: {dropped} oldest bytes discarded")]
    BufferOverrun { dropped: usize },

    #[error("playback underrun: {shortfall} bytes substituted with silence")]
    PlaybackUnderrun { shortfall: usize },

    #[error("audio device failure: {reason}")]
    Device {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl SessionError {
    /// Returns whether this error is potentially recoverable through retry.
    ///
    /// Transport and timeout failures feed the reconnection policy; everything
    /// else is either counted-and-dropped or fatal for the session.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Transport { .. } => true,
            SessionError::Timeout { .. } => true,
            SessionError::MalformedFrame { .. } => false,
            SessionError::BufferOverrun { .. } => false,
            SessionError::PlaybackUnderrun { .. } => false,
            SessionError::Device { .. } => false,
            SessionError::Config { .. } => false,
        }
    }

    /// Returns whether this error terminates the session outright.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Device { .. } | SessionError::Config { .. })
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        SessionError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SessionError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for malformed-frame errors.
    pub fn malformed_frame(reason: impl Into<String>) -> Self {
        SessionError::MalformedFrame { reason: reason.into() }
    }

    /// Helper constructor for audio device errors.
    pub fn device_failed(reason: impl Into<String>) -> Self {
        SessionError::Device { reason: reason.into(), source: None }
    }

    /// Helper constructor for audio device errors with source.
    pub fn device_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        SessionError::Device { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        SessionError::Config { reason: reason.into() }
    }
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Transport { reason: "I/O error".to_string(), source: Some(Box::new(err)) }
    }
}
