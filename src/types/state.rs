//! Session lifecycle states.

use serde::Serialize;
use std::fmt;

/// Connection-session lifecycle state.
///
/// Written only by the session task; published through a `watch` channel so
/// `status` reads observe transitions atomically. `Failed` carries the most
/// recent failure reason: while the reconnection policy has attempts left the
/// session re-enters `Connecting` from it, and once the budget is exhausted
/// it settles there. `Closed` and a settled `Failed` admit no further
/// transitions; a finished session is never resurrected, only replaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    Draining,
    Closed,
    Failed(String),
}

impl SessionState {
    /// End states for a session that has run out of work. `Failed` is
    /// transient while reconnection attempts remain; it is settled once the
    /// session task has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed(_))
    }

    /// Whether the receive path may still enqueue audio.
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Draining => write!(f, "draining"),
            SessionState::Closed => write!(f, "closed"),
            SessionState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_classification() {
        assert!(SessionState::Closed.is_terminal());
        assert!(SessionState::Failed("x".into()).is_terminal());
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Connecting.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(!SessionState::Draining.is_terminal());
    }

    #[test]
    fn failed_display_carries_reason() {
        let state = SessionState::Failed("device gone".into());
        assert_eq!(state.to_string(), "failed: device gone");
    }
}
