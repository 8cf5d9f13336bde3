//! Session state — one orchestrated dialogue instance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::ids::SessionId;
use crate::messages::Message;

/// Lifecycle status of a session.
///
/// Every status except [`Running`](SessionStatus::Running) is terminal, and
/// a terminal status is write-once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// The orchestrator is still driving the dialogue.
    Running,
    /// A side emitted an explicit terminal signal.
    Completed,
    /// Wall-clock budget exhausted.
    Timeout,
    /// Turn budget exhausted.
    MaxTurns,
    /// The completion provider reported a geographic/policy block.
    Blocked,
    /// Provider failure, configuration error, or cancellation.
    Error,
}

impl SessionStatus {
    /// Whether the session has reached a terminal status.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }

    /// Whether this terminal status counts as a failure for batch
    /// accounting. Timeout and max-turns are expected terminations and
    /// produce scoreable transcripts.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(self, Self::Blocked | Self::Error)
    }

    /// Stable string form used in persisted snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Timeout => "timeout",
            Self::MaxTurns => "max_turns",
            Self::Blocked => "blocked",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One dialogue session: identity, transcript, and lifecycle status.
///
/// Mutated only by its own orchestrator; immutable once the status leaves
/// [`SessionStatus::Running`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session ID.
    pub id: SessionId,
    /// Name of the scenario this session runs.
    pub scenario: String,
    /// Currently active agent role. Exactly one at any instant.
    pub active_agent: String,
    /// Client-visible turn count. Monotone.
    pub turn_count: u32,
    /// Ordered transcript, internal records included.
    pub messages: Vec<Message>,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Human-readable cause for error-shaped terminations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Session start time.
    pub started_at: DateTime<Utc>,
    /// Termination time, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create a running session positioned at the graph's entry agent.
    #[must_use]
    pub fn new(scenario: impl Into<String>, entry_agent: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            scenario: scenario.into(),
            active_agent: entry_agent.into(),
            turn_count: 0,
            messages: Vec::new(),
            status: SessionStatus::Running,
            failure: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Append a transcript entry.
    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Move the session to a terminal status, preserving the partial
    /// transcript. A second call is ignored: terminal status is write-once.
    pub fn finish(&mut self, status: SessionStatus, failure: Option<String>) {
        debug_assert!(status.is_terminal());
        if self.status.is_terminal() {
            warn!(
                session_id = %self.id,
                current = %self.status,
                attempted = %status,
                "ignoring status change on terminal session"
            );
            return;
        }
        self.status = status;
        self.failure = failure;
        self.ended_at = Some(Utc::now());
    }

    /// The client-visible portion of the transcript.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_visible())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
