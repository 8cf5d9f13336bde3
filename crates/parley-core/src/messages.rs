//! Message types for the simulated dialogue transcript.
//!
//! Client-visible messages carry a turn number; internal handoff records do
//! not. Tool call/result pairs are attached to the message that flushed
//! them, never stored as free-floating events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::ToolCallId;

/// Who produced a message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Speaker {
    /// The simulated counterparty.
    Client,
    /// An agent role from the graph.
    Agent {
        /// Role name.
        name: String,
    },
    /// The simulation runtime itself (integrity notes, orphan flushes).
    System,
}

impl Speaker {
    /// Agent speaker constructor.
    #[must_use]
    pub fn agent(name: impl Into<String>) -> Self {
        Self::Agent { name: name.into() }
    }

    /// Role label used in rendered transcripts.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Client => "client",
            Self::Agent { name } => name,
            Self::System => "system",
        }
    }
}

/// A requested tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, unique within the session.
    pub id: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Opaque arguments (JSON).
    pub arguments: Value,
}

impl ToolCall {
    /// Construct a call with the given ID and name.
    #[must_use]
    pub fn new(id: impl Into<ToolCallId>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The outcome of a tool invocation, correlated by call ID.
///
/// `value == None` denotes an orphaned call: the session had to flush the
/// call before any execution result arrived.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// ID of the call this result answers.
    pub call_id: ToolCallId,
    /// Result value; `None` marks the call as orphaned.
    pub value: Option<Value>,
    /// Whether the invocation failed. Orphaned results are not errors.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result.
    #[must_use]
    pub fn ok(call_id: ToolCallId, value: Value) -> Self {
        Self {
            call_id,
            value: Some(value),
            is_error: false,
        }
    }

    /// Error-shaped result (tool failure embedded in the transcript).
    #[must_use]
    pub fn error(call_id: ToolCallId, message: impl Into<String>) -> Self {
        Self {
            call_id,
            value: Some(Value::String(message.into())),
            is_error: true,
        }
    }

    /// Orphaned result: no execution event arrived before the flush.
    #[must_use]
    pub fn orphaned(call_id: ToolCallId) -> Self {
        Self {
            call_id,
            value: None,
            is_error: false,
        }
    }

    /// Whether this result marks an orphaned call.
    #[must_use]
    pub fn is_orphaned(&self) -> bool {
        self.value.is_none()
    }
}

/// One transcript entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Turn number; `None` for internal (handoff/system) records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn: Option<u32>,
    /// Message author.
    pub speaker: Speaker,
    /// Text content.
    pub content: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Tool calls flushed onto this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Tool results flushed onto this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_results: Vec<ToolResult>,
}

impl Message {
    /// Client-visible message carrying a turn number.
    #[must_use]
    pub fn visible(turn: u32, speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            turn: Some(turn),
            speaker,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Internal record (handoff, integrity note) — no turn number.
    #[must_use]
    pub fn internal(speaker: Speaker, content: impl Into<String>) -> Self {
        Self {
            turn: None,
            speaker,
            content: content.into(),
            timestamp: Utc::now(),
            tool_calls: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    /// Whether this message counts as a client-visible turn.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.turn.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
