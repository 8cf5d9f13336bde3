//! Batch record types — the shape shared by the scheduler and the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{BatchId, SessionId};
use crate::messages::Message;
use crate::scenario::Scenario;
use crate::session::SessionStatus;

/// Lifecycle status of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Submitted, not yet executing.
    Created,
    /// Scenarios are being driven.
    Running,
    /// Every scenario reached a terminal status.
    Completed,
}

impl BatchStatus {
    /// Stable string form used in persisted snapshots.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
        }
    }

    /// Parse the stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluator verdict for one finished transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Score on the evaluator's scale (1 = worst).
    pub score: u8,
    /// Free-text justification.
    pub comment: String,
}

/// Terminal outcome of one scenario within a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario name.
    pub scenario: String,
    /// Session that ran it.
    pub session_id: SessionId,
    /// Terminal session status.
    pub status: SessionStatus,
    /// Client-visible turns completed.
    pub turn_count: u32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Human-readable cause for error terminations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Evaluator verdict, when the transcript was scoreable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    /// Full transcript, partial history included for failures.
    pub messages: Vec<Message>,
}

/// The persisted batch snapshot.
///
/// Written on every significant transition (created, each scenario
/// completion, completed) so a restart can still answer what batches exist
/// and what their last known state was.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Batch ID.
    pub batch_id: BatchId,
    /// Scenarios submitted with the batch.
    pub scenarios: Vec<Scenario>,
    /// Concurrency cap the batch runs under.
    pub concurrency: usize,
    /// Lifecycle status.
    pub status: BatchStatus,
    /// Total scenario count.
    pub total: u32,
    /// Scenarios that reached any terminal status (failures included).
    pub completed: u32,
    /// Scenarios whose terminal status counts as a failure.
    pub failed: u32,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Execution start time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Per-scenario results accumulated so far.
    pub results: Vec<ScenarioResult>,
}

impl BatchRecord {
    /// Create a fresh record for a submitted batch.
    #[must_use]
    pub fn new(scenarios: Vec<Scenario>, concurrency: usize) -> Self {
        let total = scenarios.len() as u32;
        Self {
            batch_id: BatchId::new(),
            scenarios,
            concurrency,
            status: BatchStatus::Created,
            total,
            completed: 0,
            failed: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            results: Vec::new(),
        }
    }

    /// Completion percentage; an empty batch reads as fully complete.
    #[must_use]
    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        f64::from(self.completed) / f64::from(self.total) * 100.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
