//! Runtime error types.
//!
//! Session-level failures never escape as errors: the orchestrator folds
//! them into a terminal [`parley_core::session::SessionStatus`] with a
//! human-readable cause. [`SessionError`] is the internal vocabulary for
//! that folding. [`SchedulerError`] covers infrastructure-level faults —
//! the only kind allowed to fail a batch call.

use parley_core::session::SessionStatus;
use parley_llm::provider::ProviderError;
use parley_store::errors::StoreError;

/// Why a session had to terminate abnormally.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The completion provider failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// An agent requested a handoff to a target missing from its
    /// permitted set — a malformed agent graph, not a crash.
    #[error("agent '{from}' requested handoff to unlisted target '{target}'")]
    HandoffConfiguration {
        /// Agent that issued the handoff.
        from: String,
        /// Target absent from its permitted set.
        target: String,
    },

    /// Internal messages between two client-visible turns exceeded the
    /// configured budget — a runaway agent loop.
    #[error("internal message budget ({0}) exhausted")]
    InternalBudgetExhausted(u32),

    /// The batch-level cancel signal fired.
    #[error("cancelled by batch")]
    Cancelled,
}

impl SessionError {
    /// Terminal status this error maps the session onto.
    #[must_use]
    pub fn terminal_status(&self) -> SessionStatus {
        match self {
            Self::Provider(ProviderError::GeoBlocked { .. }) => SessionStatus::Blocked,
            Self::Provider(_)
            | Self::HandoffConfiguration { .. }
            | Self::InternalBudgetExhausted(_)
            | Self::Cancelled => SessionStatus::Error,
        }
    }

    /// Error category string for logging and metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Provider(e) => e.category(),
            Self::HandoffConfiguration { .. } => "handoff_configuration",
            Self::InternalBudgetExhausted(_) => "internal_budget",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Infrastructure-level scheduler faults.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Unknown batch ID.
    #[error("batch not found: {0}")]
    BatchNotFound(String),

    /// The batch is not in a runnable state.
    #[error("batch {batch_id} cannot run from status '{status}'")]
    BatchNotRunnable {
        /// Batch ID.
        batch_id: String,
        /// Its current status.
        status: String,
    },

    /// Snapshot persistence failed at a point where the batch cannot
    /// proceed (submission).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No worker capacity at all — the concurrency semaphore was closed.
    #[error("no worker capacity: {0}")]
    WorkerUnavailable(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_block_maps_to_blocked() {
        let err = SessionError::Provider(ProviderError::GeoBlocked {
            message: "region".into(),
        });
        assert_eq!(err.terminal_status(), SessionStatus::Blocked);
        assert_eq!(err.category(), "geo_blocked");
    }

    #[test]
    fn other_provider_errors_map_to_error() {
        let err = SessionError::Provider(ProviderError::Unavailable {
            message: "down".into(),
        });
        assert_eq!(err.terminal_status(), SessionStatus::Error);
    }

    #[test]
    fn handoff_configuration_maps_to_error() {
        let err = SessionError::HandoffConfiguration {
            from: "sales".into(),
            target: "billing".into(),
        };
        assert_eq!(err.terminal_status(), SessionStatus::Error);
        assert_eq!(err.category(), "handoff_configuration");
        assert!(err.to_string().contains("billing"));
    }

    #[test]
    fn budget_exhaustion_display() {
        let err = SessionError::InternalBudgetExhausted(10);
        assert_eq!(err.to_string(), "internal message budget (10) exhausted");
        assert_eq!(err.terminal_status(), SessionStatus::Error);
    }

    #[test]
    fn cancelled_maps_to_error() {
        assert_eq!(SessionError::Cancelled.terminal_status(), SessionStatus::Error);
        assert_eq!(SessionError::Cancelled.category(), "cancelled");
    }

    #[test]
    fn scheduler_error_display() {
        let err = SchedulerError::BatchNotRunnable {
            batch_id: "b-1".into(),
            status: "completed".into(),
        };
        assert_eq!(err.to_string(), "batch b-1 cannot run from status 'completed'");
    }
}
