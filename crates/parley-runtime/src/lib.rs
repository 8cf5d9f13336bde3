//! # parley-runtime
//!
//! The two hard subsystems of the simulation engine:
//!
//! - **Conversation orchestrator**: a per-session state machine driving
//!   turn-taking, agent handoff, and tool-call lifecycle over an agent
//!   graph, consuming the completion-provider and tool-invoker
//!   collaborators
//! - **Batch scheduler**: runs many orchestrators under a concurrency cap,
//!   isolates scenario failures, aggregates monotonic progress, and
//!   persists snapshots so a restart can still see batch state
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: parley-core, parley-llm, parley-store.

#![deny(unsafe_code)]

pub mod errors;
pub mod orchestrator;
pub mod scheduler;

pub use errors::{SchedulerError, SessionError};
pub use orchestrator::conversation::{ConversationOrchestrator, StepOutcome};
pub use orchestrator::tool_call_tracker::{ToolCallTracker, ToolEvent};
pub use scheduler::batch_scheduler::{BatchScheduler, BatchStatusView, BatchSummary};
pub use scheduler::progress::ProgressTracker;
