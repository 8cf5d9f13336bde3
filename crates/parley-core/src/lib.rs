//! # parley-core
//!
//! Foundation types for the parley dialogue-simulation engine.
//!
//! This crate provides the shared vocabulary that all other parley crates
//! depend on:
//!
//! - **Branded IDs**: [`ids::SessionId`], [`ids::BatchId`], [`ids::ToolCallId`]
//! - **Scenarios**: [`scenario::Scenario`] with its variable map and overrides
//! - **Agent graph**: [`agents::AgentGraph`] — nodes are agent roles, edges are
//!   permitted handoffs; rendered against scenario variables before a run
//! - **Messages**: [`messages::Message`] with speaker, turn number, and
//!   attached tool call/result pairs
//! - **Sessions**: [`session::Session`] — one orchestrated dialogue instance
//! - **Batches**: [`batch::BatchRecord`] — the persisted batch snapshot shape
//! - **Config**: [`config::SimulationConfig`] — turn/time/concurrency budgets
//! - **Logging**: [`logging::init`] — `tracing` subscriber setup
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other parley crates.

#![deny(unsafe_code)]

pub mod agents;
pub mod batch;
pub mod config;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod scenario;
pub mod session;

pub use agents::{AgentDefinition, AgentGraph, GraphError, RenderedAgent, RenderedGraph};
pub use batch::{BatchRecord, BatchStatus, Evaluation, ScenarioResult};
pub use config::SimulationConfig;
pub use ids::{BatchId, SessionId, ToolCallId};
pub use messages::{Message, Speaker, ToolCall, ToolResult};
pub use scenario::Scenario;
pub use session::{Session, SessionStatus};
