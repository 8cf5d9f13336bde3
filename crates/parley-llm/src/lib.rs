//! # parley-llm
//!
//! Collaborator interfaces consumed by the simulation runtime, and
//! deterministic in-process implementations of them.
//!
//! - **[`provider::CompletionProvider`]**: produces the next reply for the
//!   active speaker — text, tool calls, or a handoff request
//! - **[`invoker::ToolInvoker`]**: executes a requested tool call; safe to
//!   call concurrently across unrelated sessions
//! - **[`evaluator::Evaluator`]**: scores a finished transcript
//! - **[`script::ScriptedProvider`]**: deterministic provider driven by
//!   per-role reply scripts; identical scenario + seed replays identically
//! - **[`emulator::ToolEmulator`]**: canned tool results with per-session
//!   isolation
//!
//! ## Crate Position
//!
//! Interface crate. Depends on parley-core. Depended on by parley-runtime.

#![deny(unsafe_code)]

pub mod emulator;
pub mod evaluator;
pub mod invoker;
pub mod provider;
pub mod script;

pub use emulator::ToolEmulator;
pub use evaluator::{Evaluator, EvaluatorError, FixedEvaluator};
pub use invoker::{ToolError, ToolInvoker};
pub use provider::{CompletionContext, CompletionProvider, CompletionReply, ProviderError};
pub use script::{ScriptedProvider, ScriptedStep};
