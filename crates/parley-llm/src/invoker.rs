//! # Tool Invoker Trait
//!
//! Executes requested tool calls. Implementations reach real business
//! tools over the network or emulate them in process; either way they must
//! be safe to call concurrently across unrelated sessions with no
//! cross-session state leakage.

use async_trait::async_trait;
use serde_json::Value;

use parley_core::ids::SessionId;

/// Result type alias for tool invocations.
pub type InvokeResult = Result<Value, ToolError>;

/// Errors a tool invocation can fail with.
///
/// Tool failures are never session-fatal: the runtime embeds them as
/// error-shaped results and the dialogue continues.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The tool ran and reported a failure.
    #[error("tool '{tool_name}' failed: {message}")]
    Invocation {
        /// Tool name.
        tool_name: String,
        /// Failure description.
        message: String,
    },

    /// No such tool is registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Core tool invoker trait.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    /// Execute one tool call on behalf of a session.
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: &Value,
        session_id: &SessionId,
    ) -> InvokeResult;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
