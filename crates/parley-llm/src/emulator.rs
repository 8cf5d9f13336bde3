//! Canned tool invoker for offline simulation.
//!
//! Answers every registered tool with a fixed JSON value and keeps a
//! per-session invocation count, so tests can verify that unrelated
//! sessions never observe each other's state.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{debug, warn};

use parley_core::ids::SessionId;

use crate::invoker::{InvokeResult, ToolError, ToolInvoker};

enum Canned {
    Value(Value),
    Failure(String),
}

/// In-process [`ToolInvoker`] with canned per-tool responses.
pub struct ToolEmulator {
    responses: HashMap<String, Canned>,
    calls: DashMap<SessionId, u64>,
}

impl ToolEmulator {
    /// Create an emulator with no registered tools.
    #[must_use]
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            calls: DashMap::new(),
        }
    }

    /// Register a tool with a fixed successful response.
    #[must_use]
    pub fn with_tool(mut self, name: impl Into<String>, response: Value) -> Self {
        let _ = self.responses.insert(name.into(), Canned::Value(response));
        self
    }

    /// Register a tool that always fails with the given message.
    #[must_use]
    pub fn with_failing_tool(mut self, name: impl Into<String>, message: impl Into<String>) -> Self {
        let _ = self
            .responses
            .insert(name.into(), Canned::Failure(message.into()));
        self
    }

    /// Number of invocations recorded for a session.
    #[must_use]
    pub fn calls_for(&self, session_id: &SessionId) -> u64 {
        self.calls.get(session_id).map_or(0, |c| *c)
    }
}

impl Default for ToolEmulator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolInvoker for ToolEmulator {
    async fn invoke(
        &self,
        tool_name: &str,
        arguments: &Value,
        session_id: &SessionId,
    ) -> InvokeResult {
        *self.calls.entry(session_id.clone()).or_insert(0) += 1;
        debug!(%session_id, tool_name, %arguments, "emulated tool call");

        match self.responses.get(tool_name) {
            Some(Canned::Value(v)) => Ok(v.clone()),
            Some(Canned::Failure(message)) => Err(ToolError::Invocation {
                tool_name: tool_name.to_owned(),
                message: message.clone(),
            }),
            None => {
                warn!(%session_id, tool_name, "call to unregistered tool");
                Err(ToolError::UnknownTool(tool_name.to_owned()))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn canned_value_returned() {
        let emulator = ToolEmulator::new().with_tool("get_cart", json!({"items": []}));
        let sid = SessionId::new();
        let value = emulator
            .invoke("get_cart", &json!({}), &sid)
            .await
            .unwrap();
        assert_eq!(value, json!({"items": []}));
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let emulator = ToolEmulator::new();
        let sid = SessionId::new();
        let err = emulator.invoke("nope", &json!({}), &sid).await.unwrap_err();
        assert_matches!(err, ToolError::UnknownTool(name) if name == "nope");
    }

    #[tokio::test]
    async fn failing_tool_errors_with_message() {
        let emulator = ToolEmulator::new().with_failing_tool("add_to_cart", "upstream 500");
        let sid = SessionId::new();
        let err = emulator
            .invoke("add_to_cart", &json!({"items": []}), &sid)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            ToolError::Invocation { tool_name, message }
                if tool_name == "add_to_cart" && message == "upstream 500"
        );
    }

    #[tokio::test]
    async fn call_counts_are_per_session() {
        let emulator = ToolEmulator::new().with_tool("get_cart", json!(null));
        let a = SessionId::new();
        let b = SessionId::new();

        let _ = emulator.invoke("get_cart", &json!({}), &a).await.unwrap();
        let _ = emulator.invoke("get_cart", &json!({}), &a).await.unwrap();
        let _ = emulator.invoke("get_cart", &json!({}), &b).await.unwrap();

        assert_eq!(emulator.calls_for(&a), 2);
        assert_eq!(emulator.calls_for(&b), 1);
    }
}
