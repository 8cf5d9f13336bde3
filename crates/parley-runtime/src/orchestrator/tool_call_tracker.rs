//! Tool-call tracker — reconciles asynchronous call/execution events with
//! the turn-based transcript.
//!
//! Per-call lifecycle: requested → executed → flushed, or requested →
//! orphaned when a text-message boundary or session end arrives before the
//! execution event. Pending entries keep request order, and every call id
//! observed is flushed exactly once.

use tracing::warn;

use parley_core::messages::{Message, Speaker, ToolCall, ToolResult};

/// Transcript content for the integrity note flushed at session end.
const ORPHAN_NOTE: &str = "[orphaned tool events]";

/// An asynchronous tool lifecycle event.
#[derive(Clone, Debug)]
pub enum ToolEvent {
    /// A call was requested by the active agent.
    Requested(ToolCall),
    /// A previously requested call finished executing.
    Executed {
        /// The result, correlated by its `call_id`.
        result: ToolResult,
    },
}

struct PendingEntry {
    call: ToolCall,
    result: Option<ToolResult>,
}

/// Matches tool-call requests to their results and flushes them onto the
/// next outward message.
#[derive(Default)]
pub struct ToolCallTracker {
    /// Pending entries in request order.
    pending: Vec<PendingEntry>,
}

impl ToolCallTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls awaiting a flush.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Register a request or match an execution event.
    ///
    /// Execution events with no prior request are inconsistent input: they
    /// are logged and discarded, never fatal.
    pub fn process_tool_event(&mut self, event: ToolEvent) {
        match event {
            ToolEvent::Requested(call) => {
                if let Some(entry) = self.pending.iter_mut().find(|e| e.call.id == call.id) {
                    warn!(call_id = %call.id, "duplicate tool call id re-requested");
                    entry.call = call;
                    entry.result = None;
                } else {
                    self.pending.push(PendingEntry { call, result: None });
                }
            }
            ToolEvent::Executed { result } => {
                match self
                    .pending
                    .iter_mut()
                    .find(|e| e.call.id == result.call_id)
                {
                    Some(entry) if entry.result.is_none() => entry.result = Some(result),
                    Some(_) => {
                        warn!(call_id = %result.call_id, "duplicate execution event discarded");
                    }
                    None => {
                        warn!(call_id = %result.call_id, "unmatched execution event discarded");
                    }
                }
            }
        }
    }

    /// Flush every pending entry onto an outward text message.
    ///
    /// Executed entries attach their call/result pair; still-requested
    /// entries are flushed as orphaned (null result) in request order. The
    /// pending set is cleared.
    pub fn process_text_message(&mut self, message: &mut Message) {
        for entry in self.pending.drain(..) {
            let result = entry.result.unwrap_or_else(|| {
                warn!(call_id = %entry.call.id, "tool call flushed without execution result");
                ToolResult::orphaned(entry.call.id.clone())
            });
            message.tool_calls.push(entry.call);
            message.tool_results.push(result);
        }
    }

    /// Flush everything still pending at session end into a system-authored
    /// integrity note, so closing the session never silently drops a call.
    ///
    /// Returns `None` when nothing was pending.
    #[must_use]
    pub fn handle_session_end(&mut self) -> Option<Message> {
        if self.pending.is_empty() {
            return None;
        }
        warn!(
            pending = self.pending.len(),
            "session ended with unflushed tool calls"
        );
        let mut note = Message::internal(Speaker::System, ORPHAN_NOTE);
        self.process_text_message(&mut note);
        Some(note)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::ids::ToolCallId;
    use proptest::prelude::*;
    use serde_json::json;

    fn call(id: &str) -> ToolCall {
        ToolCall::new(id, "get_cart", json!({}))
    }

    fn executed(id: &str, value: serde_json::Value) -> ToolEvent {
        ToolEvent::Executed {
            result: ToolResult::ok(ToolCallId::from(id), value),
        }
    }

    #[test]
    fn new_tracker_is_empty() {
        assert_eq!(ToolCallTracker::new().pending_count(), 0);
    }

    #[test]
    fn request_then_execute_then_flush() {
        let mut tracker = ToolCallTracker::new();
        tracker.process_tool_event(ToolEvent::Requested(call("c1")));
        tracker.process_tool_event(executed("c1", json!("ok")));

        let mut msg = Message::visible(1, Speaker::agent("sales"), "done");
        tracker.process_text_message(&mut msg);

        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_results.len(), 1);
        assert_eq!(msg.tool_results[0].value, Some(json!("ok")));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn unexecuted_request_flushes_as_orphan() {
        let mut tracker = ToolCallTracker::new();
        tracker.process_tool_event(ToolEvent::Requested(call("c1")));

        let mut msg = Message::visible(1, Speaker::agent("sales"), "moving on");
        tracker.process_text_message(&mut msg);

        assert_eq!(msg.tool_results.len(), 1);
        assert!(msg.tool_results[0].is_orphaned());
    }

    #[test]
    fn unmatched_execution_discarded() {
        let mut tracker = ToolCallTracker::new();
        tracker.process_tool_event(executed("ghost", json!("ignored")));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn duplicate_execution_keeps_first_result() {
        let mut tracker = ToolCallTracker::new();
        tracker.process_tool_event(ToolEvent::Requested(call("c1")));
        tracker.process_tool_event(executed("c1", json!("first")));
        tracker.process_tool_event(executed("c1", json!("second")));

        let mut msg = Message::visible(1, Speaker::agent("sales"), "done");
        tracker.process_text_message(&mut msg);
        assert_eq!(msg.tool_results[0].value, Some(json!("first")));
    }

    #[test]
    fn flush_preserves_request_order() {
        let mut tracker = ToolCallTracker::new();
        tracker.process_tool_event(ToolEvent::Requested(call("c1")));
        tracker.process_tool_event(ToolEvent::Requested(call("c2")));
        tracker.process_tool_event(ToolEvent::Requested(call("c3")));
        // Results arrive out of order.
        tracker.process_tool_event(executed("c3", json!(3)));
        tracker.process_tool_event(executed("c1", json!(1)));

        let mut msg = Message::visible(1, Speaker::agent("sales"), "done");
        tracker.process_text_message(&mut msg);

        let ids: Vec<&str> = msg.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3"]);
        assert!(msg.tool_results[1].is_orphaned());
    }

    #[test]
    fn session_end_produces_integrity_note() {
        let mut tracker = ToolCallTracker::new();
        tracker.process_tool_event(ToolEvent::Requested(call("c1")));
        tracker.process_tool_event(executed("c1", json!("late")));
        tracker.process_tool_event(ToolEvent::Requested(call("c2")));

        let note = tracker.handle_session_end().unwrap();
        assert_eq!(note.content, ORPHAN_NOTE);
        assert!(note.turn.is_none());
        assert_eq!(note.tool_calls.len(), 2);
        assert_eq!(note.tool_results[0].value, Some(json!("late")));
        assert!(note.tool_results[1].is_orphaned());
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn session_end_with_nothing_pending_is_silent() {
        let mut tracker = ToolCallTracker::new();
        assert!(tracker.handle_session_end().is_none());
    }

    proptest! {
        /// Every observed call id is flushed exactly once, in request order,
        /// regardless of which subset of calls ever executes.
        #[test]
        fn every_call_flushed_exactly_once(executed_mask in proptest::collection::vec(any::<bool>(), 1..12)) {
            let mut tracker = ToolCallTracker::new();
            let ids: Vec<String> = (0..executed_mask.len()).map(|i| format!("c{i}")).collect();

            for id in &ids {
                tracker.process_tool_event(ToolEvent::Requested(call(id)));
            }
            for (id, ran) in ids.iter().zip(&executed_mask) {
                if *ran {
                    tracker.process_tool_event(executed(id, json!("done")));
                }
            }

            let mut msg = Message::visible(1, Speaker::agent("sales"), "flush");
            tracker.process_text_message(&mut msg);

            let flushed: Vec<&str> = msg.tool_calls.iter().map(|c| c.id.as_str()).collect();
            let expected: Vec<&str> = ids.iter().map(String::as_str).collect();
            prop_assert_eq!(flushed, expected);
            prop_assert_eq!(msg.tool_results.len(), ids.len());
            for (result, ran) in msg.tool_results.iter().zip(&executed_mask) {
                prop_assert_eq!(result.is_orphaned(), !*ran);
            }
            // Nothing left to flush a second time.
            prop_assert!(tracker.handle_session_end().is_none());
        }
    }
}
