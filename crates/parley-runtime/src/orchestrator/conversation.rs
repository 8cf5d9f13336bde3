//! Conversation orchestrator — drives one session from creation to a
//! terminal status.
//!
//! The state machine alternates between the simulated client and the
//! active agent. Each [`step`](ConversationOrchestrator::step) checks the
//! session budgets, asks the completion provider for the active speaker's
//! next reply, and classifies it as exactly one of: plain text (a
//! client-visible turn), tool calls (an internal tool round), or a handoff
//! request (an internal transfer of the active-agent role).
//!
//! Every terminal path preserves the partial transcript and flushes the
//! tool-call tracker so no call id is ever dropped.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use parley_core::agents::{AgentGraph, GraphError, RenderedGraph};
use parley_core::config::SimulationConfig;
use parley_core::messages::{Message, Speaker, ToolCall, ToolResult};
use parley_core::scenario::Scenario;
use parley_core::session::{Session, SessionStatus};
use parley_llm::invoker::ToolInvoker;
use parley_llm::provider::{
    CompletionContext, CompletionProvider, CompletionReply, HandoffRequest,
};

use crate::errors::SessionError;
use crate::orchestrator::tool_call_tracker::{ToolCallTracker, ToolEvent};

/// Which side speaks next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Client,
    Agent,
}

/// Outcome of one orchestrator step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The session is still running.
    Continue,
    /// The session reached a terminal status.
    Terminal,
}

/// Drives one session's turn loop over a rendered agent graph.
pub struct ConversationOrchestrator {
    session: Session,
    graph: RenderedGraph,
    config: SimulationConfig,
    provider: Arc<dyn CompletionProvider>,
    invoker: Arc<dyn ToolInvoker>,
    tracker: ToolCallTracker,
    cancel: CancellationToken,
    seed: Option<u64>,
    max_turns: u32,
    deadline: Instant,
    /// Internal messages since the last client-visible turn.
    internal_messages: u32,
    side: Side,
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("session", &self.session)
            .field("config", &self.config)
            .field("seed", &self.seed)
            .field("max_turns", &self.max_turns)
            .field("internal_messages", &self.internal_messages)
            .field("side", &self.side)
            .finish_non_exhaustive()
    }
}

impl ConversationOrchestrator {
    /// Render the graph against the scenario's variables and create the
    /// session, positioned at the graph's entry agent with the client
    /// speaking first.
    pub fn start(
        scenario: &Scenario,
        graph: &AgentGraph,
        provider: Arc<dyn CompletionProvider>,
        invoker: Arc<dyn ToolInvoker>,
        config: SimulationConfig,
        cancel: CancellationToken,
    ) -> Result<Self, GraphError> {
        let rendered = graph.render(&scenario.variables)?;
        let max_turns = scenario.max_turns.unwrap_or(config.max_turns);
        let timeout = scenario.timeout.unwrap_or(config.timeout);
        let session = Session::new(scenario.name.clone(), rendered.entry.clone());
        info!(
            session_id = %session.id,
            scenario = %scenario.name,
            entry = %rendered.entry,
            max_turns,
            timeout_sec = timeout.as_secs(),
            "session created"
        );
        Ok(Self {
            session,
            graph: rendered,
            config,
            provider,
            invoker,
            tracker: ToolCallTracker::new(),
            cancel,
            seed: scenario.seed,
            max_turns,
            deadline: Instant::now() + timeout,
            internal_messages: 0,
            side: Side::Client,
        })
    }

    /// The session being driven.
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Drive the session to a terminal status and return it.
    pub async fn run(mut self) -> Session {
        while self.step().await == StepOutcome::Continue {}
        info!(
            session_id = %self.session.id,
            status = %self.session.status,
            turns = self.session.turn_count,
            "session finished"
        );
        self.session
    }

    /// Execute one transition of the state machine.
    ///
    /// Budget and cancellation checks happen here, before the provider is
    /// invoked; the reply is then classified as text, tool calls, or a
    /// handoff.
    #[instrument(skip_all, fields(session_id = %self.session.id, turn = self.session.turn_count))]
    pub async fn step(&mut self) -> StepOutcome {
        if self.session.status.is_terminal() {
            return StepOutcome::Terminal;
        }
        if self.cancel.is_cancelled() {
            return self.fail(SessionError::Cancelled);
        }
        if Instant::now() >= self.deadline {
            info!("wall-clock budget exhausted");
            return self.terminate(SessionStatus::Timeout, None);
        }
        if self.session.turn_count >= self.max_turns {
            info!(max_turns = self.max_turns, "turn budget exhausted");
            return self.terminate(SessionStatus::MaxTurns, None);
        }

        let speaker = self.active_speaker();
        let (prompt, tools) = {
            let role = self.active_role();
            (role.prompt.clone(), role.tools.clone())
        };
        let visible: Vec<Message> = self.session.visible_messages().cloned().collect();
        let context = CompletionContext {
            session_id: &self.session.id,
            speaker: &speaker,
            system_prompt: &prompt,
            history: &visible,
            tools: &tools,
            seed: self.seed,
        };

        let reply = match self.provider.complete(&context).await {
            Ok(reply) => reply,
            Err(e) => return self.fail(SessionError::Provider(e)),
        };

        match reply {
            CompletionReply::Text { content } => self.on_text(speaker, content),
            CompletionReply::ToolCalls { calls } => self.on_tool_calls(&tools, calls).await,
            CompletionReply::Handoff(request) => self.on_handoff(&speaker, &request),
        }
    }

    /// Plain text: the only transition that increments the turn count.
    fn on_text(&mut self, speaker: Speaker, content: String) -> StepOutcome {
        let turn = self.session.turn_count + 1;
        let mut message = Message::visible(turn, speaker, content);
        self.tracker.process_text_message(&mut message);
        let ends_dialogue = self.is_terminal_signal(&message.content);
        debug!(turn, speaker = message.speaker.label(), "client-visible message");
        self.session.push_message(message);
        self.session.turn_count = turn;
        self.internal_messages = 0;

        if ends_dialogue {
            info!(turn, "terminal signal emitted");
            return self.terminate(SessionStatus::Completed, None);
        }
        self.side = match self.side {
            Side::Client => Side::Agent,
            Side::Agent => Side::Client,
        };
        StepOutcome::Continue
    }

    /// Tool round: register, invoke, feed results back, re-query the same
    /// agent. Never a client-visible turn; tool failures embed as
    /// error-shaped results and the session continues.
    async fn on_tool_calls(&mut self, allowed: &BTreeSet<String>, calls: Vec<ToolCall>) -> StepOutcome {
        if let Some(outcome) = self.consume_internal_budget() {
            return outcome;
        }
        for call in &calls {
            self.tracker.process_tool_event(ToolEvent::Requested(call.clone()));
        }
        for call in calls {
            // A cancel or deadline hit mid-round leaves the remaining calls
            // unexecuted; the next boundary check flushes them as orphans.
            if self.cancel.is_cancelled() || Instant::now() >= self.deadline {
                warn!(call_id = %call.id, "tool round interrupted");
                break;
            }
            let result = if allowed.contains(&call.name) {
                match self
                    .invoker
                    .invoke(&call.name, &call.arguments, &self.session.id)
                    .await
                {
                    Ok(value) => ToolResult::ok(call.id.clone(), value),
                    Err(e) => {
                        warn!(call_id = %call.id, tool = %call.name, error = %e, "tool failed");
                        ToolResult::error(call.id.clone(), e.to_string())
                    }
                }
            } else {
                warn!(call_id = %call.id, tool = %call.name, "tool not granted to active role");
                ToolResult::error(
                    call.id.clone(),
                    format!("tool '{}' is not available to this role", call.name),
                )
            };
            self.tracker.process_tool_event(ToolEvent::Executed { result });
        }
        StepOutcome::Continue
    }

    /// Handoff: switch the active agent without consuming a turn. A target
    /// missing from the active role's permitted set is a configuration
    /// error, not a crash.
    fn on_handoff(&mut self, speaker: &Speaker, request: &HandoffRequest) -> StepOutcome {
        if let Some(outcome) = self.consume_internal_budget() {
            return outcome;
        }
        let from = speaker.label().to_owned();
        if !self.active_role().handoffs.contains_key(&request.target) {
            return self.fail(SessionError::HandoffConfiguration {
                from,
                target: request.target.clone(),
            });
        }
        let note = match &request.reason {
            Some(reason) => format!("handoff to {}: {reason}", request.target),
            None => format!("handoff to {}", request.target),
        };
        debug!(from = %from, to = %request.target, "agent handoff");
        self.session.push_message(Message::internal(speaker.clone(), note));
        self.session.active_agent.clone_from(&request.target);
        StepOutcome::Continue
    }

    /// Count one internal message against the budget; exceeding it is a
    /// runaway-loop failure rather than a silent spin.
    fn consume_internal_budget(&mut self) -> Option<StepOutcome> {
        self.internal_messages += 1;
        if self.internal_messages > self.config.max_internal_messages {
            return Some(self.fail(SessionError::InternalBudgetExhausted(
                self.config.max_internal_messages,
            )));
        }
        None
    }

    fn fail(&mut self, error: SessionError) -> StepOutcome {
        warn!(
            session_id = %self.session.id,
            category = error.category(),
            error = %error,
            "session failed"
        );
        self.terminate(error.terminal_status(), Some(error.to_string()))
    }

    /// Flush the tracker and seal the session. The partial transcript is
    /// always preserved.
    fn terminate(&mut self, status: SessionStatus, failure: Option<String>) -> StepOutcome {
        if let Some(note) = self.tracker.handle_session_end() {
            self.session.push_message(note);
        }
        self.session.finish(status, failure);
        metrics::counter!("parley_sessions_terminal", "status" => status.as_str()).increment(1);
        StepOutcome::Terminal
    }

    fn active_speaker(&self) -> Speaker {
        match self.side {
            Side::Client => Speaker::Client,
            Side::Agent => Speaker::agent(self.session.active_agent.clone()),
        }
    }

    /// Role definition for the side about to speak.
    ///
    /// Lookups cannot miss: the graph validated its entry, client role, and
    /// every handoff edge, and `active_agent` only changes along edges.
    fn active_role(&self) -> &parley_core::agents::RenderedAgent {
        match self.side {
            Side::Client => self.graph.client(),
            Side::Agent => &self.graph.agents[&self.session.active_agent],
        }
    }

    fn is_terminal_signal(&self, content: &str) -> bool {
        let lowered = content.to_lowercase();
        self.config
            .terminal_markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_lowercase()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
