//! # Completion Provider Trait
//!
//! Core abstraction over the language-model backend. The runtime asks the
//! provider for the active speaker's next reply given the visible history
//! and that speaker's tool schema; the reply is exactly one of text, tool
//! calls, or a handoff request.
//!
//! Real network-backed providers live outside this workspace; the scripted
//! provider in [`crate::script`] is the in-process implementation used by
//! tests and offline runs.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parley_core::ids::SessionId;
use parley_core::messages::{Message, Speaker, ToolCall};

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors a completion provider can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Rate limited by the backend.
    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited {
        /// Suggested retry delay in milliseconds.
        retry_after_ms: u64,
        /// Error description.
        message: String,
    },

    /// Request refused for geographic/policy reasons.
    #[error("geo blocked: {message}")]
    GeoBlocked {
        /// Error description.
        message: String,
    },

    /// Backend unavailable or otherwise failed.
    #[error("provider unavailable: {message}")]
    Unavailable {
        /// Error description.
        message: String,
    },
}

impl ProviderError {
    /// Whether a retry could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Unavailable { .. } => true,
            Self::GeoBlocked { .. } => false,
        }
    }

    /// Error category string for logging and metrics.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate_limit",
            Self::GeoBlocked { .. } => "geo_blocked",
            Self::Unavailable { .. } => "unavailable",
        }
    }
}

/// A handoff request: the active agent asks to pass control to a peer.
///
/// Modeled as a first-class reply variant rather than a synthesized tool,
/// so control-flow signals never mix with business-tool invocations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffRequest {
    /// Target role name.
    pub target: String,
    /// Optional free-text reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The classified reply for one completion call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionReply {
    /// Plain text — becomes a client-visible message.
    Text {
        /// Reply text.
        content: String,
    },
    /// One or more tool-call requests; not a client-visible turn.
    ToolCalls {
        /// Requested calls, in emission order.
        calls: Vec<ToolCall>,
    },
    /// Request to transfer the active-agent role.
    Handoff(HandoffRequest),
}

impl CompletionReply {
    /// Text reply constructor.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Handoff reply constructor.
    #[must_use]
    pub fn handoff(target: impl Into<String>) -> Self {
        Self::Handoff(HandoffRequest {
            target: target.into(),
            reason: None,
        })
    }
}

/// Everything the provider sees for one completion call.
#[derive(Clone, Copy, Debug)]
pub struct CompletionContext<'a> {
    /// Session the call belongs to.
    pub session_id: &'a SessionId,
    /// Side being asked to speak.
    pub speaker: &'a Speaker,
    /// Rendered system prompt for that side.
    pub system_prompt: &'a str,
    /// Client-visible history so far.
    pub history: &'a [Message],
    /// Tool names available to this speaker.
    pub tools: &'a BTreeSet<String>,
    /// Scenario seed for deterministic replays.
    pub seed: Option<u64>,
}

/// Core completion provider trait.
///
/// Implementors must be `Send + Sync`; the batch scheduler shares one
/// provider across every concurrently running session.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Produce the next reply for the context's speaker.
    async fn complete(&self, context: &CompletionContext<'_>) -> ProviderResult<CompletionReply>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
