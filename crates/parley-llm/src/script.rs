//! Deterministic scripted completion provider.
//!
//! Drives dialogues from per-role reply scripts instead of a live model.
//! Each session consumes its own cursor per role, so concurrent sessions
//! never interleave scripts. Replaying an identical scenario and seed
//! yields an identical reply sequence.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use parley_core::ids::SessionId;

use crate::provider::{
    CompletionContext, CompletionProvider, CompletionReply, ProviderError, ProviderResult,
};

/// One scripted step for a role.
#[derive(Clone, Debug)]
pub enum ScriptedStep {
    /// Emit this reply verbatim.
    Reply(CompletionReply),
    /// Emit one of several texts, chosen by the scenario seed.
    SeededText(Vec<String>),
    /// Fail the completion call.
    Fail(ScriptedFailure),
}

impl ScriptedStep {
    /// Text step shorthand.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Reply(CompletionReply::text(content))
    }

    /// Handoff step shorthand.
    #[must_use]
    pub fn handoff(target: impl Into<String>) -> Self {
        Self::Reply(CompletionReply::handoff(target))
    }
}

/// Failure kinds a script can inject.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedFailure {
    /// Emit [`ProviderError::RateLimited`].
    RateLimited,
    /// Emit [`ProviderError::GeoBlocked`].
    GeoBlocked,
    /// Emit [`ProviderError::Unavailable`].
    Unavailable,
}

impl ScriptedFailure {
    fn into_error(self) -> ProviderError {
        match self {
            Self::RateLimited => ProviderError::RateLimited {
                retry_after_ms: 1_000,
                message: "scripted rate limit".into(),
            },
            Self::GeoBlocked => ProviderError::GeoBlocked {
                message: "scripted geographic restriction".into(),
            },
            Self::Unavailable => ProviderError::Unavailable {
                message: "scripted outage".into(),
            },
        }
    }
}

/// Scripted [`CompletionProvider`].
///
/// A role whose script runs out emits the exhaustion marker as plain text,
/// which the runtime's terminal-marker scan turns into a normal completion.
pub struct ScriptedProvider {
    scripts: HashMap<String, Vec<ScriptedStep>>,
    /// Per-(session, role) cursor; isolates concurrent sessions.
    cursors: DashMap<(SessionId, String), usize>,
    exhausted_marker: String,
}

impl ScriptedProvider {
    /// Create an empty provider; every role is immediately exhausted.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            cursors: DashMap::new(),
            exhausted_marker: "end_call".to_owned(),
        }
    }

    /// Attach a script to a role label.
    #[must_use]
    pub fn with_script(
        mut self,
        role: impl Into<String>,
        steps: impl IntoIterator<Item = ScriptedStep>,
    ) -> Self {
        let _ = self
            .scripts
            .insert(role.into(), steps.into_iter().collect());
        self
    }

    /// Override the text emitted when a role's script is exhausted.
    #[must_use]
    pub fn with_exhausted_marker(mut self, marker: impl Into<String>) -> Self {
        self.exhausted_marker = marker.into();
        self
    }

    fn next_index(&self, session_id: &SessionId, role: &str) -> usize {
        let mut entry = self
            .cursors
            .entry((session_id.clone(), role.to_owned()))
            .or_insert(0);
        let index = *entry;
        *entry += 1;
        index
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, context: &CompletionContext<'_>) -> ProviderResult<CompletionReply> {
        let role = context.speaker.label();
        let index = self.next_index(context.session_id, role);
        let step = self.scripts.get(role).and_then(|s| s.get(index));

        let Some(step) = step else {
            debug!(session_id = %context.session_id, role, index, "script exhausted");
            return Ok(CompletionReply::text(self.exhausted_marker.clone()));
        };

        match step {
            ScriptedStep::Reply(reply) => Ok(reply.clone()),
            ScriptedStep::SeededText(variants) => {
                let seed = context.seed.unwrap_or(0);
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(index as u64));
                let pick = rng.random_range(0..variants.len());
                Ok(CompletionReply::text(variants[pick].clone()))
            }
            ScriptedStep::Fail(failure) => Err(failure.into_error()),
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
    use parley_core::messages::Speaker;
    use std::collections::BTreeSet;

    fn context<'a>(
        session_id: &'a SessionId,
        speaker: &'a Speaker,
        tools: &'a BTreeSet<String>,
        seed: Option<u64>,
    ) -> CompletionContext<'a> {
        CompletionContext {
            session_id,
            speaker,
            system_prompt: "",
            history: &[],
            tools,
            seed,
        }
    }

    #[tokio::test]
    async fn steps_consume_in_order() {
        let provider = ScriptedProvider::new()
            .with_script("client", [ScriptedStep::text("one"), ScriptedStep::text("two")]);
        let sid = SessionId::new();
        let speaker = Speaker::Client;
        let tools = BTreeSet::new();
        let ctx = context(&sid, &speaker, &tools, None);

        assert_matches!(
            provider.complete(&ctx).await.unwrap(),
            CompletionReply::Text { content } if content == "one"
        );
        assert_matches!(
            provider.complete(&ctx).await.unwrap(),
            CompletionReply::Text { content } if content == "two"
        );
    }

    #[tokio::test]
    async fn exhausted_script_emits_marker() {
        let provider = ScriptedProvider::new();
        let sid = SessionId::new();
        let speaker = Speaker::Client;
        let tools = BTreeSet::new();
        let ctx = context(&sid, &speaker, &tools, None);

        assert_matches!(
            provider.complete(&ctx).await.unwrap(),
            CompletionReply::Text { content } if content == "end_call"
        );
    }

    #[tokio::test]
    async fn sessions_have_independent_cursors() {
        let provider = ScriptedProvider::new()
            .with_script("client", [ScriptedStep::text("first")]);
        let a = SessionId::new();
        let b = SessionId::new();
        let speaker = Speaker::Client;
        let tools = BTreeSet::new();

        let reply_a = provider
            .complete(&context(&a, &speaker, &tools, None))
            .await
            .unwrap();
        let reply_b = provider
            .complete(&context(&b, &speaker, &tools, None))
            .await
            .unwrap();
        assert_eq!(reply_a, reply_b);
    }

    #[tokio::test]
    async fn seeded_text_is_deterministic() {
        let provider = ScriptedProvider::new().with_script(
            "client",
            [ScriptedStep::SeededText(vec![
                "alpha".into(),
                "beta".into(),
                "gamma".into(),
            ])],
        );
        let speaker = Speaker::Client;
        let tools = BTreeSet::new();

        let a = SessionId::new();
        let first = provider
            .complete(&context(&a, &speaker, &tools, Some(42)))
            .await
            .unwrap();
        let b = SessionId::new();
        let second = provider
            .complete(&context(&b, &speaker, &tools, Some(42)))
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn scripted_failure_surfaces() {
        let provider = ScriptedProvider::new()
            .with_script("sales", [ScriptedStep::Fail(ScriptedFailure::GeoBlocked)]);
        let sid = SessionId::new();
        let speaker = Speaker::agent("sales");
        let tools = BTreeSet::new();

        let err = provider
            .complete(&context(&sid, &speaker, &tools, None))
            .await
            .unwrap_err();
        assert_matches!(err, ProviderError::GeoBlocked { .. });
    }
}
