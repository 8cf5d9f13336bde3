//! Simulation budgets and runtime configuration.

use std::time::Duration;

use tracing::warn;

/// Default client-visible turn budget per session.
pub const DEFAULT_MAX_TURNS: u32 = 30;
/// Default wall-clock budget per session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);
/// Default concurrent-session cap per batch.
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Default internal-message budget between client-visible turns.
pub const DEFAULT_MAX_INTERNAL_MESSAGES: u32 = 10;

/// Budgets and knobs for a simulation run.
///
/// Scenario-level overrides (`max_turns`, `timeout`) take precedence over
/// these values for their own session.
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    /// Client-visible turn budget per session.
    pub max_turns: u32,
    /// Wall-clock budget per session.
    pub timeout: Duration,
    /// Concurrent-session cap per batch.
    pub concurrency: usize,
    /// Internal messages (handoffs, tool rounds) allowed between two
    /// client-visible turns before the session is treated as a runaway.
    pub max_internal_messages: u32,
    /// Text markers either side may emit to end the dialogue.
    pub terminal_markers: Vec<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            max_turns: DEFAULT_MAX_TURNS,
            timeout: DEFAULT_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            max_internal_messages: DEFAULT_MAX_INTERNAL_MESSAGES,
            terminal_markers: vec!["end_call".to_owned()],
        }
    }
}

impl SimulationConfig {
    /// Build a config from `PARLEY_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    ///
    /// Recognized: `PARLEY_MAX_TURNS`, `PARLEY_TIMEOUT_SEC`,
    /// `PARLEY_CONCURRENCY`, `PARLEY_MAX_INTERNAL_MESSAGES`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse::<u32>("PARLEY_MAX_TURNS") {
            config.max_turns = v;
        }
        if let Some(v) = env_parse::<u64>("PARLEY_TIMEOUT_SEC") {
            config.timeout = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<usize>("PARLEY_CONCURRENCY") {
            config.concurrency = v;
        }
        match env_parse::<u32>("PARLEY_MAX_INTERNAL_MESSAGES") {
            Some(v) => config.max_internal_messages = v,
            None => warn!(
                default = DEFAULT_MAX_INTERNAL_MESSAGES,
                "PARLEY_MAX_INTERNAL_MESSAGES not set, using default internal message budget"
            ),
        }
        config
    }

    /// Builder-style concurrency override.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Builder-style turn budget override.
    #[must_use]
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Builder-style wall-clock budget override.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
