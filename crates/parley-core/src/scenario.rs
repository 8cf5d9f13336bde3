//! Scenario definitions — the immutable input to one simulated dialogue.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Variable bag consumed by prompt rendering.
///
/// Produced upstream (scenario files, enrichment hooks) as a typed map;
/// the orchestrator core only reads it.
pub type VariableMap = BTreeMap<String, Value>;

/// One dialogue scenario. Immutable once submitted to a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name, unique within a batch by convention.
    pub name: String,
    /// Variables substituted into every agent prompt.
    #[serde(default)]
    pub variables: VariableMap,
    /// Optional completion seed for deterministic replays.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Per-scenario override of the configured turn budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    /// Per-scenario override of the configured wall-clock budget.
    #[serde(skip_serializing_if = "Option::is_none", with = "opt_duration_secs", default)]
    pub timeout: Option<Duration>,
}

impl Scenario {
    /// Create a scenario with the given name and no variables.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: VariableMap::new(),
            seed: None,
            max_turns: None,
            timeout: None,
        }
    }

    /// Builder-style variable insertion.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.variables.insert(key.into(), value.into());
        self
    }

    /// Builder-style seed assignment.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Serialize `Option<Duration>` as whole seconds, matching the stored
/// `timeout_sec` field shape.
mod opt_duration_secs {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs: Option<u64> = Option::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
