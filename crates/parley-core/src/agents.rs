//! Agent graph — the static role/handoff topology a session runs over.
//!
//! Nodes are [`AgentDefinition`]s (role name, prompt template, allowed tools,
//! permitted handoff targets); edges are the handoff entries. The simulated
//! counterparty is the reserved [`CLIENT_ROLE`] node held in the same graph,
//! which keeps one validation and rendering path for both sides. The graph
//! carries no control logic — the runtime walks it.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::scenario::VariableMap;

/// Reserved role name for the simulated counterparty.
pub const CLIENT_ROLE: &str = "client";

/// Placeholder syntax: `{{variable}}`.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").expect("valid placeholder regex"));

/// Errors raised while validating or rendering an agent graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The configured entry role does not exist in the graph.
    #[error("entry agent '{0}' is not defined in the graph")]
    UnknownEntryAgent(String),

    /// The graph is missing the reserved client role.
    #[error("graph has no '{CLIENT_ROLE}' role")]
    MissingClientRole,

    /// A handoff edge points at a role that does not exist.
    #[error("agent '{agent}' declares handoff to unknown target '{target}'")]
    UnknownHandoffTarget {
        /// Agent declaring the edge.
        agent: String,
        /// Missing target role.
        target: String,
    },

    /// A prompt template references a variable absent from the scenario.
    #[error("prompt for agent '{agent}' references missing variable '{variable}'")]
    MissingVariable {
        /// Agent whose prompt failed to render.
        agent: String,
        /// Unresolved placeholder name.
        variable: String,
    },
}

/// One agent role: prompt template, allowed tools, permitted handoffs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Role name, unique within the graph.
    pub name: String,
    /// Prompt template with `{{variable}}` placeholders.
    pub prompt: String,
    /// Tool names this agent may call.
    #[serde(default)]
    pub tools: BTreeSet<String>,
    /// Permitted handoff targets, mapped to the textual condition under
    /// which the handoff should happen.
    #[serde(default)]
    pub handoffs: BTreeMap<String, String>,
}

impl AgentDefinition {
    /// Create a role with an empty tool set and no handoffs.
    #[must_use]
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            tools: BTreeSet::new(),
            handoffs: BTreeMap::new(),
        }
    }

    /// Builder-style tool grant.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        let _ = self.tools.insert(tool.into());
        self
    }

    /// Builder-style handoff edge.
    #[must_use]
    pub fn with_handoff(mut self, target: impl Into<String>, condition: impl Into<String>) -> Self {
        let _ = self.handoffs.insert(target.into(), condition.into());
        self
    }
}

/// The full role topology for a session. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentGraph {
    /// All roles, including the reserved client role.
    pub agents: BTreeMap<String, AgentDefinition>,
    /// Role that receives the first client message.
    pub entry: String,
}

impl AgentGraph {
    /// Build a graph from role definitions, validating its topology.
    ///
    /// Requires the entry role and the client role to exist and every
    /// handoff edge to resolve to a defined role.
    pub fn new(
        agents: impl IntoIterator<Item = AgentDefinition>,
        entry: impl Into<String>,
    ) -> Result<Self, GraphError> {
        let agents: BTreeMap<String, AgentDefinition> =
            agents.into_iter().map(|a| (a.name.clone(), a)).collect();
        let entry = entry.into();

        if !agents.contains_key(&entry) {
            return Err(GraphError::UnknownEntryAgent(entry));
        }
        if !agents.contains_key(CLIENT_ROLE) {
            return Err(GraphError::MissingClientRole);
        }
        for agent in agents.values() {
            for target in agent.handoffs.keys() {
                if !agents.contains_key(target) {
                    return Err(GraphError::UnknownHandoffTarget {
                        agent: agent.name.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        Ok(Self { agents, entry })
    }

    /// Look up a role by name.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&AgentDefinition> {
        self.agents.get(name)
    }

    /// Render every prompt against the scenario's variables.
    pub fn render(&self, variables: &VariableMap) -> Result<RenderedGraph, GraphError> {
        let mut rendered = BTreeMap::new();
        for (name, def) in &self.agents {
            let prompt = render_prompt(&def.prompt, variables).map_err(|variable| {
                GraphError::MissingVariable {
                    agent: name.clone(),
                    variable,
                }
            })?;
            let _ = rendered.insert(
                name.clone(),
                RenderedAgent {
                    name: name.clone(),
                    prompt,
                    tools: def.tools.clone(),
                    handoffs: def.handoffs.clone(),
                },
            );
        }
        Ok(RenderedGraph {
            agents: rendered,
            entry: self.entry.clone(),
        })
    }
}

/// An agent role with its prompt fully rendered. Immutable for the life of
/// a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedAgent {
    /// Role name.
    pub name: String,
    /// Rendered prompt text.
    pub prompt: String,
    /// Tool names this agent may call.
    pub tools: BTreeSet<String>,
    /// Permitted handoff targets with condition text.
    pub handoffs: BTreeMap<String, String>,
}

/// A fully rendered agent graph, ready to drive one session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderedGraph {
    /// Rendered roles keyed by name.
    pub agents: BTreeMap<String, RenderedAgent>,
    /// Role that receives the first client message.
    pub entry: String,
}

impl RenderedGraph {
    /// Look up a rendered role by name.
    #[must_use]
    pub fn agent(&self, name: &str) -> Option<&RenderedAgent> {
        self.agents.get(name)
    }

    /// The rendered client role.
    ///
    /// Guaranteed present: [`AgentGraph::new`] rejects graphs without it.
    #[must_use]
    pub fn client(&self) -> &RenderedAgent {
        &self.agents[CLIENT_ROLE]
    }
}

/// Substitute `{{variable}}` placeholders from the variable map.
///
/// String values substitute verbatim; other JSON values substitute their
/// compact JSON encoding. Returns the missing variable name on failure.
fn render_prompt(template: &str, variables: &VariableMap) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0).expect("capture 0 always present");
        let name = &caps[1];
        let value = variables.get(name).ok_or_else(|| name.to_owned())?;
        out.push_str(&template[last..whole.start()]);
        match value {
            Value::String(s) => out.push_str(s),
            other => out.push_str(&other.to_string()),
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
