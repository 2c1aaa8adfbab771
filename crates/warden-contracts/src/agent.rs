//! Agent identity and registration types.
//!
//! WARDEN never looks inside an agent. It only knows who the agent is, which
//! role it acts under, and the context attributes an operator attached to it.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable, human-readable identifier for a registered agent.
///
/// Used across policy lookups, audit records, and supervisor baselines.
/// Example: AgentId("finance-agent")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    /// Construct an agent id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A registered agent as the policy engine sees it.
///
/// `context` holds operator-controlled attributes (e.g. `customer_verified`,
/// `department`). The agent's own requests can never write to it; only the
/// administrative API on the policy engine mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    /// The role whose permissions apply to this agent.
    pub role: String,
    /// Attribute map exposed to conditions under the `context.` root.
    #[serde(default)]
    pub context: Map<String, Value>,
    /// Inactive agents are denied every action.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl AgentProfile {
    /// A fresh, active profile with an empty context.
    pub fn new(id: impl Into<AgentId>, role: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            context: Map::new(),
            active: true,
        }
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
