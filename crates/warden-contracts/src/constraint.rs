//! Types shared between the kernel and the constraint graphs.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{agent::AgentId, policy::PermissionLevel};

/// Which of the three constraint graphs produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphKind {
    Data,
    Policy,
    Temporal,
}

impl fmt::Display for GraphKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GraphKind::Data => "data",
            GraphKind::Policy => "policy",
            GraphKind::Temporal => "temporal",
        };
        f.write_str(s)
    }
}

/// Chooses which actions a rule, quota, or time window applies to.
///
/// An empty `tools` list (or one containing `"*"`) selects every tool.
/// With `writes_only`, only tools whose declared access is `read_write` or
/// above are selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSelector {
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub writes_only: bool,
}

impl ActionSelector {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn tools<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tools: tools.into_iter().map(Into::into).collect(),
            writes_only: false,
        }
    }

    pub fn writes() -> Self {
        Self { tools: Vec::new(), writes_only: true }
    }

    pub fn matches(&self, tool_name: &str, access: PermissionLevel) -> bool {
        let tool_matches = self.tools.is_empty()
            || self.tools.iter().any(|t| t == "*" || t == tool_name);
        tool_matches && (!self.writes_only || access.is_write())
    }
}

/// Everything the constraint graphs need to judge one action.
///
/// Built by the kernel after the policy check. `resource` is the value found
/// at the capability's `resource_arg`; it is `None` when the tool declares no
/// resource or when the declared argument is absent, the latter also setting
/// `resource_missing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintAction {
    pub agent_id: AgentId,
    pub tool_name: String,
    pub access: PermissionLevel,
    pub args: Map<String, Value>,
    pub context: Map<String, Value>,
    pub resource: Option<String>,
    /// The tool declares a resource argument but the request did not carry
    /// a usable value for it.
    pub resource_missing: bool,
}
