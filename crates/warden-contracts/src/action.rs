//! The request envelope every upstream adapter hands to the kernel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::AgentId;

/// Unique identifier correlating one action's full audit lifecycle.
///
/// Generated by the flight recorder when a trace starts. Every intercepted
/// request gets exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(pub uuid::Uuid);

impl TraceId {
    /// Create a new, unique trace id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A proposed tool invocation.
///
/// Translating a provider-specific tool call into this shape is the
/// adapter's job. `args` is always a JSON object; nested maps and lists are
/// reachable from conditions through dot-notation paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRequest {
    pub agent_id: AgentId,
    pub tool_name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    /// Free text that led to this action. Scanned by the argument validator
    /// and stored in the audit record, never interpreted.
    #[serde(default)]
    pub input_prompt: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl ActionRequest {
    /// Build a request timestamped now.
    ///
    /// Non-object `args` values are wrapped as `{"value": args}` so the
    /// envelope shape stays fixed.
    pub fn new(agent_id: impl Into<AgentId>, tool_name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            agent_id: agent_id.into(),
            tool_name: tool_name.into(),
            args,
            input_prompt: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.input_prompt = Some(prompt.into());
        self
    }

    /// The arguments as a JSON value, for schema checks and audit storage.
    pub fn args_value(&self) -> Value {
        Value::Object(self.args.clone())
    }
}
