//! Capability declarations for governed tools.
//!
//! A capability is the kernel's closed-world description of a tool: what
//! access it needs, what its arguments look like, and which argument names
//! the data resource it touches. A tool with no capability is out of scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::policy::PermissionLevel;

/// Declared shape of one governed tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub tool_name: String,
    /// Minimum permission level a role must hold to invoke the tool.
    #[serde(default = "default_access")]
    pub access: PermissionLevel,
    /// JSON Schema the request arguments must satisfy. `null` accepts any
    /// object.
    #[serde(default)]
    pub argument_schema: Value,
    /// Argument path naming the data resource the tool touches, if any.
    #[serde(default)]
    pub resource_arg: Option<String>,
    #[serde(default)]
    pub description: String,
}

fn default_access() -> PermissionLevel {
    PermissionLevel::ReadOnly
}

impl Capability {
    /// A capability with no argument schema and no resource binding.
    pub fn new(tool_name: impl Into<String>, access: PermissionLevel) -> Self {
        Self {
            tool_name: tool_name.into(),
            access,
            argument_schema: Value::Null,
            resource_arg: None,
            description: String::new(),
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.argument_schema = schema;
        self
    }

    pub fn with_resource_arg(mut self, path: impl Into<String>) -> Self {
        self.resource_arg = Some(path.into());
        self
    }

    /// The part of the capability later pipeline stages need.
    pub fn scope(&self) -> ScopeMatch {
        ScopeMatch {
            tool_name: self.tool_name.clone(),
            access: self.access,
            resource_arg: self.resource_arg.clone(),
        }
    }
}

/// What the capability mapper hands on for an in-scope request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeMatch {
    pub tool_name: String,
    pub access: PermissionLevel,
    pub resource_arg: Option<String>,
}
