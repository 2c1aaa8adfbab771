//! Permission, condition, and verdict types.
//!
//! The policy engine consumes these value objects and produces a
//! `PolicyVerdict`. WARDEN is deny-by-default: any outcome other than
//! `Verdict::Allowed` keeps the tool from running.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Access level a role holds on a tool, or a tool requires of its caller.
///
/// Levels are ordered: `None < ReadOnly < ReadWrite < Admin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    #[default]
    None,
    ReadOnly,
    ReadWrite,
    Admin,
}

impl PermissionLevel {
    /// True for levels that allow state-changing actions.
    pub fn is_write(self) -> bool {
        self >= PermissionLevel::ReadWrite
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PermissionLevel::None => "none",
            PermissionLevel::ReadOnly => "read_only",
            PermissionLevel::ReadWrite => "read_write",
            PermissionLevel::Admin => "admin",
        };
        f.write_str(s)
    }
}

/// Comparison operator of a single attribute condition.
///
/// Expressed in TOML as snake_case strings: `op = "lte"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    Contains,
}

/// One attribute test, e.g. `args.amount lte 1000`.
///
/// `path` is dot notation into the merged view `{args, context}`; numeric
/// segments index into lists (`args.items.0.sku`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub path: String,
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn new(path: impl Into<String>, op: Operator, value: Value) -> Self {
        Self { path: path.into(), op, value }
    }
}

/// Attribute-based refinement of a role's base permission on a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalPermission {
    pub tool: String,
    pub conditions: Vec<Condition>,
    /// AND across `conditions` when true, OR when false.
    #[serde(default = "default_require_all")]
    pub require_all: bool,
}

fn default_require_all() -> bool {
    true
}

impl ConditionalPermission {
    /// An AND-combined conditional permission.
    pub fn all(tool: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self { tool: tool.into(), conditions, require_all: true }
    }

    /// An OR-combined conditional permission.
    pub fn any(tool: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self { tool: tool.into(), conditions, require_all: false }
    }
}

/// How several conditional permissions registered for the same
/// (role, tool) pair combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionPrecedence {
    /// At least one entry must hold.
    #[default]
    AnyEntry,
    /// Every entry must hold (most restrictive wins).
    AllEntries,
}

/// Terminal classification of a governed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Allowed,
    Blocked,
    Shadow,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Allowed => "allowed",
            Verdict::Blocked => "blocked",
            Verdict::Shadow => "shadow",
            Verdict::Error => "error",
        };
        f.write_str(s)
    }
}

/// The decision emitted by the policy engine for one request.
///
/// `reason` and `matched_rule` are for the audit log only; the kernel never
/// returns them to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub outcome: Verdict,
    pub reason: String,
    pub matched_rule: Option<String>,
    /// The base permission level the role holds, when one exists.
    pub granted: Option<PermissionLevel>,
}

impl PolicyVerdict {
    pub fn allow(
        reason: impl Into<String>,
        matched_rule: Option<String>,
        granted: PermissionLevel,
    ) -> Self {
        Self {
            outcome: Verdict::Allowed,
            reason: reason.into(),
            matched_rule,
            granted: Some(granted),
        }
    }

    pub fn deny(reason: impl Into<String>, matched_rule: Option<String>) -> Self {
        Self {
            outcome: Verdict::Blocked,
            reason: reason.into(),
            matched_rule,
            granted: None,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome == Verdict::Allowed
    }
}
