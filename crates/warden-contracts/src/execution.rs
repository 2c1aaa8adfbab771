//! What the kernel hands back to the caller after every intercept.
//!
//! Callers pattern-match on `Outcome`:
//! - `Allowed` → the tool ran (or was simulated) and produced `data`
//! - `Blocked` → nothing ran; `code` is deliberately coarse
//! - `Error`   → the tool ran and failed; `detail` is sanitized

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::action::TraceId;

/// Coarse reason a request was blocked.
///
/// Never names the rule or condition that fired. Operators read the full
/// reason from the flight recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockCode {
    OutOfScope,
    PolicyDenied,
    ConstraintDenied,
    ArgumentRejected,
    AuditUnavailable,
}

impl fmt::Display for BlockCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockCode::OutOfScope => "out_of_scope",
            BlockCode::PolicyDenied => "policy_denied",
            BlockCode::ConstraintDenied => "constraint_denied",
            BlockCode::ArgumentRejected => "argument_rejected",
            BlockCode::AuditUnavailable => "audit_unavailable",
        };
        f.write_str(s)
    }
}

/// Typed outcome of one intercepted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Allowed {
        data: Value,
        /// True when Shadow Mode produced `data` without running the tool.
        simulated: bool,
    },
    Blocked {
        code: BlockCode,
    },
    Error {
        detail: String,
    },
}

/// Flat status view of an `Outcome`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Allowed,
    Blocked,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub trace_id: TraceId,
    pub outcome: Outcome,
    /// Set on blocked results: the caller gets a signal, not an explanation.
    pub mute: bool,
}

impl ExecutionResult {
    pub fn allowed(trace_id: TraceId, data: Value) -> Self {
        Self {
            trace_id,
            outcome: Outcome::Allowed { data, simulated: false },
            mute: false,
        }
    }

    pub fn simulated(trace_id: TraceId, data: Value) -> Self {
        Self {
            trace_id,
            outcome: Outcome::Allowed { data, simulated: true },
            mute: false,
        }
    }

    pub fn blocked(trace_id: TraceId, code: BlockCode) -> Self {
        Self {
            trace_id,
            outcome: Outcome::Blocked { code },
            mute: true,
        }
    }

    pub fn error(trace_id: TraceId, detail: impl Into<String>) -> Self {
        Self {
            trace_id,
            outcome: Outcome::Error { detail: detail.into() },
            mute: false,
        }
    }

    pub fn status(&self) -> Status {
        match self.outcome {
            Outcome::Allowed { .. } => Status::Allowed,
            Outcome::Blocked { .. } => Status::Blocked,
            Outcome::Error { .. } => Status::Error,
        }
    }

    /// The produced data, `None` for blocked and failed results.
    pub fn data(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Allowed { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn block_code(&self) -> Option<BlockCode> {
        match self.outcome {
            Outcome::Blocked { code } => Some(code),
            _ => None,
        }
    }
}
