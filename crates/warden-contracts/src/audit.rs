//! Audit record, query, and statistics types.
//!
//! One `AuditRecord` exists per intercepted request. It is opened by
//! `start_trace` and sealed by exactly one terminal write; after that it is
//! never modified.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{action::TraceId, agent::AgentId, policy::Verdict};

/// Why a request did not run to a successful completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// No capability mapping for the tool or arguments outside its shape.
    OutOfScope,
    /// Denied by a role or conditional permission.
    PolicyViolation,
    /// Denied by the data, policy, or temporal graph.
    ConstraintViolation,
    /// A disallowed pattern appeared in the arguments or prompt.
    ArgumentRejected,
    /// The tool failed or timed out.
    ExecutionError,
    /// The audit store could not persist an event.
    AuditWriteFailure,
}

/// The materialized audit view of one action attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub trace_id: TraceId,
    /// When the trace was started.
    pub timestamp: DateTime<Utc>,
    pub agent_id: AgentId,
    pub tool_name: String,
    pub tool_args: Value,
    pub input_prompt: Option<String>,
    /// `None` while the trace is still in flight.
    pub policy_verdict: Option<Verdict>,
    pub violation_kind: Option<ViolationKind>,
    pub violation_reason: Option<String>,
    pub result: Option<Value>,
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    pub fn is_terminal(&self) -> bool {
        self.policy_verdict.is_some()
    }
}

/// The terminal write that seals a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalOutcome {
    pub verdict: Verdict,
    pub violation_kind: Option<ViolationKind>,
    pub violation_reason: Option<String>,
    pub result: Option<Value>,
    pub execution_time_ms: Option<u64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl TerminalOutcome {
    pub fn violation(kind: ViolationKind, reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Blocked,
            violation_kind: Some(kind),
            violation_reason: Some(reason.into()),
            result: None,
            execution_time_ms: None,
            metadata: Map::new(),
        }
    }

    pub fn success(result: Value, execution_time_ms: u64) -> Self {
        Self {
            verdict: Verdict::Allowed,
            violation_kind: None,
            violation_reason: None,
            result: Some(result),
            execution_time_ms: Some(execution_time_ms),
            metadata: Map::new(),
        }
    }

    pub fn shadow(result: Value, execution_time_ms: u64) -> Self {
        Self {
            verdict: Verdict::Shadow,
            ..Self::success(result, execution_time_ms)
        }
    }

    pub fn error(detail: impl Into<String>, execution_time_ms: u64) -> Self {
        Self {
            verdict: Verdict::Error,
            violation_kind: Some(ViolationKind::ExecutionError),
            violation_reason: Some(detail.into()),
            result: None,
            execution_time_ms: Some(execution_time_ms),
            metadata: Map::new(),
        }
    }

    /// Attach one metadata entry.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Filter for `query_logs`. Results come back most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQuery {
    pub agent_id: Option<AgentId>,
    pub verdict: Option<Verdict>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: usize,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            agent_id: None,
            verdict: None,
            since: None,
            until: None,
            limit: 100,
        }
    }
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn verdict(mut self, verdict: Verdict) -> Self {
        self.verdict = Some(verdict);
        self
    }

    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// True if `record` passes every filter set on this query.
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(agent) = &self.agent_id {
            if &record.agent_id != agent {
                return false;
            }
        }
        if let Some(verdict) = self.verdict {
            if record.policy_verdict != Some(verdict) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Aggregate counts over every record in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total: u64,
    /// Traces started but not yet sealed.
    pub pending: u64,
    pub by_verdict: BTreeMap<Verdict, u64>,
    pub by_agent: BTreeMap<String, u64>,
    pub by_tool: BTreeMap<String, u64>,
}
