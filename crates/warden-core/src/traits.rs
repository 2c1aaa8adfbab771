//! Core trait definitions for the WARDEN governance pipeline.
//!
//! These traits define the complete trust boundary:
//!
//! - `CapabilityMapper`: closed-world scope gate (is this a known tool?)
//! - `PolicyEvaluator`: RBAC + ABAC gate
//! - `ConstraintChecker`: contextual gate over data, corporate rules and time
//! - `FlightLog`: trusted sink that records every decision
//! - `ToolHandler`: untrusted side effect, only reached after all gates
//!
//! The kernel wires them together in the correct order. A `ToolHandler` is
//! never invoked unless every gate has passed.

use async_trait::async_trait;
use serde_json::{Map, Value};

use warden_contracts::{
    action::{ActionRequest, TraceId},
    agent::AgentId,
    audit::{TerminalOutcome, ViolationKind},
    capability::ScopeMatch,
    constraint::{ConstraintAction, GraphKind},
    error::WardenResult,
    policy::PolicyVerdict,
};

use crate::quota::QuotaHold;

/// Maps a request to a known capability.
///
/// Implementations must answer from a closed registry: anything not
/// registered is out of scope.
pub trait CapabilityMapper: Send + Sync {
    /// Return the matched scope, or `None` when the tool is unknown or the
    /// arguments do not fit its declared shape.
    fn resolve(&self, tool_name: &str, args: &Value) -> Option<ScopeMatch>;

    /// True when `resolve` would return a scope.
    fn map_request(&self, tool_name: &str, args: &Value) -> bool {
        self.resolve(tool_name, args).is_some()
    }
}

/// The role- and attribute-based policy gate.
///
/// Implementations are **trusted**, pure, and deterministic: the same
/// request against the same policy state yields the same verdict. Never
/// perform I/O here.
pub trait PolicyEvaluator: Send + Sync {
    /// Evaluate whether `agent_id` may invoke `tool_name` with `args`.
    fn evaluate(
        &self,
        agent_id: &AgentId,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> WardenResult<PolicyVerdict>;

    /// The operator-controlled context attributes of an agent. Empty for
    /// unknown agents.
    fn agent_context(&self, agent_id: &AgentId) -> Map<String, Value>;
}

/// Outcome of the constraint stage.
#[derive(Debug)]
pub enum ConstraintDecision {
    /// Every graph permits the action. `holds` are quota reservations that
    /// are released on drop unless committed.
    Permit { holds: Vec<QuotaHold> },
    /// One graph denied the action.
    Deny { graph: GraphKind, reason: String },
}

impl ConstraintDecision {
    pub fn is_permit(&self) -> bool {
        matches!(self, ConstraintDecision::Permit { .. })
    }
}

/// The contextual gate combining the data, policy, and temporal graphs.
///
/// Synchronous and non-suspending; evaluates against one consistent
/// snapshot of graph state.
pub trait ConstraintChecker: Send + Sync {
    fn check(&self, action: &ConstraintAction) -> ConstraintDecision;
}

/// The flight log: the immutable decision record.
///
/// Every intercepted request opens exactly one trace and seals it with
/// exactly one terminal write. Writes must be durable before returning.
pub trait FlightLog: Send + Sync {
    /// Open a trace for `request` and return its id.
    fn start_trace(&self, request: &ActionRequest) -> WardenResult<TraceId>;

    /// Seal a trace. A second call for the same trace must fail.
    fn finish_trace(&self, trace_id: &TraceId, outcome: TerminalOutcome) -> WardenResult<()>;

    fn log_violation(
        &self,
        trace_id: &TraceId,
        kind: ViolationKind,
        reason: &str,
    ) -> WardenResult<()> {
        self.finish_trace(trace_id, TerminalOutcome::violation(kind, reason))
    }

    fn log_success(
        &self,
        trace_id: &TraceId,
        result: Value,
        execution_time_ms: u64,
    ) -> WardenResult<()> {
        self.finish_trace(trace_id, TerminalOutcome::success(result, execution_time_ms))
    }

    fn log_shadow(
        &self,
        trace_id: &TraceId,
        result: Value,
        execution_time_ms: u64,
    ) -> WardenResult<()> {
        self.finish_trace(trace_id, TerminalOutcome::shadow(result, execution_time_ms))
    }

    fn log_error(&self, trace_id: &TraceId, detail: &str, execution_time_ms: u64) -> WardenResult<()> {
        self.finish_trace(trace_id, TerminalOutcome::error(detail, execution_time_ms))
    }
}

/// A governed tool.
///
/// Implementations are **untrusted** side effects. The kernel only calls
/// `invoke` after every gate has passed, bounds it with a timeout, and calls
/// `rollback` when the call fails, times out, or cannot be audited.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, args: &Map<String, Value>) -> WardenResult<Value>;

    /// Undo or tear down whatever a failed `invoke` may have left behind.
    async fn rollback(&self, _args: &Map<String, Value>) -> WardenResult<()> {
        Ok(())
    }
}
