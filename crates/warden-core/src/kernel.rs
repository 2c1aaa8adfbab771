//! The WARDEN kernel: the deterministic action-governance pipeline.
//!
//! The kernel enforces the governance model on every intercepted request:
//!
//!   Trace → Scope → Policy → Constraints → Argument guard → Execute → Audit
//!
//! The security invariant is absolute: `ToolHandler::invoke()` is NEVER
//! reached unless every gate has passed. This is enforced structurally:
//! `run` only accepts an `Admission`, and only `admit` can build one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use warden_contracts::{
    action::{ActionRequest, TraceId},
    audit::{TerminalOutcome, ViolationKind},
    capability::ScopeMatch,
    constraint::{ConstraintAction, GraphKind},
    error::{WardenError, WardenResult},
    execution::{BlockCode, ExecutionResult},
    policy::{PermissionLevel, PolicyVerdict},
};

use crate::{
    engine::ExecutionEngine,
    path::resolve_path,
    quota::QuotaHold,
    state::RequestState,
    traits::{CapabilityMapper, ConstraintChecker, ConstraintDecision, FlightLog, PolicyEvaluator},
    validator::ArgumentValidator,
};

/// What happens when the flight log cannot persist an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditFailureMode {
    /// An action that cannot be audited does not happen.
    #[default]
    FailClosed,
    /// Proceed, logging the lost event on the `warden::audit_fallback`
    /// tracing target.
    FailOpen,
}

/// Kernel settings, usually read from the `[kernel]` table of the WARDEN
/// configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub shadow_mode: bool,
    pub execution_timeout_ms: u64,
    pub audit_failure_mode: AuditFailureMode,
    /// Include the built-in destructive-command patterns.
    pub default_patterns: bool,
    /// Case-insensitive literals rejected anywhere in a request.
    pub blocked_literals: Vec<String>,
    /// Regular expressions rejected anywhere in a request.
    pub blocked_patterns: Vec<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            shadow_mode: false,
            execution_timeout_ms: 30_000,
            audit_failure_mode: AuditFailureMode::FailClosed,
            default_patterns: true,
            blocked_literals: Vec::new(),
            blocked_patterns: Vec::new(),
        }
    }
}

impl KernelConfig {
    /// Build the argument validator this configuration describes.
    pub fn validator(&self) -> warden_contracts::error::WardenResult<ArgumentValidator> {
        if self.default_patterns {
            ArgumentValidator::with_defaults(&self.blocked_literals, &self.blocked_patterns)
        } else {
            ArgumentValidator::new(&self.blocked_literals, &self.blocked_patterns)
        }
    }
}

/// Where flight log writes run.
#[derive(Debug, Clone, Copy)]
enum AuditIo {
    /// On the calling thread.
    Inline,
    /// On Tokio's blocking pool.
    Offload,
}

/// Proof that a request passed every gate.
struct Admission {
    state: RequestState,
    verdict: PolicyVerdict,
    holds: Vec<QuotaHold>,
}

/// Why a request stopped before execution. Detail stays in the audit log.
struct Rejection {
    state: RequestState,
    kind: ViolationKind,
    code: BlockCode,
    reason: String,
    matched_rule: Option<String>,
    graph: Option<GraphKind>,
}

impl Rejection {
    fn new(state: RequestState, kind: ViolationKind, code: BlockCode, reason: String) -> Self {
        Self { state, kind, code, reason, matched_rule: None, graph: None }
    }
}

/// The central interceptor between agents and their tools.
///
/// Construct one kernel for the process and share it by `Arc`; both entry
/// points are safe to call concurrently.
pub struct AgentKernel {
    mapper: Arc<dyn CapabilityMapper>,
    policy: Arc<dyn PolicyEvaluator>,
    constraints: Arc<dyn ConstraintChecker>,
    recorder: Arc<dyn FlightLog>,
    engine: ExecutionEngine,
    validator: ArgumentValidator,
    shadow_mode: AtomicBool,
    audit_failure_mode: AuditFailureMode,
}

impl AgentKernel {
    /// Create a kernel with the given trusted components.
    ///
    /// Starts with a permissive argument validator, Shadow Mode off, and
    /// fail-closed auditing.
    pub fn new(
        mapper: Arc<dyn CapabilityMapper>,
        policy: Arc<dyn PolicyEvaluator>,
        constraints: Arc<dyn ConstraintChecker>,
        recorder: Arc<dyn FlightLog>,
        engine: ExecutionEngine,
    ) -> Self {
        Self {
            mapper,
            policy,
            constraints,
            recorder,
            engine,
            validator: ArgumentValidator::permissive(),
            shadow_mode: AtomicBool::new(false),
            audit_failure_mode: AuditFailureMode::FailClosed,
        }
    }

    pub fn with_validator(mut self, validator: ArgumentValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_shadow_mode(self, enabled: bool) -> Self {
        self.shadow_mode.store(enabled, Ordering::SeqCst);
        self
    }

    pub fn with_audit_failure_mode(mut self, mode: AuditFailureMode) -> Self {
        self.audit_failure_mode = mode;
        self
    }

    /// Toggle Shadow Mode at runtime.
    pub fn set_shadow_mode(&self, enabled: bool) {
        info!(enabled, "shadow mode changed");
        self.shadow_mode.store(enabled, Ordering::SeqCst);
    }

    pub fn shadow_mode(&self) -> bool {
        self.shadow_mode.load(Ordering::SeqCst)
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Blocking entry point. Same semantics as `intercept_async`.
    ///
    /// Drives the pipeline on a private current-thread runtime. When called
    /// from inside a Tokio runtime the pipeline runs on a scoped helper
    /// thread so the caller's runtime is never nested. Audit writes happen
    /// inline on the calling thread.
    pub fn intercept(&self, request: ActionRequest) -> ExecutionResult {
        let run = move || match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(self.pipeline(request, AuditIo::Inline)),
            Err(e) => self.fail_without_runtime(&request, &e.to_string()),
        };

        if tokio::runtime::Handle::try_current().is_ok() {
            std::thread::scope(|scope| match scope.spawn(run).join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
        } else {
            run()
        }
    }

    /// Non-blocking entry point.
    ///
    /// Flight log writes are durable (fsync) and therefore blocking; they run
    /// on Tokio's blocking pool so the calling worker keeps serving other
    /// tasks while a write is in flight.
    ///
    /// # Pipeline
    ///
    /// 1. Open the trace in the flight log
    /// 2. Capability check: unknown tools or ill-shaped arguments are out of scope
    /// 3. Policy evaluation (RBAC + ABAC) and granted level vs. declared access
    /// 4. Constraint graphs (data, policy, temporal, quotas)
    /// 5. Argument guard
    /// 6. Any failure → seal the trace as a violation, return `Blocked` (mute)
    /// 7. Otherwise execute (or simulate in Shadow Mode) and seal the outcome
    pub async fn intercept_async(&self, request: ActionRequest) -> ExecutionResult {
        self.pipeline(request, AuditIo::Offload).await
    }

    async fn pipeline(&self, request: ActionRequest, io: AuditIo) -> ExecutionResult {
        debug!(
            agent_id = %request.agent_id,
            tool = %request.tool_name,
            "intercepting action"
        );

        // ── Step 1: Open the trace ───────────────────────────────────────────
        let opened = {
            let request = request.clone();
            self.persist(io, move |log| log.start_trace(&request)).await
        };
        let trace_id = match opened {
            Ok(trace_id) => trace_id,
            Err(e) => match self.audit_failure_mode {
                AuditFailureMode::FailClosed => {
                    error!(
                        agent_id = %request.agent_id,
                        tool = %request.tool_name,
                        error = %e,
                        "cannot open audit trace; blocking action"
                    );
                    return ExecutionResult::blocked(TraceId::new(), BlockCode::AuditUnavailable);
                }
                AuditFailureMode::FailOpen => {
                    let trace_id = TraceId::new();
                    error!(
                        target: "warden::audit_fallback",
                        trace_id = %trace_id,
                        agent_id = %request.agent_id,
                        tool = %request.tool_name,
                        args = %request.args_value(),
                        error = %e,
                        "audit trace could not be opened"
                    );
                    trace_id
                }
            },
        };

        // ── Steps 2-5: Gates ─────────────────────────────────────────────────
        match self.admit(&request) {
            Ok(admission) => self.run(request, trace_id, admission, io).await,
            Err(rejection) => self.reject(&request, trace_id, rejection, io).await,
        }
    }

    /// Run one flight log write, inline or on the blocking pool.
    async fn persist<T, F>(&self, io: AuditIo, write: F) -> WardenResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FlightLog) -> WardenResult<T> + Send + 'static,
    {
        match io {
            AuditIo::Inline => write(self.recorder.as_ref()),
            AuditIo::Offload => {
                let recorder = Arc::clone(&self.recorder);
                tokio::task::spawn_blocking(move || write(recorder.as_ref()))
                    .await
                    .unwrap_or_else(|e| {
                        Err(WardenError::AuditWriteFailed {
                            reason: format!("audit writer task failed: {e}"),
                        })
                    })
            }
        }
    }

    /// Run every gate in order. The first failure wins.
    fn admit(&self, request: &ActionRequest) -> Result<Admission, Rejection> {
        let mut state = RequestState::Pending.advance(RequestState::MuteCheck);

        // ── Scope ────────────────────────────────────────────────────────────
        let args = request.args_value();
        let Some(scope) = self.mapper.resolve(&request.tool_name, &args) else {
            return Err(Rejection::new(
                state.advance(RequestState::BlockedOutOfScope),
                ViolationKind::OutOfScope,
                BlockCode::OutOfScope,
                format!("no capability mapping accepts tool '{}'", request.tool_name),
            ));
        };
        state = state
            .advance(RequestState::InScope)
            .advance(RequestState::PolicyCheck);

        // ── Policy ───────────────────────────────────────────────────────────
        let verdict = self
            .policy
            .evaluate(&request.agent_id, &request.tool_name, &request.args)
            .unwrap_or_else(|e| PolicyVerdict::deny(format!("policy evaluation failed: {e}"), None));

        if !verdict.is_allowed() {
            let mut rejection = Rejection::new(
                state.advance(RequestState::BlockedPolicy),
                ViolationKind::PolicyViolation,
                BlockCode::PolicyDenied,
                verdict.reason.clone(),
            );
            rejection.matched_rule = verdict.matched_rule.clone();
            return Err(rejection);
        }

        let granted = verdict.granted.unwrap_or(PermissionLevel::None);
        if granted < scope.access {
            let mut rejection = Rejection::new(
                state.advance(RequestState::BlockedPolicy),
                ViolationKind::PolicyViolation,
                BlockCode::PolicyDenied,
                format!(
                    "role grants '{granted}' on '{}' but the tool requires '{}'",
                    request.tool_name, scope.access
                ),
            );
            rejection.matched_rule = verdict.matched_rule.clone();
            return Err(rejection);
        }
        state = state
            .advance(RequestState::Allowed)
            .advance(RequestState::ConstraintCheck);

        // ── Constraints ──────────────────────────────────────────────────────
        let action = self.constraint_action(request, &scope);
        let holds = match self.constraints.check(&action) {
            ConstraintDecision::Permit { holds } => holds,
            ConstraintDecision::Deny { graph, reason } => {
                let mut rejection = Rejection::new(
                    state.advance(RequestState::BlockedConstraint),
                    ViolationKind::ConstraintViolation,
                    BlockCode::ConstraintDenied,
                    reason,
                );
                rejection.graph = Some(graph);
                return Err(rejection);
            }
        };
        state = state.advance(RequestState::Passed);

        // ── Argument guard ───────────────────────────────────────────────────
        //
        // Returning here drops `holds`, which releases any reserved quota.
        if let Some(reason) = self.validator.scan(request) {
            return Err(Rejection::new(
                state.advance(RequestState::BlockedPolicy),
                ViolationKind::ArgumentRejected,
                BlockCode::ArgumentRejected,
                reason,
            ));
        }

        Ok(Admission { state, verdict, holds })
    }

    fn constraint_action(&self, request: &ActionRequest, scope: &ScopeMatch) -> ConstraintAction {
        let (resource, resource_missing) = match &scope.resource_arg {
            None => (None, false),
            Some(path) => {
                let args = Value::Object(request.args.clone());
                match resolve_path(&args, path) {
                    Some(Value::String(s)) if !s.is_empty() => (Some(s.clone()), false),
                    Some(Value::Number(n)) => (Some(n.to_string()), false),
                    _ => (None, true),
                }
            }
        };
        ConstraintAction {
            agent_id: request.agent_id.clone(),
            tool_name: request.tool_name.clone(),
            access: scope.access,
            args: request.args.clone(),
            context: self.policy.agent_context(&request.agent_id),
            resource,
            resource_missing,
        }
    }

    /// Seal a blocked trace and hand back the mute signal.
    async fn reject(
        &self,
        request: &ActionRequest,
        trace_id: TraceId,
        rejection: Rejection,
        io: AuditIo,
    ) -> ExecutionResult {
        warn!(
            trace_id = %trace_id,
            agent_id = %request.agent_id,
            tool = %request.tool_name,
            state = rejection.state.as_str(),
            reason = %rejection.reason,
            "action blocked"
        );

        let mut outcome = TerminalOutcome::violation(rejection.kind, rejection.reason)
            .with_meta("final_state", rejection.state.as_str());
        if let Some(rule) = rejection.matched_rule {
            outcome = outcome.with_meta("matched_rule", rule);
        }
        if let Some(graph) = rejection.graph {
            outcome = outcome.with_meta("graph", graph.to_string());
        }
        self.seal(&trace_id, outcome, io).await;

        ExecutionResult::blocked(trace_id, rejection.code)
    }

    /// Execute (or simulate) an admitted request and seal its outcome.
    async fn run(
        &self,
        request: ActionRequest,
        trace_id: TraceId,
        admission: Admission,
        io: AuditIo,
    ) -> ExecutionResult {
        let Admission { state, verdict, holds } = admission;
        let state = state.advance(RequestState::ExecuteOrSimulate);
        let started = Instant::now();

        // ── Shadow Mode ──────────────────────────────────────────────────────
        if self.shadow_mode() {
            let data = self.engine.simulate(&request);
            // Simulated actions consume no quota.
            drop(holds);
            let outcome = with_rule(
                TerminalOutcome::shadow(data.clone(), elapsed_ms(started)),
                &verdict,
            )
            .with_meta("final_state", state.advance(RequestState::Succeeded).as_str());

            info!(trace_id = %trace_id, tool = %request.tool_name, "action simulated");
            if !self.seal(&trace_id, outcome, io).await {
                return ExecutionResult::blocked(trace_id, BlockCode::AuditUnavailable);
            }
            return ExecutionResult::simulated(trace_id, data);
        }

        // ── Execution ────────────────────────────────────────────────────────
        match self.engine.execute(&request.tool_name, &request.args).await {
            Ok(data) => {
                let outcome = with_rule(
                    TerminalOutcome::success(data.clone(), elapsed_ms(started)),
                    &verdict,
                )
                .with_meta("final_state", state.advance(RequestState::Succeeded).as_str());

                if self.seal(&trace_id, outcome, io).await {
                    holds.into_iter().for_each(QuotaHold::commit);
                    info!(trace_id = %trace_id, tool = %request.tool_name, "action executed");
                    ExecutionResult::allowed(trace_id, data)
                } else {
                    // The side effect cannot be audited, so it must not stand.
                    self.engine.roll_back(&request.tool_name, &request.args).await;
                    ExecutionResult::error(trace_id, "action rolled back: audit unavailable")
                }
            }
            Err(e) => {
                drop(holds);
                let outcome = with_rule(TerminalOutcome::error(e.to_string(), elapsed_ms(started)), &verdict)
                    .with_meta("final_state", state.advance(RequestState::Error).as_str());
                self.seal(&trace_id, outcome, io).await;
                ExecutionResult::error(trace_id, sanitize(&e))
            }
        }
    }

    /// Write the terminal event. Returns false only when the write failed in
    /// fail-closed mode.
    async fn seal(&self, trace_id: &TraceId, outcome: TerminalOutcome, io: AuditIo) -> bool {
        let written = {
            let trace_id = trace_id.clone();
            let outcome = outcome.clone();
            self.persist(io, move |log| log.finish_trace(&trace_id, outcome)).await
        };
        self.settle(trace_id, &outcome, written)
    }

    fn settle(&self, trace_id: &TraceId, outcome: &TerminalOutcome, written: WardenResult<()>) -> bool {
        let Err(e) = written else {
            return true;
        };
        match self.audit_failure_mode {
            AuditFailureMode::FailClosed => {
                error!(trace_id = %trace_id, error = %e, "terminal audit write failed");
                false
            }
            AuditFailureMode::FailOpen => {
                error!(
                    target: "warden::audit_fallback",
                    trace_id = %trace_id,
                    verdict = %outcome.verdict,
                    reason = ?outcome.violation_reason,
                    error = %e,
                    "terminal audit write failed"
                );
                true
            }
        }
    }

    /// Last resort when no runtime can be built: record the failure and
    /// report an error without running anything.
    fn fail_without_runtime(&self, request: &ActionRequest, detail: &str) -> ExecutionResult {
        error!(tool = %request.tool_name, error = %detail, "failed to build runtime for blocking intercept");
        match self.recorder.start_trace(request) {
            Ok(trace_id) => {
                let outcome = TerminalOutcome::error(format!("runtime unavailable: {detail}"), 0)
                    .with_meta("final_state", RequestState::Error.as_str());
                let written = self.recorder.finish_trace(&trace_id, outcome.clone());
                self.settle(&trace_id, &outcome, written);
                ExecutionResult::error(trace_id, "kernel unavailable")
            }
            Err(_) => ExecutionResult::blocked(TraceId::new(), BlockCode::AuditUnavailable),
        }
    }
}

fn with_rule(outcome: TerminalOutcome, verdict: &PolicyVerdict) -> TerminalOutcome {
    match &verdict.matched_rule {
        Some(rule) => outcome.with_meta("matched_rule", rule.clone()),
        None => outcome,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Caller-safe description of an execution failure.
fn sanitize(error: &WardenError) -> &'static str {
    match error {
        WardenError::ExecutionTimeout { .. } => "tool execution timed out",
        _ => "tool execution failed",
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
