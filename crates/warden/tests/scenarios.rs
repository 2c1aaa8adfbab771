//! End-to-end scenarios against a fully assembled WARDEN stack.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};

use warden::{
    ActionRequest, BlockCode, Capability, PermissionLevel, Status, Warden, WardenBuilder, WardenConfig,
};
use warden_audit::FlightRecorder;
use warden_contracts::{
    agent::AgentId,
    audit::{AuditQuery, ViolationKind},
    error::{WardenError, WardenResult},
    policy::Verdict,
};
use warden_core::{clock::FixedClock, traits::ToolHandler};
use warden_supervisor::DeactivateAgent;

// ── Helpers ───────────────────────────────────────────────────────────────────

const CONFIG: &str = r#"
    [kernel]
    execution_timeout_ms = 2000

    [policy.roles.support.permissions]
    lookup_customer = "read_only"
    process_refund = "read_write"

    [[policy.roles.support.conditional]]
    tool = "process_refund"
    conditions = [
        { path = "args.amount", op = "lte", value = 1000 },
        { path = "context.customer_verified", op = "eq", value = true },
    ]

    [policy.roles.agent.permissions]
    read_report = "read_only"
    update_order = "read_write"

    [policy.roles.finance.permissions]
    issue_credit = "read_write"

    [[policy.agents]]
    id = "support-bot"
    role = "support"

    [[policy.agents]]
    id = "ops-bot"
    role = "agent"

    [[policy.agents]]
    id = "finance-a"
    role = "finance"

    [[policy.agents]]
    id = "finance-b"
    role = "finance"

    [[policy.agents]]
    id = "finance-c"
    role = "finance"

    [[constraints.resources]]
    id = "/srv/reports"
    kind = "path"

    [[constraints.quotas]]
    id = "credit-budget"
    tools = ["issue_credit"]
    limit = 10
    units_arg = "units"

    [[constraints.windows]]
    name = "maintenance-freeze"
    start = "02:00"
    end = "04:00"
    effect = "deny"
    writes_only = true
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A tool that counts how often it really ran.
#[derive(Default)]
struct CountingTool {
    calls: AtomicUsize,
}

impl CountingTool {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolHandler for CountingTool {
    async fn invoke(&self, args: &Map<String, Value>) -> WardenResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "ok": true, "echo": Value::Object(args.clone()) }))
    }
}

struct Stack {
    warden: Warden,
    clock: Arc<FixedClock>,
    tools: Vec<(&'static str, Arc<CountingTool>)>,
}

impl Stack {
    fn tool(&self, name: &str) -> &CountingTool {
        self.tools
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, t)| t.as_ref())
            .unwrap()
    }

    fn total_calls(&self) -> usize {
        self.tools.iter().map(|(_, t)| t.calls()).sum()
    }
}

fn stack_with(config: WardenConfig) -> Stack {
    stack_customized(config, |builder| builder)
}

fn stack_customized(config: WardenConfig, customize: impl FnOnce(WardenBuilder) -> WardenBuilder) -> Stack {
    init_tracing();
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()));
    let declared = [
        ("lookup_customer", PermissionLevel::ReadOnly, None),
        ("process_refund", PermissionLevel::ReadWrite, None),
        ("read_report", PermissionLevel::ReadOnly, Some("path")),
        ("update_order", PermissionLevel::ReadWrite, None),
        ("issue_credit", PermissionLevel::ReadWrite, None),
        ("drop_table", PermissionLevel::Admin, None),
    ];

    let mut builder = Warden::builder(config).clock(clock.clone());
    let mut tools = Vec::new();
    for (name, access, resource_arg) in declared {
        let mut capability = Capability::new(name, access);
        if let Some(arg) = resource_arg {
            capability = capability.with_resource_arg(arg);
        }
        let tool = Arc::new(CountingTool::default());
        builder = builder.tool(capability, tool.clone()).unwrap();
        tools.push((name, tool));
    }

    Stack { warden: customize(builder).build().unwrap(), clock, tools }
}

fn stack() -> Stack {
    stack_with(WardenConfig::from_toml_str(CONFIG).unwrap())
}

fn verify_customer(warden: &Warden, agent: &str) {
    let mut context = Map::new();
    context.insert("customer_verified".to_string(), json!(true));
    warden.policy().update_agent_context(&AgentId::new(agent), context).unwrap();
}

// ── Scenario A: conditional refund ────────────────────────────────────────────

#[test]
fn scenario_a_refund_within_limit_for_verified_customer() {
    let stack = stack();
    verify_customer(&stack.warden, "support-bot");

    let ok = stack.warden.intercept(ActionRequest::new(
        "support-bot",
        "process_refund",
        json!({ "order_id": "A-17", "amount": 500 }),
    ));
    assert_eq!(ok.status(), Status::Allowed);
    assert!(!ok.mute);
    assert_eq!(ok.data().unwrap()["ok"], true);

    let too_much = stack.warden.intercept(ActionRequest::new(
        "support-bot",
        "process_refund",
        json!({ "order_id": "A-18", "amount": 1500 }),
    ));
    assert_eq!(too_much.block_code(), Some(BlockCode::PolicyDenied));
    assert!(too_much.mute);

    assert_eq!(stack.tool("process_refund").calls(), 1);
}

#[test]
fn scenario_a_unverified_customer_is_refused() {
    let stack = stack();
    let result = stack.warden.intercept(ActionRequest::new(
        "support-bot",
        "process_refund",
        json!({ "order_id": "A-17", "amount": 10 }),
    ));

    assert_eq!(result.block_code(), Some(BlockCode::PolicyDenied));
    assert_eq!(stack.tool("process_refund").calls(), 0);

    let record = stack.warden.recorder().get(&result.trace_id).unwrap();
    assert_eq!(record.violation_kind, Some(ViolationKind::PolicyViolation));
    assert_eq!(record.metadata["final_state"], "BLOCKED_POLICY");
}

// ── Scenario B: default deny ──────────────────────────────────────────────────

#[test]
fn scenario_b_unlisted_tool_is_blocked_without_side_effects() {
    let stack = stack();

    let result = stack.warden.intercept(ActionRequest::new("ops-bot", "drop_table", json!({ "table": "orders" })));

    assert_eq!(result.status(), Status::Blocked);
    assert_eq!(result.block_code(), Some(BlockCode::PolicyDenied));
    assert!(result.mute);
    assert!(result.data().is_none());
    assert_eq!(stack.total_calls(), 0);

    let record = stack.warden.recorder().get(&result.trace_id).unwrap();
    assert_eq!(record.policy_verdict, Some(Verdict::Blocked));
    assert_eq!(record.metadata["matched_rule"], "default-deny");
}

#[test]
fn scenario_b_unknown_tool_is_out_of_scope() {
    let stack = stack();
    let result = stack.warden.intercept(ActionRequest::new("ops-bot", "format_disk", json!({})));

    assert_eq!(result.block_code(), Some(BlockCode::OutOfScope));
    assert_eq!(
        stack.warden.recorder().get(&result.trace_id).unwrap().violation_kind,
        Some(ViolationKind::OutOfScope)
    );
}

// ── Scenario C: maintenance freeze ────────────────────────────────────────────

#[test]
fn scenario_c_writes_frozen_between_two_and_four() {
    let stack = stack();
    stack.clock.set(Utc.with_ymd_and_hms(2024, 6, 3, 3, 0, 0).unwrap());

    let write = || ActionRequest::new("ops-bot", "update_order", json!({ "id": 7, "status": "shipped" }));
    let frozen = stack.warden.intercept(write());
    assert_eq!(frozen.block_code(), Some(BlockCode::ConstraintDenied));

    let read = stack
        .warden
        .intercept(ActionRequest::new("ops-bot", "read_report", json!({ "path": "/srv/reports/q2.csv" })));
    assert_eq!(read.status(), Status::Allowed);

    stack.clock.set(Utc.with_ymd_and_hms(2024, 6, 3, 5, 0, 0).unwrap());
    assert_eq!(stack.warden.intercept(write()).status(), Status::Allowed);

    let record = stack.warden.recorder().get(&frozen.trace_id).unwrap();
    assert_eq!(record.violation_kind, Some(ViolationKind::ConstraintViolation));
    assert_eq!(record.metadata["graph"], "temporal");
    assert_eq!(stack.tool("update_order").calls(), 1);
}

#[test]
fn unregistered_resource_is_denied() {
    let stack = stack();
    let result = stack
        .warden
        .intercept(ActionRequest::new("ops-bot", "read_report", json!({ "path": "/etc/shadow" })));
    assert_eq!(result.block_code(), Some(BlockCode::ConstraintDenied));
    assert_eq!(stack.tool("read_report").calls(), 0);
}

// ── Scenario D: shared quota under contention ─────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn scenario_d_shared_quota_admits_exactly_two() {
    let stack = stack();
    for agent in ["finance-a", "finance-b"] {
        let result = stack
            .warden
            .intercept_async(ActionRequest::new(agent, "issue_credit", json!({ "units": 4 })))
            .await;
        assert_eq!(result.status(), Status::Allowed);
    }

    let handles: Vec<_> = ["finance-a", "finance-b", "finance-c"]
        .into_iter()
        .map(|agent| {
            let warden = stack.warden.clone();
            tokio::spawn(async move {
                warden
                    .intercept_async(ActionRequest::new(agent, "issue_credit", json!({ "units": 1 })))
                    .await
            })
        })
        .collect();

    let mut statuses = Vec::new();
    for handle in handles {
        statuses.push(handle.await.unwrap().status());
    }
    assert_eq!(statuses.iter().filter(|s| **s == Status::Allowed).count(), 2);
    assert_eq!(statuses.iter().filter(|s| **s == Status::Blocked).count(), 1);
    assert_eq!(stack.tool("issue_credit").calls(), 4);
    assert_eq!(
        stack.warden.constraints().quota_usage("credit-budget", &AgentId::new("finance-c")),
        10
    );
}

// ── Scenario E: forensic query ────────────────────────────────────────────────

#[test]
fn scenario_e_blocked_history_most_recent_first() {
    let stack = stack();
    let mut blocked = Vec::new();
    for i in 0..8 {
        let request = if i % 3 == 1 {
            ActionRequest::new("ops-bot", "read_report", json!({ "path": "/srv/reports/daily.csv" }))
        } else {
            ActionRequest::new("ops-bot", "drop_table", json!({ "table": format!("t{i}") }))
        };
        let result = stack.warden.intercept(request);
        if result.status() == Status::Blocked {
            blocked.push(result.trace_id);
        }
    }
    stack
        .warden
        .intercept(ActionRequest::new("support-bot", "drop_table", json!({ "table": "x" })));

    let hits = stack
        .warden
        .query_logs(&AuditQuery::new().agent("ops-bot").verdict(Verdict::Blocked));
    assert_eq!(hits.len(), 5);
    blocked.reverse();
    assert_eq!(hits.iter().map(|r| r.trace_id.clone()).collect::<Vec<_>>(), blocked);

    let stats = stack.warden.statistics();
    assert_eq!(stats.total, 9);
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.by_verdict.get(&Verdict::Blocked), Some(&6));
    assert_eq!(stats.by_verdict.get(&Verdict::Allowed), Some(&3));
}

// ── Shadow Mode ───────────────────────────────────────────────────────────────

#[test]
fn shadow_mode_runs_no_tool_and_consumes_no_quota() {
    let stack = stack();
    stack.warden.kernel().set_shadow_mode(true);

    let result = stack
        .warden
        .intercept(ActionRequest::new("finance-a", "issue_credit", json!({ "units": 10 })));
    assert_eq!(result.status(), Status::Allowed);
    assert_eq!(stack.total_calls(), 0);
    assert_eq!(
        stack.warden.constraints().quota_usage("credit-budget", &AgentId::new("finance-a")),
        0
    );
    assert_eq!(
        stack.warden.recorder().get(&result.trace_id).unwrap().policy_verdict,
        Some(Verdict::Shadow)
    );

    // Denials still deny in Shadow Mode.
    let denied = stack.warden.intercept(ActionRequest::new("ops-bot", "drop_table", json!({})));
    assert_eq!(denied.block_code(), Some(BlockCode::PolicyDenied));
}

// ── Audit trail ───────────────────────────────────────────────────────────────

#[test]
fn one_record_per_request_in_a_verifiable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flight.jsonl");
    let mut config = WardenConfig::from_toml_str(CONFIG).unwrap();
    config.audit.path = Some(path.clone());

    let mut trace_ids = Vec::new();
    {
        let stack = stack_with(config);
        for tool in ["lookup_customer", "drop_table", "format_disk"] {
            let result = stack.warden.intercept(ActionRequest::new("support-bot", tool, json!({})));
            trace_ids.push(result.trace_id);
        }
        assert!(stack.warden.verify_integrity());
    }

    let reopened = FlightRecorder::open(&path).unwrap();
    assert_eq!(reopened.len(), 3);
    assert!(reopened.verify_integrity());
    for trace_id in &trace_ids {
        assert!(reopened.get(trace_id).unwrap().is_terminal());
    }
    let unique: std::collections::HashSet<_> = trace_ids.iter().collect();
    assert_eq!(unique.len(), 3);
}

// ── Supervision ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn supervisors_flag_probing_from_the_live_stream() {
    let config = format!(
        "{CONFIG}\n{}",
        r#"
        [[supervisors]]
        name = "tier-1"
        window_secs = 60
        strategies = [{ kind = "blocked_ratio", max_ratio = 0.5, min_count = 4 }]
        "#
    );
    let stack = stack_with(WardenConfig::from_toml_str(&config).unwrap());
    let watcher = stack.warden.spawn_supervisors().unwrap();

    for _ in 0..5 {
        stack
            .warden
            .intercept_async(ActionRequest::new("ops-bot", "drop_table", json!({})))
            .await;
    }

    let queue = Arc::clone(stack.warden.review_queue());
    drop(stack);
    watcher.await.unwrap();

    let pending = queue.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].agent_id, AgentId::new("ops-bot"));
    assert_eq!(pending[0].strategy, "blocked_ratio");
}

/// A tier with remediation deactivates the agent it flags, and the
/// deactivation is itself on record.
#[test]
fn remediation_deactivates_a_probing_agent() {
    let config = format!(
        "{CONFIG}\n{}",
        r#"
        [[supervisors]]
        name = "tier-1"
        window_secs = 60
        strategies = [{ kind = "blocked_ratio", max_ratio = 0.5, min_count = 4 }]
        "#
    );
    let stack = stack_customized(WardenConfig::from_toml_str(&config).unwrap(), |builder| {
        builder.remediation("tier-1", |policy| Box::new(DeactivateAgent::new(Arc::clone(policy))))
    });
    let update = || ActionRequest::new("ops-bot", "update_order", json!({ "id": 7 }));

    assert_eq!(stack.warden.intercept(update()).status(), Status::Allowed);
    for _ in 0..5 {
        stack.warden.intercept(ActionRequest::new("ops-bot", "drop_table", json!({})));
    }

    let mut records = stack.warden.query_logs(&AuditQuery::new());
    records.reverse();
    let anomalies = stack.warden.supervisors().ingest(&records);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].agent_id, AgentId::new("ops-bot"));

    let after = stack.warden.intercept(update());
    assert_eq!(after.block_code(), Some(BlockCode::PolicyDenied));
    assert_eq!(stack.tool("update_order").calls(), 1);

    let remediations = stack.warden.query_logs(&AuditQuery::new().agent("supervisor:tier-1"));
    assert_eq!(remediations.len(), 1);
    assert_eq!(remediations[0].tool_name, "remediate:deactivate_agent");
    assert_eq!(remediations[0].policy_verdict, Some(Verdict::Allowed));
}

#[test]
fn remediation_for_unknown_tier_is_rejected() {
    let result = Warden::builder(WardenConfig::from_toml_str("").unwrap())
        .remediation("tier-9", |policy| Box::new(DeactivateAgent::new(Arc::clone(policy))))
        .build();

    assert!(matches!(result, Err(WardenError::Registration { .. })));
}

// ── Assembly ──────────────────────────────────────────────────────────────────

#[test]
fn declared_capability_without_handler_is_rejected() {
    let config = WardenConfig::from_toml_str(
        r#"
        [[capabilities]]
        tool_name = "process_refund"
        access = "read_write"
        "#,
    )
    .unwrap();

    assert!(matches!(
        Warden::builder(config.clone()).build(),
        Err(WardenError::Registration { .. })
    ));

    let warden = Warden::builder(config)
        .handler("process_refund", Arc::new(CountingTool::default()))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(warden.mute().tools(), vec!["process_refund"]);
}

#[test]
fn malformed_config_is_a_config_error() {
    assert!(matches!(
        WardenConfig::from_toml_str("[kernel]\nexecution_timeout_ms = \"soon\""),
        Err(WardenError::ConfigError { .. })
    ));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("warden.toml");
    std::fs::write(&path, CONFIG).unwrap();
    let config = WardenConfig::from_file(&path).unwrap();
    assert_eq!(config.policy.agents.len(), 5);
    assert_eq!(config.constraints.windows.len(), 1);
}
