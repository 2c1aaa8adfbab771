//! # warden-contracts
//!
//! Shared types, schemas, and contracts for the WARDEN action-governance
//! kernel.
//!
//! All crates in the workspace import from here. No business logic lives in
//! this crate, only data definitions and error types.

pub mod action;
pub mod agent;
pub mod audit;
pub mod capability;
pub mod constraint;
pub mod error;
pub mod execution;
pub mod policy;

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;

    use super::*;
    use action::{ActionRequest, TraceId};
    use agent::AgentId;
    use audit::{AuditQuery, AuditRecord};
    use constraint::ActionSelector;
    use error::WardenError;
    use execution::{BlockCode, ExecutionResult, Status};
    use policy::{ConditionalPermission, PermissionLevel, Verdict};

    fn record(agent: &str, verdict: Option<Verdict>) -> AuditRecord {
        AuditRecord {
            trace_id: TraceId::new(),
            timestamp: Utc::now(),
            agent_id: AgentId::new(agent),
            tool_name: "lookup".to_string(),
            tool_args: json!({}),
            input_prompt: None,
            policy_verdict: verdict,
            violation_kind: None,
            violation_reason: None,
            result: None,
            execution_time_ms: None,
            metadata: Default::default(),
            completed_at: None,
        }
    }

    // ── PermissionLevel ──────────────────────────────────────────────────────

    #[test]
    fn permission_levels_are_ordered() {
        assert!(PermissionLevel::None < PermissionLevel::ReadOnly);
        assert!(PermissionLevel::ReadOnly < PermissionLevel::ReadWrite);
        assert!(PermissionLevel::ReadWrite < PermissionLevel::Admin);
        assert!(!PermissionLevel::ReadOnly.is_write());
        assert!(PermissionLevel::Admin.is_write());
    }

    #[test]
    fn permission_level_uses_snake_case_names() {
        let level: PermissionLevel = serde_json::from_str("\"read_write\"").unwrap();
        assert_eq!(level, PermissionLevel::ReadWrite);
        assert_eq!(PermissionLevel::ReadOnly.to_string(), "read_only");
    }

    #[test]
    fn conditional_permission_defaults_to_require_all() {
        let parsed: ConditionalPermission = serde_json::from_value(json!({
            "tool": "process_refund",
            "conditions": [{ "path": "args.amount", "op": "lte", "value": 1000 }]
        }))
        .unwrap();
        assert!(parsed.require_all);
        assert_eq!(parsed.conditions.len(), 1);
    }

    // ── ActionSelector ───────────────────────────────────────────────────────

    #[test]
    fn selector_matches_tools_and_write_access() {
        let any = ActionSelector::any();
        assert!(any.matches("anything", PermissionLevel::ReadOnly));

        let named = ActionSelector::tools(["update_ledger"]);
        assert!(named.matches("update_ledger", PermissionLevel::ReadOnly));
        assert!(!named.matches("read_ledger", PermissionLevel::ReadOnly));

        let writes = ActionSelector::writes();
        assert!(writes.matches("update_ledger", PermissionLevel::ReadWrite));
        assert!(!writes.matches("read_ledger", PermissionLevel::ReadOnly));
    }

    // ── ActionRequest ────────────────────────────────────────────────────────

    #[test]
    fn action_request_wraps_non_object_args() {
        let req = ActionRequest::new("a", "echo", json!("hi"));
        assert_eq!(req.args.get("value"), Some(&json!("hi")));

        let empty = ActionRequest::new("a", "echo", serde_json::Value::Null);
        assert!(empty.args.is_empty());
    }

    #[test]
    fn trace_ids_are_unique() {
        let ids: std::collections::HashSet<String> =
            (0..100).map(|_| TraceId::new().to_string()).collect();
        assert_eq!(ids.len(), 100);
    }

    // ── AuditQuery ───────────────────────────────────────────────────────────

    #[test]
    fn audit_query_filters_agent_verdict_and_time() {
        let blocked = record("finance-agent", Some(Verdict::Blocked));

        assert!(AuditQuery::new().matches(&blocked));
        assert!(AuditQuery::new().agent("finance-agent").matches(&blocked));
        assert!(!AuditQuery::new().agent("other").matches(&blocked));
        assert!(AuditQuery::new().verdict(Verdict::Blocked).matches(&blocked));
        assert!(!AuditQuery::new().verdict(Verdict::Allowed).matches(&blocked));

        let pending = record("finance-agent", None);
        assert!(!AuditQuery::new().verdict(Verdict::Blocked).matches(&pending));

        let now = Utc::now();
        let past = AuditQuery::new().between(now - Duration::hours(2), now - Duration::hours(1));
        assert!(!past.matches(&blocked));
    }

    // ── ExecutionResult ──────────────────────────────────────────────────────

    #[test]
    fn blocked_result_is_mute_and_carries_no_data() {
        let result = ExecutionResult::blocked(TraceId::new(), BlockCode::PolicyDenied);
        assert!(result.mute);
        assert_eq!(result.status(), Status::Blocked);
        assert!(result.data().is_none());
        assert_eq!(result.block_code(), Some(BlockCode::PolicyDenied));
    }

    #[test]
    fn execution_result_serializes_with_status_tag() {
        let result = ExecutionResult::allowed(TraceId::new(), json!({ "ok": true }));
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["outcome"]["status"], "allowed");
        assert_eq!(value["outcome"]["data"]["ok"], true);
        assert_eq!(value["mute"], false);
    }

    // ── WardenError display messages ─────────────────────────────────────────

    #[test]
    fn error_constraint_violation_display() {
        let err = WardenError::ConstraintViolation {
            graph: "temporal".to_string(),
            reason: "maintenance window".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("temporal"));
        assert!(msg.contains("maintenance window"));
    }

    #[test]
    fn error_audit_write_failed_display() {
        let err = WardenError::AuditWriteFailed { reason: "disk full".to_string() };
        let msg = err.to_string();
        assert!(msg.contains("audit write failed"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn error_timeout_display() {
        let err = WardenError::ExecutionTimeout { timeout_ms: 250 };
        assert!(err.to_string().contains("250ms"));
    }
}
