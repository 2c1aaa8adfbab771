//! Opt-in automatic remediation.
//!
//! A supervisor only remediates when one is attached with
//! `Supervisor::with_remediation`, and every remediation is written to the
//! flight log as its own trace. If that trace cannot be opened the
//! remediation does not run.

use std::sync::Arc;

use serde_json::{json, Value};

use warden_contracts::error::WardenResult;
use warden_policy::PolicyEngine;

use crate::signal::Anomaly;

pub trait Remediation: Send + Sync {
    /// Act on `anomaly`. The returned value is stored as the trace result.
    fn apply(&self, anomaly: &Anomaly) -> WardenResult<Value>;

    fn name(&self) -> &str;
}

/// Deactivates the offending agent in the policy engine. Every later
/// request from it is denied until an operator reactivates it.
pub struct DeactivateAgent {
    policy: Arc<PolicyEngine>,
}

impl DeactivateAgent {
    pub fn new(policy: Arc<PolicyEngine>) -> Self {
        Self { policy }
    }
}

impl Remediation for DeactivateAgent {
    fn apply(&self, anomaly: &Anomaly) -> WardenResult<Value> {
        self.policy.deactivate_agent(&anomaly.agent_id)?;
        Ok(json!({ "deactivated": anomaly.agent_id.as_str() }))
    }

    fn name(&self) -> &str {
        "deactivate_agent"
    }
}
