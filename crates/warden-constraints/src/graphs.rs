//! `ConstraintGraphs`: the data, policy, and temporal graphs combined by
//! logical AND, plus the quota ledger.
//!
//! Evaluation order:
//!
//! 1. Data graph (resource registered?)
//! 2. Policy graph corporate rules
//! 3. Temporal graph windows
//! 4. Quota reservations, only once every pure check has passed
//!
//! All three graphs live in one snapshot so an evaluation never sees half
//! of an administrative change.

use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, warn};

use warden_contracts::{
    agent::AgentId,
    constraint::{ConstraintAction, GraphKind},
    error::{WardenError, WardenResult},
};
use warden_core::{
    clock::{Clock, SystemClock},
    traits::{ConstraintChecker, ConstraintDecision},
};

use crate::config::ConstraintConfig;
use crate::data::{DataGraph, Resource};
use crate::ledger::QuotaLedger;
use crate::rules::{CorporateRule, PolicyGraph, QuotaRule};
use crate::temporal::{TemporalGraph, TimeWindow};

#[derive(Debug, Clone, Default)]
struct GraphSnapshot {
    data: DataGraph,
    policy: PolicyGraph,
    temporal: TemporalGraph,
}

pub struct ConstraintGraphs {
    state: RwLock<Arc<GraphSnapshot>>,
    ledger: QuotaLedger,
    clock: Arc<dyn Clock>,
}

impl Default for ConstraintGraphs {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintGraphs {
    /// Empty graphs on the system clock. Empty graphs permit everything.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(Arc::new(GraphSnapshot::default())),
            ledger: QuotaLedger::new(),
            clock,
        }
    }

    /// Build graphs holding everything `config` declares.
    pub fn from_config(config: ConstraintConfig, clock: Arc<dyn Clock>) -> WardenResult<Self> {
        let graphs = Self::with_clock(clock);
        for resource in config.resources {
            graphs.register_resource(resource)?;
        }
        for rule in config.rules {
            graphs.add_rule(rule)?;
        }
        for quota in config.quotas {
            graphs.add_quota(quota)?;
        }
        for window in config.windows {
            graphs.add_window(window)?;
        }
        Ok(graphs)
    }

    pub fn from_file(path: &Path, clock: Arc<dyn Clock>) -> WardenResult<Self> {
        Self::from_config(ConstraintConfig::from_file(path)?, clock)
    }

    fn snapshot(&self) -> Arc<GraphSnapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut GraphSnapshot) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }

    // ── Administrative API ───────────────────────────────────────────────────

    pub fn register_resource(&self, resource: Resource) -> WardenResult<()> {
        let id = resource.id.clone();
        if !self.mutate(|s| s.data.register(resource)) {
            return Err(registration(format!("resource '{id}' is already registered")));
        }
        info!(resource = %id, "resource registered");
        Ok(())
    }

    pub fn deregister_resource(&self, id: &str) -> bool {
        let removed = self.mutate(|s| s.data.deregister(id));
        if removed {
            info!(resource = %id, "resource deregistered");
        }
        removed
    }

    pub fn add_rule(&self, rule: CorporateRule) -> WardenResult<()> {
        let id = rule.id.clone();
        if !self.mutate(|s| s.policy.add_rule(rule)) {
            return Err(registration(format!("rule '{id}' is already registered")));
        }
        info!(rule = %id, "corporate rule added");
        Ok(())
    }

    pub fn remove_rule(&self, id: &str) -> bool {
        self.mutate(|s| s.policy.remove_rule(id))
    }

    pub fn add_quota(&self, quota: QuotaRule) -> WardenResult<()> {
        let id = quota.id.clone();
        let limit = quota.limit;
        if !self.mutate(|s| s.policy.add_quota(quota)) {
            return Err(registration(format!("quota '{id}' is already registered")));
        }
        info!(quota = %id, limit, "quota added");
        Ok(())
    }

    /// Remove a quota and forget its consumption.
    pub fn remove_quota(&self, id: &str) -> bool {
        let removed = self.mutate(|s| s.policy.remove_quota(id));
        if removed {
            self.ledger.reset(id);
        }
        removed
    }

    /// Start a quota's consumption over from zero.
    pub fn reset_quota(&self, id: &str) {
        info!(quota = %id, "quota reset");
        self.ledger.reset(id);
    }

    /// Units of `quota_id` consumed or held by `agent_id` (or by everyone,
    /// for a shared quota). Zero for unknown quotas.
    pub fn quota_usage(&self, quota_id: &str, agent_id: &AgentId) -> u64 {
        let snapshot = self.snapshot();
        snapshot
            .policy
            .quotas()
            .iter()
            .find(|q| q.id == quota_id)
            .map_or(0, |q| self.ledger.usage(q, agent_id))
    }

    pub fn add_window(&self, window: TimeWindow) -> WardenResult<()> {
        let name = window.name.clone();
        self.mutate(|s| s.temporal.add_window(window)).map_err(registration)?;
        info!(window = %name, "time window added");
        Ok(())
    }

    pub fn remove_window(&self, name: &str) -> bool {
        self.mutate(|s| s.temporal.remove_window(name))
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn is_accessible(&self, resource_id: &str) -> bool {
        self.snapshot().data.is_accessible(resource_id)
    }

    pub fn is_permitted(&self, action: &ConstraintAction) -> bool {
        self.snapshot().policy.is_permitted(action)
    }

    pub fn is_allowed_now(&self, action: &ConstraintAction) -> bool {
        self.snapshot().temporal.is_allowed_now(action, self.clock.as_ref())
    }

    fn deny(action: &ConstraintAction, graph: GraphKind, reason: String) -> ConstraintDecision {
        warn!(
            agent_id = %action.agent_id,
            tool = %action.tool_name,
            graph = %graph,
            reason = %reason,
            "constraint denied"
        );
        ConstraintDecision::Deny { graph, reason }
    }
}

fn registration(reason: String) -> WardenError {
    WardenError::Registration { reason }
}

impl ConstraintChecker for ConstraintGraphs {
    fn check(&self, action: &ConstraintAction) -> ConstraintDecision {
        let snapshot = self.snapshot();

        if let Err(reason) = snapshot.data.evaluate(action) {
            return Self::deny(action, GraphKind::Data, reason);
        }
        if let Some(rule) = snapshot.policy.first_violation(action) {
            return Self::deny(
                action,
                GraphKind::Policy,
                format!("corporate rule '{}' forbids this action", rule.id),
            );
        }
        if let Err(reason) = snapshot.temporal.evaluate_at(action, self.clock.now()) {
            return Self::deny(action, GraphKind::Temporal, reason);
        }

        // Holds collected so far are released if a later quota refuses.
        let mut holds = Vec::new();
        for quota in snapshot.policy.quotas_for(action) {
            let units = match quota.units(action) {
                Ok(units) => units,
                Err(reason) => return Self::deny(action, GraphKind::Policy, reason),
            };
            match self.ledger.reserve(quota, &action.agent_id, units) {
                Some(hold) => holds.push(hold),
                None => {
                    return Self::deny(
                        action,
                        GraphKind::Policy,
                        format!("quota '{}' would exceed its limit of {}", quota.id, quota.limit),
                    )
                }
            }
        }

        debug!(
            agent_id = %action.agent_id,
            tool = %action.tool_name,
            holds = holds.len(),
            "constraints passed"
        );
        ConstraintDecision::Permit { holds }
    }
}
