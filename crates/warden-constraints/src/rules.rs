//! The policy graph: corporate rules and quotas.
//!
//! A corporate rule selects actions and tests conditions over
//! `{args, context}` with the same condition language as conditional
//! permissions. A `forbid` rule denies when its conditions hold; a
//! `require` rule denies unless they hold.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use warden_contracts::{
    constraint::{ActionSelector, ConstraintAction},
    policy::Condition,
};
use warden_core::path::resolve_path;
use warden_policy::condition::{evaluate_condition, merged_view};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleEffect {
    Forbid,
    Require,
}

/// A corporate rule, e.g. "no export of more than 10 000 rows".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorporateRule {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub selector: ActionSelector,
    pub conditions: Vec<Condition>,
    #[serde(default = "default_require_all")]
    pub require_all: bool,
    pub effect: RuleEffect,
}

fn default_require_all() -> bool {
    true
}

impl CorporateRule {
    pub fn new(
        id: impl Into<String>,
        selector: ActionSelector,
        conditions: Vec<Condition>,
        effect: RuleEffect,
    ) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            selector,
            conditions,
            require_all: true,
            effect,
        }
    }

    /// True if the rule lets `action` through. Rules that do not select the
    /// action always do.
    pub fn permits(&self, action: &ConstraintAction, view: &Value) -> bool {
        if !self.selector.matches(&action.tool_name, action.access) {
            return true;
        }
        let holds = if self.require_all {
            self.conditions.iter().all(|c| evaluate_condition(c, view))
        } else {
            self.conditions.iter().any(|c| evaluate_condition(c, view))
        };
        match self.effect {
            RuleEffect::Forbid => !holds,
            RuleEffect::Require => holds,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    /// One counter for every agent.
    #[default]
    Shared,
    /// One counter per agent.
    PerAgent,
}

/// A cap on the units consumed by selected actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRule {
    pub id: String,
    #[serde(flatten)]
    pub selector: ActionSelector,
    pub limit: u64,
    /// Dot path into the args giving the units one action consumes.
    /// Without it every action consumes one unit.
    #[serde(default)]
    pub units_arg: Option<String>,
    #[serde(default)]
    pub scope: QuotaScope,
}

impl QuotaRule {
    pub fn new(id: impl Into<String>, selector: ActionSelector, limit: u64) -> Self {
        Self {
            id: id.into(),
            selector,
            limit,
            units_arg: None,
            scope: QuotaScope::Shared,
        }
    }

    pub fn with_units_arg(mut self, path: impl Into<String>) -> Self {
        self.units_arg = Some(path.into());
        self
    }

    pub fn per_agent(mut self) -> Self {
        self.scope = QuotaScope::PerAgent;
        self
    }

    /// Units `action` would consume, or a reason it cannot be metered.
    pub fn units(&self, action: &ConstraintAction) -> Result<u64, String> {
        let Some(path) = &self.units_arg else {
            return Ok(1);
        };
        let args = Value::Object(action.args.clone());
        let units = match resolve_path(&args, path) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        };
        units.ok_or_else(|| {
            format!("quota '{}' cannot meter the request: '{path}' is not a whole number", self.id)
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct PolicyGraph {
    rules: Vec<CorporateRule>,
    quotas: Vec<QuotaRule>,
}

impl PolicyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Returns false if the id is taken.
    pub fn add_rule(&mut self, rule: CorporateRule) -> bool {
        if self.rules.iter().any(|r| r.id == rule.id) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn remove_rule(&mut self, id: &str) -> bool {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        before != self.rules.len()
    }

    /// Add a quota. Returns false if the id is taken.
    pub fn add_quota(&mut self, quota: QuotaRule) -> bool {
        if self.quotas.iter().any(|q| q.id == quota.id) {
            return false;
        }
        self.quotas.push(quota);
        true
    }

    pub fn remove_quota(&mut self, id: &str) -> bool {
        let before = self.quotas.len();
        self.quotas.retain(|q| q.id != id);
        before != self.quotas.len()
    }

    pub fn rules(&self) -> &[CorporateRule] {
        &self.rules
    }

    pub fn quotas(&self) -> &[QuotaRule] {
        &self.quotas
    }

    /// Quotas that apply to `action`.
    pub fn quotas_for<'a>(&'a self, action: &'a ConstraintAction) -> impl Iterator<Item = &'a QuotaRule> {
        self.quotas
            .iter()
            .filter(|q| q.selector.matches(&action.tool_name, action.access))
    }

    /// The first rule `action` violates.
    pub fn first_violation(&self, action: &ConstraintAction) -> Option<&CorporateRule> {
        let view = merged_view(&action.args, &action.context);
        self.rules.iter().find(|rule| !rule.permits(action, &view))
    }

    pub fn is_permitted(&self, action: &ConstraintAction) -> bool {
        self.first_violation(action).is_none()
    }
}
