//! The role- and attribute-based policy engine.
//!
//! `PolicyEngine` holds its state in an immutable snapshot behind a lock.
//! Every evaluation clones the current `Arc` and works on that snapshot, so
//! an administrative call either happened before an evaluation or after it,
//! never halfway through.
//!
//! Evaluation algorithm:
//!
//! 1. Resolve the agent. Unknown or inactive agents → deny.
//! 2. Look up the base permission for (role, tool). Missing or `none` → deny.
//! 3. Collect the conditional permissions registered for (role, tool).
//!    None → allow at the base level.
//! 4. Evaluate each entry against `{args, context}` (see `condition`).
//! 5. Combine entries per `ConditionPrecedence`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use warden_contracts::{
    agent::{AgentId, AgentProfile},
    error::{WardenError, WardenResult},
    policy::{ConditionPrecedence, ConditionalPermission, PermissionLevel, PolicyVerdict},
};
use warden_core::traits::PolicyEvaluator;

use crate::condition::{evaluate_entry, merged_view};
use crate::rule::PolicyConfig;

/// One consistent view of the policy state.
#[derive(Debug, Clone, Default)]
struct PolicySnapshot {
    /// role → tool → level
    permissions: HashMap<String, HashMap<String, PermissionLevel>>,
    /// role → entries, in registration order
    conditional: HashMap<String, Vec<ConditionalPermission>>,
    agents: HashMap<AgentId, AgentProfile>,
    precedence: ConditionPrecedence,
}

/// Deny-by-default RBAC + ABAC policy engine.
///
/// Construct empty with `new`, or from configuration via `from_config`,
/// `from_toml_str`, or `from_file`. Share it by `Arc`; every method takes
/// `&self`.
///
/// ```rust,ignore
/// use warden_policy::PolicyEngine;
///
/// let engine = PolicyEngine::from_file(Path::new("policies/support.toml"))?;
/// engine.add_permission("support", "lookup_customer", PermissionLevel::ReadOnly);
/// ```
#[derive(Debug, Default)]
pub struct PolicyEngine {
    state: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine holding everything `config` declares.
    pub fn from_config(config: PolicyConfig) -> WardenResult<Self> {
        config.validate()?;
        let mut snapshot = PolicySnapshot {
            precedence: config.precedence,
            ..PolicySnapshot::default()
        };
        for (role, role_config) in config.roles {
            snapshot
                .permissions
                .insert(role.clone(), role_config.permissions.into_iter().collect());
            snapshot.conditional.insert(role, role_config.conditional);
        }
        for agent in config.agents {
            snapshot.agents.insert(agent.id.clone(), agent);
        }
        Ok(Self {
            state: RwLock::new(Arc::new(snapshot)),
        })
    }

    /// Parse `s` as TOML and build a `PolicyEngine`.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does
    /// not match the expected `PolicyConfig` schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        Self::from_config(PolicyConfig::from_toml_str(s)?)
    }

    /// Read the file at `path` and parse it as TOML policy configuration.
    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    fn snapshot(&self) -> Arc<PolicySnapshot> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Apply `f` to a private copy of the state and publish it.
    fn mutate<R>(&self, f: impl FnOnce(&mut PolicySnapshot) -> R) -> R {
        let mut guard = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(Arc::make_mut(&mut guard))
    }

    // ── Administrative API ───────────────────────────────────────────────────

    /// Grant `role` the given level on `tool`, replacing any previous grant.
    pub fn add_permission(&self, role: &str, tool: &str, level: PermissionLevel) {
        info!(role, tool, level = %level, "permission granted");
        self.mutate(|s| {
            s.permissions
                .entry(role.to_string())
                .or_default()
                .insert(tool.to_string(), level);
        });
    }

    /// Remove the base permission of `role` on `tool`. Returns true if one
    /// existed.
    pub fn remove_permission(&self, role: &str, tool: &str) -> bool {
        let removed = self.mutate(|s| {
            s.permissions
                .get_mut(role)
                .is_some_and(|tools| tools.remove(tool).is_some())
        });
        if removed {
            info!(role, tool, "permission removed");
        }
        removed
    }

    pub fn add_conditional_permission(
        &self,
        role: &str,
        permission: ConditionalPermission,
    ) -> WardenResult<()> {
        if permission.tool.trim().is_empty() {
            return Err(WardenError::ConfigError {
                reason: format!("conditional permission for role '{role}' names no tool"),
            });
        }
        info!(
            role,
            tool = %permission.tool,
            conditions = permission.conditions.len(),
            require_all = permission.require_all,
            "conditional permission added"
        );
        self.mutate(|s| {
            s.conditional
                .entry(role.to_string())
                .or_default()
                .push(permission)
        });
        Ok(())
    }

    /// Drop every conditional permission of `role` on `tool`. Returns how
    /// many were removed.
    pub fn clear_conditional_permissions(&self, role: &str, tool: &str) -> usize {
        let removed = self.mutate(|s| match s.conditional.get_mut(role) {
            Some(entries) => {
                let before = entries.len();
                entries.retain(|e| e.tool != tool);
                before - entries.len()
            }
            None => 0,
        });
        info!(role, tool, removed, "conditional permissions cleared");
        removed
    }

    /// Register a new active agent under `role`.
    ///
    /// Returns `WardenError::Registration` if the id is empty or taken.
    pub fn register_agent(&self, agent_id: impl Into<AgentId>, role: &str) -> WardenResult<()> {
        self.register_profile(AgentProfile::new(agent_id, role))
    }

    /// Register a fully described agent.
    pub fn register_profile(&self, profile: AgentProfile) -> WardenResult<()> {
        if profile.id.as_str().trim().is_empty() {
            return Err(WardenError::Registration {
                reason: "agent id must not be empty".to_string(),
            });
        }
        let id = profile.id.clone();
        let role = profile.role.clone();
        self.mutate(|s| {
            if s.agents.contains_key(&id) {
                return Err(WardenError::Registration {
                    reason: format!("agent '{id}' is already registered"),
                });
            }
            s.agents.insert(id.clone(), profile);
            Ok(())
        })?;
        info!(agent_id = %id, role = %role, "agent registered");
        Ok(())
    }

    /// Mark an agent inactive. Every later request from it is denied.
    pub fn deactivate_agent(&self, agent_id: &AgentId) -> WardenResult<()> {
        self.with_agent(agent_id, |agent| agent.active = false)?;
        warn!(agent_id = %agent_id, "agent deactivated");
        Ok(())
    }

    pub fn activate_agent(&self, agent_id: &AgentId) -> WardenResult<()> {
        self.with_agent(agent_id, |agent| agent.active = true)?;
        info!(agent_id = %agent_id, "agent activated");
        Ok(())
    }

    /// Replace an agent's context attributes.
    pub fn set_agent_context(&self, agent_id: &AgentId, context: Map<String, Value>) -> WardenResult<()> {
        self.with_agent(agent_id, |agent| agent.context = context)?;
        debug!(agent_id = %agent_id, "agent context replaced");
        Ok(())
    }

    /// Merge `attrs` into an agent's context, overwriting existing keys.
    pub fn update_agent_context(&self, agent_id: &AgentId, attrs: Map<String, Value>) -> WardenResult<()> {
        self.with_agent(agent_id, |agent| agent.context.extend(attrs))?;
        debug!(agent_id = %agent_id, "agent context updated");
        Ok(())
    }

    fn with_agent(&self, agent_id: &AgentId, f: impl FnOnce(&mut AgentProfile)) -> WardenResult<()> {
        self.mutate(|s| match s.agents.get_mut(agent_id) {
            Some(agent) => {
                f(agent);
                Ok(())
            }
            None => Err(WardenError::Registration {
                reason: format!("agent '{agent_id}' is not registered"),
            }),
        })
    }

    pub fn set_precedence(&self, precedence: ConditionPrecedence) {
        info!(?precedence, "condition precedence changed");
        self.mutate(|s| s.precedence = precedence);
    }

    pub fn precedence(&self) -> ConditionPrecedence {
        self.snapshot().precedence
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<AgentProfile> {
        self.snapshot().agents.get(agent_id).cloned()
    }

    pub fn permission(&self, role: &str, tool: &str) -> Option<PermissionLevel> {
        self.snapshot()
            .permissions
            .get(role)
            .and_then(|tools| tools.get(tool))
            .copied()
    }

    // ── Evaluation ───────────────────────────────────────────────────────────

    /// Decide whether `agent_id` may invoke `tool_name` with `args`.
    ///
    /// Pure and deterministic against the snapshot it reads.
    pub fn evaluate(&self, agent_id: &AgentId, tool_name: &str, args: &Map<String, Value>) -> PolicyVerdict {
        let snapshot = self.snapshot();
        debug!(agent_id = %agent_id, tool = %tool_name, "evaluating policy");

        let Some(agent) = snapshot.agents.get(agent_id) else {
            return deny(agent_id, tool_name, format!("agent '{agent_id}' is not registered"), "agent:unknown");
        };
        if !agent.active {
            return deny(agent_id, tool_name, format!("agent '{agent_id}' is inactive"), "agent:inactive");
        }

        let role = agent.role.as_str();
        let base_rule = format!("role:{role}/{tool_name}");
        let level = snapshot
            .permissions
            .get(role)
            .and_then(|tools| tools.get(tool_name))
            .copied()
            .unwrap_or(PermissionLevel::None);
        if level == PermissionLevel::None {
            return deny(
                agent_id,
                tool_name,
                format!("denied by default: role '{role}' holds no permission on '{tool_name}'"),
                "default-deny",
            );
        }

        let entries: Vec<(usize, &ConditionalPermission)> = snapshot
            .conditional
            .get(role)
            .map(|all| all.iter().filter(|e| e.tool == tool_name).enumerate().collect())
            .unwrap_or_default();

        if entries.is_empty() {
            debug!(agent_id = %agent_id, tool = %tool_name, level = %level, "base permission granted");
            return PolicyVerdict::allow(
                format!("role '{role}' holds '{level}' on '{tool_name}'"),
                Some(base_rule),
                level,
            );
        }

        let view = merged_view(args, &agent.context);
        let entry_rule = |idx: usize| format!("conditional:{role}/{tool_name}#{idx}");

        match snapshot.precedence {
            ConditionPrecedence::AnyEntry => {
                match entries.iter().find(|(_, entry)| evaluate_entry(entry, &view)) {
                    Some((idx, _)) => PolicyVerdict::allow(
                        format!("conditional permission #{idx} on '{tool_name}' holds"),
                        Some(entry_rule(*idx)),
                        level,
                    ),
                    None => deny(
                        agent_id,
                        tool_name,
                        format!("no conditional permission on '{tool_name}' holds for role '{role}'"),
                        &format!("conditional:{role}/{tool_name}"),
                    ),
                }
            }
            ConditionPrecedence::AllEntries => {
                match entries.iter().find(|(_, entry)| !evaluate_entry(entry, &view)) {
                    Some((idx, _)) => deny(
                        agent_id,
                        tool_name,
                        format!("conditional permission #{idx} on '{tool_name}' does not hold"),
                        &entry_rule(*idx),
                    ),
                    None => PolicyVerdict::allow(
                        format!("all {} conditional permissions on '{tool_name}' hold", entries.len()),
                        Some(format!("conditional:{role}/{tool_name}")),
                        level,
                    ),
                }
            }
        }
    }
}

fn deny(agent_id: &AgentId, tool_name: &str, reason: String, rule: &str) -> PolicyVerdict {
    warn!(agent_id = %agent_id, tool = %tool_name, rule, reason = %reason, "policy denied");
    PolicyVerdict::deny(reason, Some(rule.to_string()))
}

impl PolicyEvaluator for PolicyEngine {
    fn evaluate(
        &self,
        agent_id: &AgentId,
        tool_name: &str,
        args: &Map<String, Value>,
    ) -> WardenResult<PolicyVerdict> {
        Ok(PolicyEngine::evaluate(self, agent_id, tool_name, args))
    }

    fn agent_context(&self, agent_id: &AgentId) -> Map<String, Value> {
        self.snapshot()
            .agents
            .get(agent_id)
            .map(|agent| agent.context.clone())
            .unwrap_or_default()
    }
}
