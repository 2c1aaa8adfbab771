//! Policy configuration schema.
//!
//! A `PolicyConfig` is deserialized from TOML. It declares, per role, the
//! base permission level on each tool and any conditional permissions that
//! refine it, plus the agents registered at startup.
//!
//! Example:
//! ```toml
//! precedence = "any_entry"
//!
//! [roles.support.permissions]
//! lookup_customer = "read_only"
//! process_refund = "read_write"
//!
//! [[roles.support.conditional]]
//! tool = "process_refund"
//! require_all = true
//! conditions = [
//!     { path = "args.amount", op = "lte", value = 1000 },
//!     { path = "context.customer_verified", op = "eq", value = true },
//! ]
//!
//! [[agents]]
//! id = "support-bot"
//! role = "support"
//! context = { customer_verified = true }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use warden_contracts::{
    agent::AgentProfile,
    error::{WardenError, WardenResult},
    policy::{ConditionPrecedence, ConditionalPermission, PermissionLevel},
};

/// Everything one role is granted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleConfig {
    /// tool_name → base permission level. Tools not listed are denied.
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionLevel>,

    /// Attribute conditions refining the base permissions, in declaration
    /// order.
    #[serde(default)]
    pub conditional: Vec<ConditionalPermission>,
}

/// The top-level structure deserialized from a TOML policy file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// How several conditional permissions on one (role, tool) combine.
    #[serde(default)]
    pub precedence: ConditionPrecedence,

    #[serde(default)]
    pub roles: BTreeMap<String, RoleConfig>,

    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

impl PolicyConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does
    /// not match the expected schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine could not apply unambiguously.
    pub fn validate(&self) -> WardenResult<()> {
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.as_str().trim().is_empty() {
                return Err(WardenError::ConfigError {
                    reason: "agent id must not be empty".to_string(),
                });
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(WardenError::ConfigError {
                    reason: format!("agent '{}' is declared more than once", agent.id),
                });
            }
        }
        for (role, config) in &self.roles {
            if let Some(entry) = config.conditional.iter().find(|c| c.tool.trim().is_empty()) {
                return Err(WardenError::ConfigError {
                    reason: format!(
                        "role '{role}' has a conditional permission with no tool ({} conditions)",
                        entry.conditions.len()
                    ),
                });
            }
        }
        Ok(())
    }
}
