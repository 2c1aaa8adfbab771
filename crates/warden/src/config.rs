//! The WARDEN configuration file.
//!
//! One TOML document configures the whole stack:
//!
//! ```toml
//! [kernel]
//! shadow_mode = false
//! execution_timeout_ms = 5000
//! audit_failure_mode = "fail_closed"
//!
//! [audit]
//! path = "/var/lib/warden/flight.jsonl"
//!
//! [[capabilities]]
//! tool_name = "process_refund"
//! access = "read_write"
//!
//! [policy.roles.support.permissions]
//! process_refund = "read_write"
//!
//! [[policy.agents]]
//! id = "support-bot"
//! role = "support"
//!
//! [[constraints.windows]]
//! name = "maintenance-freeze"
//! start = "02:00"
//! end = "04:00"
//! effect = "deny"
//! writes_only = true
//!
//! [[supervisors]]
//! name = "tier-1"
//! strategies = [{ kind = "rate_ceiling", max_per_window = 100 }]
//! ```
//!
//! Every table is optional. An empty file yields a kernel that denies
//! everything.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use warden_constraints::ConstraintConfig;
use warden_contracts::{
    capability::Capability,
    error::{WardenError, WardenResult},
};
use warden_core::KernelConfig;
use warden_policy::PolicyConfig;
use warden_supervisor::SupervisorConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON Lines file backing the flight recorder. Without one the
    /// recorder is in-memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub constraints: ConstraintConfig,
    /// Supervisor tiers, lowest first.
    #[serde(default)]
    pub supervisors: Vec<SupervisorConfig>,
}

impl WardenConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does
    /// not match the expected schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse WARDEN TOML: {}", e),
        })
    }

    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read WARDEN config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
