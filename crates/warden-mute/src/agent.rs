//! The mute agent: a closed-world capability map.
//!
//! `MuteAgent` implements the `CapabilityMapper` trait from `warden-core`.
//! A request is in scope only when:
//!
//! 1. its tool has a registered `Capability`, and
//! 2. its arguments validate against that capability's JSON Schema.
//!
//! Schemas are compiled once at registration, so a malformed schema fails
//! the registration instead of every later request. Out-of-scope requests
//! get no explanation; the reason is only logged.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use warden_contracts::{
    capability::{Capability, ScopeMatch},
    error::{WardenError, WardenResult},
};
use warden_core::traits::CapabilityMapper;

/// A registered capability with its compiled argument schema.
struct CompiledCapability {
    capability: Capability,
    /// `None` when the capability declares no schema.
    validator: Option<jsonschema::Validator>,
}

impl CompiledCapability {
    fn compile(capability: Capability) -> WardenResult<Self> {
        if capability.tool_name.trim().is_empty() {
            return Err(WardenError::Registration {
                reason: "capability tool_name must not be empty".to_string(),
            });
        }
        let validator = if capability.argument_schema.is_null() {
            None
        } else {
            let validator = jsonschema::validator_for(&capability.argument_schema).map_err(|e| {
                WardenError::SchemaValidation {
                    reason: format!("argument schema for '{}' is invalid: {e}", capability.tool_name),
                }
            })?;
            Some(validator)
        };
        Ok(Self { capability, validator })
    }

    /// The first schema violation in `args`, if any.
    fn violation(&self, args: &Value) -> Option<String> {
        let validator = self.validator.as_ref()?;
        validator
            .iter_errors(args)
            .next()
            .map(|error| format!("{} at '{}'", error, error.instance_path))
    }
}

type CapabilityMap = HashMap<String, Arc<CompiledCapability>>;

/// The WARDEN capability mapper.
///
/// The map is a copy-on-write snapshot: registrations swap in a new map and
/// are visible to the next `resolve` after the call returns.
pub struct MuteAgent {
    capabilities: RwLock<Arc<CapabilityMap>>,
}

impl MuteAgent {
    /// An agent with no capabilities. Every request is out of scope.
    pub fn new() -> Self {
        Self {
            capabilities: RwLock::new(Arc::new(HashMap::new())),
        }
    }

    pub fn from_config(config: CapabilityConfig) -> WardenResult<Self> {
        let agent = Self::new();
        for capability in config.capabilities {
            agent.register(capability)?;
        }
        Ok(agent)
    }

    pub fn from_file(path: &Path) -> WardenResult<Self> {
        Self::from_config(CapabilityConfig::from_file(path)?)
    }

    fn snapshot(&self) -> Arc<CapabilityMap> {
        Arc::clone(&self.capabilities.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Register a capability.
    ///
    /// Fails with `SchemaValidation` if the argument schema does not
    /// compile, or `Registration` if the tool is already registered.
    pub fn register(&self, capability: Capability) -> WardenResult<()> {
        let compiled = CompiledCapability::compile(capability)?;
        let tool = compiled.capability.tool_name.clone();

        let mut guard = self.capabilities.write().unwrap_or_else(PoisonError::into_inner);
        if guard.contains_key(&tool) {
            return Err(WardenError::Registration {
                reason: format!("capability '{tool}' is already registered"),
            });
        }
        Arc::make_mut(&mut guard).insert(tool.clone(), Arc::new(compiled));
        drop(guard);

        info!(tool = %tool, "capability registered");
        Ok(())
    }

    /// Remove a capability. Returns `false` if it was not registered.
    pub fn deregister(&self, tool_name: &str) -> bool {
        let mut guard = self.capabilities.write().unwrap_or_else(PoisonError::into_inner);
        let removed = Arc::make_mut(&mut guard).remove(tool_name).is_some();
        drop(guard);

        if removed {
            info!(tool = %tool_name, "capability deregistered");
        }
        removed
    }

    pub fn capability(&self, tool_name: &str) -> Option<Capability> {
        self.snapshot().get(tool_name).map(|c| c.capability.clone())
    }

    /// Registered tool names, sorted.
    pub fn tools(&self) -> Vec<String> {
        let mut tools: Vec<String> = self.snapshot().keys().cloned().collect();
        tools.sort();
        tools
    }
}

impl Default for MuteAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityMapper for MuteAgent {
    fn resolve(&self, tool_name: &str, args: &Value) -> Option<ScopeMatch> {
        let snapshot = self.snapshot();
        let Some(entry) = snapshot.get(tool_name) else {
            debug!(tool = %tool_name, "no capability registered");
            return None;
        };
        if let Some(reason) = entry.violation(args) {
            debug!(tool = %tool_name, %reason, "arguments outside capability schema");
            return None;
        }
        Some(entry.capability.scope())
    }
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Capability file schema.
///
/// ```toml
/// [[capabilities]]
/// tool_name = "process_refund"
/// access = "read_write"
/// argument_schema = { type = "object", required = ["order_id", "amount"] }
///
/// [[capabilities]]
/// tool_name = "read_report"
/// resource_arg = "path"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapabilityConfig {
    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

impl CapabilityConfig {
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse capability TOML: {}", e),
        })
    }

    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read capability file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
