//! Constraint configuration schema.
//!
//! Example:
//! ```toml
//! [[resources]]
//! id = "orders"
//! kind = "table"
//!
//! [[rules]]
//! id = "no-bulk-export"
//! tools = ["export_data"]
//! effect = "forbid"
//! conditions = [{ path = "args.rows", op = "gt", value = 10000 }]
//!
//! [[quotas]]
//! id = "refund-calls"
//! tools = ["process_refund"]
//! limit = 10
//! scope = "shared"
//!
//! [[windows]]
//! name = "maintenance-freeze"
//! start = "02:00"
//! end = "04:00"
//! effect = "deny"
//! writes_only = true
//! ```

use serde::{Deserialize, Serialize};

use warden_contracts::error::{WardenError, WardenResult};

use crate::data::Resource;
use crate::rules::{CorporateRule, QuotaRule};
use crate::temporal::TimeWindow;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintConfig {
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub rules: Vec<CorporateRule>,
    #[serde(default)]
    pub quotas: Vec<QuotaRule>,
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
}

impl ConstraintConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does
    /// not match the expected schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse constraint TOML: {}", e),
        })
    }

    pub fn from_file(path: &std::path::Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read constraint file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
