//! Supervisor configuration.
//!
//! ```toml
//! name = "tier-1"
//! window_secs = 60
//! history_windows = 10
//!
//! [[strategies]]
//! kind = "rate_ceiling"
//! max_per_window = 100
//!
//! [[strategies]]
//! kind = "blocked_ratio"
//! max_ratio = 0.5
//! min_count = 5
//! ```

use serde::{Deserialize, Serialize};

use warden_contracts::error::{WardenError, WardenResult};

use crate::strategy::{BaselineSurge, BlockedRatio, DetectionStrategy, RateCeiling};

fn default_window_secs() -> u64 {
    60
}

fn default_history_windows() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    pub name: String,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_history_windows")]
    pub history_windows: u32,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl SupervisorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            window_secs: default_window_secs(),
            history_windows: default_history_windows(),
            strategies: Vec::new(),
        }
    }

    pub fn validate(&self) -> WardenResult<()> {
        if self.name.trim().is_empty() {
            return Err(config_error("supervisor name must not be empty"));
        }
        if self.window_secs == 0 || self.window_secs > i32::MAX as u64 {
            return Err(config_error(format!(
                "supervisor '{}': window_secs must be between 1 and {}",
                self.name,
                i32::MAX
            )));
        }
        for strategy in &self.strategies {
            strategy.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    RateCeiling {
        max_per_window: u64,
    },
    BaselineSurge {
        factor: f64,
        #[serde(default)]
        min_count: u64,
    },
    BlockedRatio {
        max_ratio: f64,
        #[serde(default)]
        min_count: u64,
    },
}

impl StrategyConfig {
    fn validate(&self) -> WardenResult<()> {
        match *self {
            StrategyConfig::BaselineSurge { factor, .. } if factor.is_nan() || factor <= 1.0 => {
                Err(config_error(format!("baseline_surge factor must exceed 1.0, got {factor}")))
            }
            StrategyConfig::BlockedRatio { max_ratio, .. } if !(0.0..1.0).contains(&max_ratio) => {
                Err(config_error(format!("blocked_ratio max_ratio must be in [0, 1), got {max_ratio}")))
            }
            _ => Ok(()),
        }
    }

    pub fn build(&self) -> Box<dyn DetectionStrategy> {
        match *self {
            StrategyConfig::RateCeiling { max_per_window } => Box::new(RateCeiling::new(max_per_window)),
            StrategyConfig::BaselineSurge { factor, min_count } => {
                Box::new(BaselineSurge::new(factor, min_count))
            }
            StrategyConfig::BlockedRatio { max_ratio, min_count } => {
                Box::new(BlockedRatio::new(max_ratio, min_count))
            }
        }
    }
}

fn config_error(reason: impl Into<String>) -> WardenError {
    WardenError::ConfigError { reason: reason.into() }
}
