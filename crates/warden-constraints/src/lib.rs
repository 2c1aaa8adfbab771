//! # warden-constraints
//!
//! Contextual constraint graphs for the WARDEN runtime.
//!
//! Role permissions say who may call a tool. The constraint graphs say
//! whether the call makes sense here and now:
//!
//! - [`DataGraph`]: does the resource the action touches exist?
//! - [`PolicyGraph`]: do corporate rules and quotas allow it?
//! - [`TemporalGraph`]: is it allowed at this time of day?
//!
//! [`ConstraintGraphs`] combines them by logical AND and implements
//! [`ConstraintChecker`](warden_core::traits::ConstraintChecker).
//!
//! ```rust,ignore
//! use warden_constraints::{ConstraintConfig, ConstraintGraphs};
//!
//! let graphs = ConstraintGraphs::from_config(ConstraintConfig::from_toml_str(toml)?, clock)?;
//! ```

pub mod config;
pub mod data;
pub mod graphs;
pub mod ledger;
pub mod rules;
pub mod temporal;

pub use config::ConstraintConfig;
pub use data::{DataGraph, Resource, ResourceKind};
pub use graphs::ConstraintGraphs;
pub use ledger::QuotaLedger;
pub use rules::{CorporateRule, PolicyGraph, QuotaRule, QuotaScope, RuleEffect};
pub use temporal::{TemporalGraph, TimeWindow, WindowEffect};

// ── Tests ─────────────────────────────────────────────────────────────────────
