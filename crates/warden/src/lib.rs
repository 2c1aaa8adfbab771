//! # warden
//!
//! The WARDEN runtime: a deterministic governance kernel that sits between
//! AI agents and the tools they call.
//!
//! Every proposed action passes, in order:
//!
//! 1. the mute agent (is this a known capability?),
//! 2. the policy engine (may this agent's role do it, under these
//!    conditions?),
//! 3. the constraint graphs (data, corporate rules, quotas, time of day),
//!
//! before the execution engine runs it, or simulates it in Shadow Mode.
//! Each attempt leaves exactly one record in the hash-chained flight
//! recorder, and supervisors watch that stream for cross-request anomalies.
//!
//! ```rust,ignore
//! use warden::{Warden, WardenConfig};
//!
//! let warden = Warden::builder(WardenConfig::from_file(path)?)
//!     .tool(Capability::new("process_refund", PermissionLevel::ReadWrite), refunds)?
//!     .build()?;
//!
//! let result = warden.intercept(ActionRequest::new("support-bot", "process_refund", args));
//! ```

pub mod config;
pub mod runtime;

pub use config::{AuditConfig, WardenConfig};
pub use runtime::{Warden, WardenBuilder};

pub use warden_contracts::{
    action::ActionRequest,
    capability::Capability,
    execution::{BlockCode, ExecutionResult, Outcome, Status},
    policy::PermissionLevel,
};
