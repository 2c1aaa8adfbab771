//! # warden-policy
//!
//! A TOML-driven, deny-by-default RBAC + ABAC policy engine for the WARDEN
//! runtime.
//!
//! ## Overview
//!
//! This crate provides [`PolicyEngine`], which implements the
//! [`PolicyEvaluator`](warden_core::traits::PolicyEvaluator) trait. Roles
//! hold base permission levels on tools; conditional permissions refine
//! them with attribute tests over the request arguments and the agent's
//! operator-controlled context.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use std::path::Path;
//! use warden_policy::PolicyEngine;
//!
//! let engine = PolicyEngine::from_file(Path::new("policies/support.toml"))?;
//! // Share `Arc::new(engine)` with `warden_core::AgentKernel::new(...)`.
//! ```
//!
//! ## Conditions
//!
//! Paths are dot notation into `{args, context}`. Paths without an `args.`
//! or `context.` root resolve against `args`. A path that does not resolve
//! makes its condition false.

pub mod condition;
pub mod engine;
pub mod rule;

pub use engine::PolicyEngine;
pub use rule::{PolicyConfig, RoleConfig};

// ── Tests ─────────────────────────────────────────────────────────────────────
