//! # warden-core
//!
//! The deterministic action-governance kernel for WARDEN agents.
//!
//! This crate provides:
//! - The trust-boundary traits (`CapabilityMapper`, `PolicyEvaluator`,
//!   `ConstraintChecker`, `FlightLog`, `ToolHandler`)
//! - The `AgentKernel` that wires them together in the correct trust order
//! - The `ExecutionEngine` that runs registered tools under a timeout
//! - Atomic quota reservations and the argument guard
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_core::{AgentKernel, ExecutionEngine, ToolRegistry};
//!
//! let kernel = AgentKernel::new(mapper, policy, constraints, recorder, engine);
//! let result = kernel.intercept(request);
//! ```

pub mod clock;
pub mod engine;
pub mod kernel;
pub mod path;
pub mod quota;
pub mod state;
pub mod traits;
pub mod validator;

pub use engine::{ExecutionEngine, ToolRegistry};
pub use kernel::{AgentKernel, AuditFailureMode, KernelConfig};
