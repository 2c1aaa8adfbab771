//! Error types for the WARDEN crates.
//!
//! Denials are not errors: the kernel turns policy, constraint, and scope
//! rejections into blocked results. `WardenError` covers the failures that
//! surface to administrators and to the kernel's own plumbing.

use thiserror::Error;

/// The unified error type for the WARDEN workspace.
#[derive(Debug, Error)]
pub enum WardenError {
    /// A role or conditional permission denied the action.
    #[error("policy violation: {reason}")]
    PolicyViolation { reason: String },

    /// A constraint graph denied the action.
    #[error("constraint violation in {graph} graph: {reason}")]
    ConstraintViolation { graph: String, reason: String },

    /// The tool has no capability mapping.
    #[error("tool '{tool}' is out of scope")]
    OutOfScope { tool: String },

    /// The tool handler returned an error.
    #[error("execution failed: {reason}")]
    ExecutionFailed { reason: String },

    /// The tool handler did not finish in time.
    #[error("execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    /// The audit store could not persist an event.
    ///
    /// Fatal to the request in fail-closed mode.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// A terminal write referenced a trace the recorder does not know.
    #[error("unknown trace '{trace_id}'")]
    UnknownTrace { trace_id: String },

    /// A second terminal write was attempted on a sealed trace.
    #[error("trace '{trace_id}' is already finalized")]
    TraceFinalized { trace_id: String },

    /// A tool, capability, or graph entry could not be registered.
    #[error("registration error: {reason}")]
    Registration { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A JSON Schema document could not be compiled.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },
}

/// Convenience alias used throughout the WARDEN crates.
pub type WardenResult<T> = Result<T, WardenError>;
