//! The execution engine: a closed tool registry with bounded, rollback-safe
//! invocation.
//!
//! Tools are registered once, up front. A tool name that was never
//! registered cannot be dispatched, no matter what the request says.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use warden_contracts::{
    action::ActionRequest,
    error::{WardenError, WardenResult},
};

use crate::traits::ToolHandler;

/// Default per-action timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

struct ToolEntry {
    handler: Arc<dyn ToolHandler>,
    timeout: Option<Duration>,
}

/// tool_name → handler. Validated when entries are added, never at call
/// time.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolEntry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `name` with the engine-wide timeout.
    ///
    /// Returns `WardenError::Registration` for an empty name or a name that
    /// is already taken.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
    ) -> WardenResult<()> {
        self.insert(name.into(), handler, None)
    }

    /// Register `handler` with its own timeout, overriding the engine's.
    pub fn register_with_timeout(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
        timeout: Duration,
    ) -> WardenResult<()> {
        self.insert(name.into(), handler, Some(timeout))
    }

    fn insert(
        &mut self,
        name: String,
        handler: Arc<dyn ToolHandler>,
        timeout: Option<Duration>,
    ) -> WardenResult<()> {
        if name.trim().is_empty() {
            return Err(WardenError::Registration {
                reason: "tool name must not be empty".to_string(),
            });
        }
        if self.tools.contains_key(&name) {
            return Err(WardenError::Registration {
                reason: format!("tool '{name}' is already registered"),
            });
        }
        if timeout.is_some_and(|t| t.is_zero()) {
            return Err(WardenError::Registration {
                reason: format!("tool '{name}' has a zero timeout"),
            });
        }
        info!(tool = %name, "tool registered");
        self.tools.insert(name, ToolEntry { handler, timeout });
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Runs registered tools under a timeout and rolls back on failure.
pub struct ExecutionEngine {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Invoke the handler registered for `tool_name`.
    ///
    /// On handler error or timeout the in-flight future is dropped, the
    /// handler's `rollback` runs, and the original failure is returned.
    pub async fn execute(&self, tool_name: &str, args: &Map<String, Value>) -> WardenResult<Value> {
        let entry = self.registry.tools.get(tool_name).ok_or_else(|| {
            WardenError::ExecutionFailed {
                reason: format!("no handler registered for tool '{tool_name}'"),
            }
        })?;
        let timeout = entry.timeout.unwrap_or(self.timeout);

        debug!(tool = %tool_name, timeout_ms = timeout.as_millis() as u64, "invoking tool");

        let failure = match tokio::time::timeout(timeout, entry.handler.invoke(args)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                warn!(tool = %tool_name, error = %e, "tool invocation failed");
                e
            }
            Err(_) => {
                warn!(tool = %tool_name, timeout_ms = timeout.as_millis() as u64, "tool invocation timed out");
                WardenError::ExecutionTimeout { timeout_ms: timeout.as_millis() as u64 }
            }
        };

        Self::rollback_entry(tool_name, entry, args).await;
        Err(failure)
    }

    /// Run the rollback of `tool_name` after a successful invoke whose
    /// outcome could not be kept.
    pub async fn roll_back(&self, tool_name: &str, args: &Map<String, Value>) {
        if let Some(entry) = self.registry.tools.get(tool_name) {
            Self::rollback_entry(tool_name, entry, args).await;
        }
    }

    async fn rollback_entry(tool_name: &str, entry: &ToolEntry, args: &Map<String, Value>) {
        match entry.handler.rollback(args).await {
            Ok(()) => debug!(tool = %tool_name, "rollback complete"),
            Err(e) => warn!(tool = %tool_name, error = %e, "rollback failed"),
        }
    }

    /// The Shadow Mode stand-in for `execute`: describes what would have run
    /// and touches nothing.
    pub fn simulate(&self, request: &ActionRequest) -> Value {
        json!({
            "simulated": true,
            "tool": request.tool_name,
            "registered": self.registry.contains(&request.tool_name),
            "args": request.args_value(),
        })
    }
}
