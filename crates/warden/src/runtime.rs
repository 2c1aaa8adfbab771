//! `Warden`: the assembled runtime.
//!
//! `WardenBuilder` turns a `WardenConfig` plus the host's tool handlers into
//! one kernel and keeps `Arc` handles to every component, so operators can
//! reach the administrative APIs while agents go through `intercept`.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use warden_audit::FlightRecorder;
use warden_constraints::ConstraintGraphs;
use warden_contracts::{
    action::ActionRequest,
    audit::{AuditQuery, AuditRecord, AuditStatistics},
    capability::Capability,
    error::{WardenError, WardenResult},
    execution::ExecutionResult,
};
use warden_core::{
    clock::{Clock, SystemClock},
    traits::{FlightLog, ToolHandler},
    AgentKernel, ExecutionEngine, ToolRegistry,
};
use warden_mute::MuteAgent;
use warden_policy::PolicyEngine;
use warden_supervisor::{Remediation, ReviewQueue, Supervisor, SupervisorHierarchy};

use crate::config::WardenConfig;

/// Builds a tier's remediation once the policy engine exists.
type RemediationFactory = Box<dyn FnOnce(&Arc<PolicyEngine>) -> Box<dyn Remediation>>;

pub struct WardenBuilder {
    config: WardenConfig,
    clock: Arc<dyn Clock>,
    capabilities: Vec<Capability>,
    tools: ToolRegistry,
    remediations: Vec<(String, RemediationFactory)>,
}

impl WardenBuilder {
    pub fn new(config: WardenConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            capabilities: Vec::new(),
            tools: ToolRegistry::new(),
            remediations: Vec::new(),
        }
    }

    /// The clock the temporal graph reads. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Declare a tool and its handler together.
    pub fn tool(mut self, capability: Capability, handler: Arc<dyn ToolHandler>) -> WardenResult<Self> {
        self.tools.register(capability.tool_name.clone(), handler)?;
        self.capabilities.push(capability);
        Ok(self)
    }

    /// Like `tool`, with a timeout overriding `execution_timeout_ms`.
    pub fn tool_with_timeout(
        mut self,
        capability: Capability,
        handler: Arc<dyn ToolHandler>,
        timeout: Duration,
    ) -> WardenResult<Self> {
        self.tools
            .register_with_timeout(capability.tool_name.clone(), handler, timeout)?;
        self.capabilities.push(capability);
        Ok(self)
    }

    /// Attach the handler for a capability declared in the config file.
    pub fn handler(mut self, tool_name: &str, handler: Arc<dyn ToolHandler>) -> WardenResult<Self> {
        self.tools.register(tool_name, handler)?;
        Ok(self)
    }

    /// Opt the supervisor tier named `tier` in to automatic remediation.
    ///
    /// `make` receives the runtime's policy engine; every remediation it
    /// performs is recorded in the runtime's flight recorder. A later call
    /// for the same tier replaces an earlier one.
    ///
    /// ```rust,ignore
    /// let warden = Warden::builder(config)
    ///     .remediation("tier-1", |policy| Box::new(DeactivateAgent::new(Arc::clone(policy))))
    ///     .build()?;
    /// ```
    pub fn remediation<F>(mut self, tier: impl Into<String>, make: F) -> Self
    where
        F: FnOnce(&Arc<PolicyEngine>) -> Box<dyn Remediation> + 'static,
    {
        let tier = tier.into();
        self.remediations.retain(|(name, _)| *name != tier);
        self.remediations.push((tier, Box::new(make)));
        self
    }

    /// Assemble the runtime.
    ///
    /// Fails when any configuration section is invalid, when a declared
    /// capability has no handler or a handler has no capability, or when a
    /// remediation names a tier that is not configured.
    pub fn build(self) -> WardenResult<Warden> {
        let WardenBuilder { config, clock, capabilities, tools, mut remediations } = self;

        let mute = Arc::new(MuteAgent::new());
        for capability in config.capabilities.into_iter().chain(capabilities) {
            mute.register(capability)?;
        }
        let declared = mute.tools();
        let handled = tools.names();
        if let Some(missing) = declared.iter().find(|t| !tools.contains(t)) {
            return Err(WardenError::Registration {
                reason: format!("capability '{missing}' has no handler"),
            });
        }
        if let Some(orphan) = handled.iter().find(|t| !declared.contains(t)) {
            return Err(WardenError::Registration {
                reason: format!("handler '{orphan}' has no capability"),
            });
        }

        let policy = Arc::new(PolicyEngine::from_config(config.policy)?);
        let constraints = Arc::new(ConstraintGraphs::from_config(config.constraints, clock)?);
        let recorder = Arc::new(match &config.audit.path {
            Some(path) => FlightRecorder::open(path)?,
            None => FlightRecorder::in_memory(),
        });

        let queue = Arc::new(ReviewQueue::default());
        let mut supervisors = SupervisorHierarchy::new();
        for tier in &config.supervisors {
            let mut supervisor = Supervisor::from_config(tier)?.with_queue(Arc::clone(&queue));
            if let Some(i) = remediations.iter().position(|(name, _)| *name == tier.name) {
                let (_, make) = remediations.swap_remove(i);
                let log: Arc<dyn FlightLog> = recorder.clone();
                supervisor = supervisor.with_remediation(make(&policy), log);
                info!(supervisor = %tier.name, "remediation enabled");
            }
            supervisors = supervisors.tier(Arc::new(supervisor));
        }
        if let Some((name, _)) = remediations.first() {
            return Err(WardenError::Registration {
                reason: format!("remediation names unknown supervisor tier '{name}'"),
            });
        }

        let engine = ExecutionEngine::new(
            tools,
            Duration::from_millis(config.kernel.execution_timeout_ms),
        );
        let kernel = AgentKernel::new(
            mute.clone(),
            policy.clone(),
            constraints.clone(),
            recorder.clone(),
            engine,
        )
        .with_validator(config.kernel.validator()?)
        .with_shadow_mode(config.kernel.shadow_mode)
        .with_audit_failure_mode(config.kernel.audit_failure_mode);

        info!(
            tools = declared.len(),
            supervisor_tiers = config.supervisors.len(),
            shadow_mode = config.kernel.shadow_mode,
            "warden runtime assembled"
        );

        Ok(Warden {
            kernel: Arc::new(kernel),
            policy,
            constraints,
            mute,
            recorder,
            supervisors: Arc::new(supervisors),
            review_queue: queue,
        })
    }
}

/// Handles to every component of a running WARDEN stack.
#[derive(Clone)]
pub struct Warden {
    kernel: Arc<AgentKernel>,
    policy: Arc<PolicyEngine>,
    constraints: Arc<ConstraintGraphs>,
    mute: Arc<MuteAgent>,
    recorder: Arc<FlightRecorder>,
    supervisors: Arc<SupervisorHierarchy>,
    review_queue: Arc<ReviewQueue>,
}

impl Warden {
    pub fn builder(config: WardenConfig) -> WardenBuilder {
        WardenBuilder::new(config)
    }

    pub fn intercept(&self, request: ActionRequest) -> ExecutionResult {
        self.kernel.intercept(request)
    }

    pub async fn intercept_async(&self, request: ActionRequest) -> ExecutionResult {
        self.kernel.intercept_async(request).await
    }

    pub fn kernel(&self) -> &Arc<AgentKernel> {
        &self.kernel
    }

    pub fn policy(&self) -> &Arc<PolicyEngine> {
        &self.policy
    }

    pub fn constraints(&self) -> &Arc<ConstraintGraphs> {
        &self.constraints
    }

    pub fn mute(&self) -> &Arc<MuteAgent> {
        &self.mute
    }

    pub fn recorder(&self) -> &Arc<FlightRecorder> {
        &self.recorder
    }

    pub fn supervisors(&self) -> &Arc<SupervisorHierarchy> {
        &self.supervisors
    }

    /// Anomalies raised by the configured supervisors, awaiting review.
    pub fn review_queue(&self) -> &Arc<ReviewQueue> {
        &self.review_queue
    }

    pub fn query_logs(&self, query: &AuditQuery) -> Vec<AuditRecord> {
        self.recorder.query_logs(query)
    }

    pub fn statistics(&self) -> AuditStatistics {
        self.recorder.get_statistics()
    }

    pub fn verify_integrity(&self) -> bool {
        self.recorder.verify_integrity()
    }

    /// Run the supervisor tiers against the live audit stream on the
    /// current Tokio runtime. `None` when no supervisors are configured.
    pub fn spawn_supervisors(&self) -> Option<JoinHandle<()>> {
        if self.supervisors.tiers().is_empty() {
            return None;
        }
        let supervisors = Arc::clone(&self.supervisors);
        let receiver = self.recorder.subscribe();
        Some(tokio::spawn(async move { supervisors.watch(receiver).await }))
    }
}
