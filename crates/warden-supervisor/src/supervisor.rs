//! `Supervisor`: one tier of anomaly detection over the audit stream.
//!
//! For every signal the supervisor updates the signal's series, runs each
//! strategy against it, and raises an `Anomaly` per finding. A strategy
//! fires at most once per window for the same series. Anomalies go to the
//! review queue; remediation only happens when one is attached.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use uuid::Uuid;

use warden_contracts::{
    action::ActionRequest,
    agent::AgentId,
    audit::{AuditRecord, TerminalOutcome},
    error::WardenResult,
};
use warden_core::traits::FlightLog;

use crate::baseline::Baselines;
use crate::config::SupervisorConfig;
use crate::remediation::Remediation;
use crate::review::ReviewQueue;
use crate::signal::{Anomaly, Signal, ORIGIN_KEY, SUPERVISOR_ORIGIN};
use crate::strategy::DetectionStrategy;

type FlagKey = (String, AgentId, String);

struct SeriesState {
    baselines: Baselines,
    /// When each (strategy, agent, subject) last fired.
    last_flagged: HashMap<FlagKey, DateTime<Utc>>,
    last_cleanup: Option<DateTime<Utc>>,
}

struct AuditedRemediation {
    action: Box<dyn Remediation>,
    log: Arc<dyn FlightLog>,
}

pub struct Supervisor {
    name: String,
    window: Duration,
    state: Mutex<SeriesState>,
    strategies: Vec<Box<dyn DetectionStrategy>>,
    queue: Arc<ReviewQueue>,
    remediation: Option<AuditedRemediation>,
}

impl Supervisor {
    /// A supervisor with no strategies, feeding its own review queue.
    pub fn new(name: impl Into<String>, window: Duration, history_windows: u32) -> Self {
        Self {
            name: name.into(),
            window,
            state: Mutex::new(SeriesState {
                baselines: Baselines::new(window, history_windows),
                last_flagged: HashMap::new(),
                last_cleanup: None,
            }),
            strategies: Vec::new(),
            queue: Arc::new(ReviewQueue::default()),
            remediation: None,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> WardenResult<Self> {
        config.validate()?;
        let window = Duration::seconds(config.window_secs as i64);
        let mut supervisor = Self::new(config.name.clone(), window, config.history_windows);
        for strategy in &config.strategies {
            supervisor = supervisor.with_strategy(strategy.build());
        }
        Ok(supervisor)
    }

    pub fn with_strategy(mut self, strategy: Box<dyn DetectionStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Share a review queue with other supervisors.
    pub fn with_queue(mut self, queue: Arc<ReviewQueue>) -> Self {
        self.queue = queue;
        self
    }

    /// Opt in to automatic remediation. Each remediation is recorded in
    /// `log` as its own trace.
    pub fn with_remediation(mut self, action: Box<dyn Remediation>, log: Arc<dyn FlightLog>) -> Self {
        self.remediation = Some(AuditedRemediation { action, log });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<ReviewQueue> {
        &self.queue
    }

    /// Number of (agent, subject) series and of live per-series flags.
    pub fn tracked(&self) -> (usize, usize) {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (state.baselines.len(), state.last_flagged.len())
    }

    /// Feed one signal and return the anomalies it raised.
    pub fn observe(&self, signal: &Signal) -> Vec<Anomaly> {
        let anomalies = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let SeriesState { baselines, last_flagged, last_cleanup } = &mut *state;
            let stats = baselines.observe(signal);

            let mut raised = Vec::new();
            for strategy in &self.strategies {
                let Some(finding) = strategy.inspect(signal, &stats) else {
                    continue;
                };
                let key = (strategy.name().to_string(), signal.agent_id.clone(), signal.subject.clone());
                if last_flagged
                    .get(&key)
                    .is_some_and(|last| signal.at - *last < self.window)
                {
                    continue;
                }
                last_flagged.insert(key, signal.at);

                raised.push(Anomaly {
                    id: Uuid::new_v4(),
                    supervisor: self.name.clone(),
                    strategy: strategy.name().to_string(),
                    agent_id: signal.agent_id.clone(),
                    subject: signal.subject.clone(),
                    observed: finding.observed,
                    threshold: finding.threshold,
                    detail: finding.detail,
                    detected_at: signal.at,
                });
            }

            // A flag older than one window no longer suppresses anything.
            if let Some(latest) = baselines.latest() {
                if last_cleanup.map_or(true, |t| latest - t >= self.window) {
                    last_flagged.retain(|_, at| latest - *at < self.window);
                    *last_cleanup = Some(latest);
                }
            }
            raised
        };

        for anomaly in &anomalies {
            warn!(
                supervisor = %self.name,
                strategy = %anomaly.strategy,
                agent_id = %anomaly.agent_id,
                subject = %anomaly.subject,
                observed = anomaly.observed,
                threshold = anomaly.threshold,
                "anomaly detected"
            );
            self.queue.push(anomaly.clone());
            if let Some(remediation) = &self.remediation {
                self.remediate(remediation, anomaly);
            }
        }
        anomalies
    }

    /// Feed one audit record. Pending records raise nothing.
    pub fn observe_record(&self, record: &AuditRecord) -> Vec<Anomaly> {
        Signal::from_record(record).map_or_else(Vec::new, |signal| self.observe(&signal))
    }

    /// Feed a batch of records in order.
    pub fn ingest(&self, records: &[AuditRecord]) -> Vec<Anomaly> {
        records.iter().flat_map(|r| self.observe_record(r)).collect()
    }

    /// Follow a live record stream until it closes.
    pub async fn watch(&self, receiver: broadcast::Receiver<AuditRecord>) {
        follow(&self.name, receiver, |record| {
            self.observe_record(record);
        })
        .await
    }

    fn remediate(&self, remediation: &AuditedRemediation, anomaly: &Anomaly) {
        let args = serde_json::to_value(anomaly).unwrap_or(Value::Null);
        let request = ActionRequest::new(
            format!("supervisor:{}", self.name),
            format!("remediate:{}", remediation.action.name()),
            args,
        );

        let trace_id = match remediation.log.start_trace(&request) {
            Ok(trace_id) => trace_id,
            Err(e) => {
                error!(
                    supervisor = %self.name,
                    anomaly_id = %anomaly.id,
                    error = %e,
                    "remediation skipped: flight log unavailable"
                );
                return;
            }
        };

        let started = Instant::now();
        let result = remediation.action.apply(anomaly);
        let elapsed_ms = started.elapsed().as_millis() as u64;
        let outcome = match result {
            Ok(value) => TerminalOutcome::success(value, elapsed_ms),
            Err(e) => TerminalOutcome::error(e.to_string(), elapsed_ms),
        }
        .with_meta(ORIGIN_KEY, SUPERVISOR_ORIGIN)
        .with_meta("anomaly_id", anomaly.id.to_string());

        match remediation.log.finish_trace(&trace_id, outcome) {
            Ok(()) => info!(
                supervisor = %self.name,
                remediation = %remediation.action.name(),
                agent_id = %anomaly.agent_id,
                trace_id = %trace_id,
                "remediation applied"
            ),
            Err(e) => error!(
                supervisor = %self.name,
                trace_id = %trace_id,
                error = %e,
                "remediation outcome could not be recorded"
            ),
        }
    }
}

/// Drive `on_record` from a broadcast stream until every sender is gone.
pub(crate) async fn follow(
    name: &str,
    mut receiver: broadcast::Receiver<AuditRecord>,
    mut on_record: impl FnMut(&AuditRecord),
) {
    loop {
        match receiver.recv().await {
            Ok(record) => on_record(&record),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(supervisor = %name, skipped, "supervisor fell behind the audit stream");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
