//! What supervisors consume and what they emit.
//!
//! A tier-one supervisor sees one `Signal` per sealed audit record. A
//! higher tier sees one `Signal` per anomaly raised by the tier below it,
//! so every tier runs the same code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use warden_contracts::{
    action::TraceId,
    agent::AgentId,
    audit::AuditRecord,
    policy::Verdict,
};

/// Metadata key marking audit records written by a supervisor itself.
pub const ORIGIN_KEY: &str = "origin";
pub const SUPERVISOR_ORIGIN: &str = "supervisor";

/// Subject under which a higher tier groups an agent's anomalies.
pub const ANOMALY_SUBJECT: &str = "anomaly";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SignalSource {
    Audit { trace_id: TraceId, verdict: Verdict },
    Anomaly { anomaly_id: Uuid, supervisor: String, strategy: String },
}

/// One observation for one (agent, subject) series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub agent_id: AgentId,
    /// Tool name for audit signals, `ANOMALY_SUBJECT` for anomaly signals.
    pub subject: String,
    pub at: DateTime<Utc>,
    pub blocked: bool,
    pub source: SignalSource,
}

impl Signal {
    /// The signal for a sealed record. `None` for pending records and for
    /// records a supervisor wrote about its own remediation.
    pub fn from_record(record: &AuditRecord) -> Option<Self> {
        let verdict = record.policy_verdict?;
        if record.metadata.get(ORIGIN_KEY).and_then(Value::as_str) == Some(SUPERVISOR_ORIGIN) {
            return None;
        }
        Some(Self {
            agent_id: record.agent_id.clone(),
            subject: record.tool_name.clone(),
            at: record.completed_at.unwrap_or(record.timestamp),
            blocked: verdict == Verdict::Blocked,
            source: SignalSource::Audit {
                trace_id: record.trace_id.clone(),
                verdict,
            },
        })
    }

    pub fn from_anomaly(anomaly: &Anomaly) -> Self {
        Self {
            agent_id: anomaly.agent_id.clone(),
            subject: ANOMALY_SUBJECT.to_string(),
            at: anomaly.detected_at,
            blocked: false,
            source: SignalSource::Anomaly {
                anomaly_id: anomaly.id,
                supervisor: anomaly.supervisor.clone(),
                strategy: anomaly.strategy.clone(),
            },
        }
    }
}

/// A deviation one strategy found in one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub id: Uuid,
    /// Name of the supervisor that raised it.
    pub supervisor: String,
    /// Name of the detection strategy that fired.
    pub strategy: String,
    pub agent_id: AgentId,
    pub subject: String,
    pub observed: f64,
    pub threshold: f64,
    pub detail: String,
    /// Time of the signal that tipped the series over.
    pub detected_at: DateTime<Utc>,
}
