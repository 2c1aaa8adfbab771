//! Stacked supervisors.
//!
//! Tier 0 sees audit records. Every anomaly a tier raises becomes a signal
//! for the tier above it, which groups them per agent under the `anomaly`
//! subject. The same strategies therefore answer questions like "this
//! agent keeps tripping detectors" one level up.

use std::sync::Arc;

use tokio::sync::broadcast;

use warden_contracts::audit::AuditRecord;

use crate::signal::{Anomaly, Signal};
use crate::supervisor::{follow, Supervisor};

#[derive(Default)]
pub struct SupervisorHierarchy {
    tiers: Vec<Arc<Supervisor>>,
}

impl SupervisorHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tier above the existing ones.
    pub fn tier(mut self, supervisor: Arc<Supervisor>) -> Self {
        self.tiers.push(supervisor);
        self
    }

    pub fn tiers(&self) -> &[Arc<Supervisor>] {
        &self.tiers
    }

    /// Feed one record through every tier. Returns the anomalies of all
    /// tiers, lowest tier first.
    pub fn observe_record(&self, record: &AuditRecord) -> Vec<Anomaly> {
        let Some(signal) = Signal::from_record(record) else {
            return Vec::new();
        };

        let mut signals = vec![signal];
        let mut raised = Vec::new();
        for tier in &self.tiers {
            let found: Vec<Anomaly> = signals.iter().flat_map(|s| tier.observe(s)).collect();
            if found.is_empty() {
                break;
            }
            signals = found.iter().map(Signal::from_anomaly).collect();
            raised.extend(found);
        }
        raised
    }

    pub fn ingest(&self, records: &[AuditRecord]) -> Vec<Anomaly> {
        records.iter().flat_map(|r| self.observe_record(r)).collect()
    }

    /// Follow a live record stream until it closes.
    pub async fn watch(&self, receiver: broadcast::Receiver<AuditRecord>) {
        follow("hierarchy", receiver, |record| {
            self.observe_record(record);
        })
        .await
    }
}
