//! The review queue: where anomalies wait for a human.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;
use uuid::Uuid;

use crate::signal::Anomaly;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// A bounded FIFO of unreviewed anomalies. When full, the oldest entry is
/// dropped with a warning.
#[derive(Debug)]
pub struct ReviewQueue {
    pending: Mutex<VecDeque<Anomaly>>,
    capacity: usize,
}

impl Default for ReviewQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReviewQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Anomaly>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, anomaly: Anomaly) {
        let mut pending = self.lock();
        if pending.len() >= self.capacity {
            if let Some(dropped) = pending.pop_front() {
                warn!(anomaly_id = %dropped.id, "review queue full; oldest anomaly dropped");
            }
        }
        pending.push_back(anomaly);
    }

    /// Unreviewed anomalies, oldest first.
    pub fn pending(&self) -> Vec<Anomaly> {
        self.lock().iter().cloned().collect()
    }

    /// Mark one anomaly reviewed and hand it back.
    pub fn acknowledge(&self, id: Uuid) -> Option<Anomaly> {
        let mut pending = self.lock();
        let position = pending.iter().position(|a| a.id == id)?;
        pending.remove(position)
    }

    pub fn drain(&self) -> Vec<Anomaly> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
