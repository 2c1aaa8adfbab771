//! Quota counters.
//!
//! Counters live outside the graph snapshots so swapping in a new snapshot
//! never resets consumption. Each counter is an `Arc<AtomicU64>` that
//! `QuotaHold` reserves against with compare-and-swap.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use warden_contracts::agent::AgentId;
use warden_core::quota::QuotaHold;

use crate::rules::{QuotaRule, QuotaScope};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    quota_id: String,
    agent: Option<AgentId>,
}

#[derive(Debug, Default)]
pub struct QuotaLedger {
    counters: Mutex<HashMap<CounterKey, Arc<AtomicU64>>>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(quota: &QuotaRule, agent_id: &AgentId) -> CounterKey {
        CounterKey {
            quota_id: quota.id.clone(),
            agent: match quota.scope {
                QuotaScope::Shared => None,
                QuotaScope::PerAgent => Some(agent_id.clone()),
            },
        }
    }

    fn counter(&self, key: CounterKey) -> Arc<AtomicU64> {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(counters.entry(key).or_default())
    }

    /// Reserve `units` of `quota` for `agent_id`. `None` when the quota
    /// would be exceeded.
    pub fn reserve(&self, quota: &QuotaRule, agent_id: &AgentId, units: u64) -> Option<QuotaHold> {
        let counter = self.counter(Self::key(quota, agent_id));
        QuotaHold::try_reserve(quota.id.clone(), &counter, units, quota.limit)
    }

    /// Units currently consumed or held.
    pub fn usage(&self, quota: &QuotaRule, agent_id: &AgentId) -> u64 {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters
            .get(&Self::key(quota, agent_id))
            .map_or(0, |c| c.load(Ordering::Acquire))
    }

    /// Forget every counter of `quota_id`. Outstanding holds settle against
    /// the old counters.
    pub fn reset(&self, quota_id: &str) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.retain(|key, _| key.quota_id != quota_id);
    }
}

#[cfg(test)]
mod tests {
    use warden_contracts::{agent::AgentId, constraint::ActionSelector};

    use super::QuotaLedger;
    use crate::rules::QuotaRule;

    #[test]
    fn shared_quota_is_pooled_across_agents() {
        let ledger = QuotaLedger::new();
        let quota = QuotaRule::new("calls", ActionSelector::any(), 3);
        let (a, b) = (AgentId::new("a"), AgentId::new("b"));

        let holds: Vec<_> = [&a, &b, &a].iter().filter_map(|id| ledger.reserve(&quota, id, 1)).collect();
        assert_eq!(holds.len(), 3);
        assert!(ledger.reserve(&quota, &b, 1).is_none());
        assert_eq!(ledger.usage(&quota, &a), 3);
    }

    #[test]
    fn per_agent_quota_is_separate() {
        let ledger = QuotaLedger::new();
        let quota = QuotaRule::new("calls", ActionSelector::any(), 1).per_agent();
        let (a, b) = (AgentId::new("a"), AgentId::new("b"));

        let first = ledger.reserve(&quota, &a, 1).unwrap();
        first.commit();
        assert!(ledger.reserve(&quota, &a, 1).is_none());
        assert!(ledger.reserve(&quota, &b, 1).is_some());
    }

    #[test]
    fn reset_starts_from_zero_without_disturbing_holds() {
        let ledger = QuotaLedger::new();
        let quota = QuotaRule::new("calls", ActionSelector::any(), 2);
        let agent = AgentId::new("a");

        let held = ledger.reserve(&quota, &agent, 2).unwrap();
        ledger.reset("calls");
        assert_eq!(ledger.usage(&quota, &agent), 0);
        drop(held);
        assert_eq!(ledger.usage(&quota, &agent), 0);
        assert!(ledger.reserve(&quota, &agent, 2).is_some());
    }
}
