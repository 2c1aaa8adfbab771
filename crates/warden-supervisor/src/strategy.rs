//! Pluggable detection strategies.
//!
//! A strategy looks at one series' counts after each observation and either
//! stays quiet or reports a `Finding`. Thresholds live on the strategy
//! objects, never in the supervisor.

use crate::baseline::WindowStats;
use crate::signal::Signal;

/// What a strategy reports when a series crosses its threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub observed: f64,
    pub threshold: f64,
    pub detail: String,
}

pub trait DetectionStrategy: Send + Sync {
    /// Inspect the series `signal` belongs to.
    fn inspect(&self, signal: &Signal, stats: &WindowStats) -> Option<Finding>;

    /// Name of this strategy, recorded on every anomaly it raises.
    fn name(&self) -> &str;
}

// ── 1. Rate ceiling ───────────────────────────────────────────────────────────

/// Flags a series with more than `max_per_window` observations in the
/// current window.
pub struct RateCeiling {
    pub max_per_window: u64,
}

impl RateCeiling {
    pub fn new(max_per_window: u64) -> Self {
        Self { max_per_window }
    }
}

impl DetectionStrategy for RateCeiling {
    fn inspect(&self, signal: &Signal, stats: &WindowStats) -> Option<Finding> {
        (stats.count > self.max_per_window).then(|| Finding {
            observed: stats.count as f64,
            threshold: self.max_per_window as f64,
            detail: format!(
                "{} calls to '{}' in one window (ceiling {})",
                stats.count, signal.subject, self.max_per_window
            ),
        })
    }

    fn name(&self) -> &str {
        "rate_ceiling"
    }
}

// ── 2. Baseline surge ─────────────────────────────────────────────────────────

/// Flags a series whose current window exceeds `factor` times its mean per
/// window over the history. Quiet until the series has any history and at
/// least `min_count` observations in the current window.
pub struct BaselineSurge {
    pub factor: f64,
    pub min_count: u64,
}

impl BaselineSurge {
    pub fn new(factor: f64, min_count: u64) -> Self {
        Self { factor, min_count }
    }
}

impl DetectionStrategy for BaselineSurge {
    fn inspect(&self, signal: &Signal, stats: &WindowStats) -> Option<Finding> {
        if stats.history == 0 || stats.count < self.min_count {
            return None;
        }
        let threshold = stats.baseline() * self.factor;
        let observed = stats.count as f64;
        (observed > threshold).then(|| Finding {
            observed,
            threshold,
            detail: format!(
                "'{}' at {} calls per window against a baseline of {:.2}",
                signal.subject,
                stats.count,
                stats.baseline()
            ),
        })
    }

    fn name(&self) -> &str {
        "baseline_surge"
    }
}

// ── 3. Blocked ratio ──────────────────────────────────────────────────────────

/// Flags a series where more than `max_ratio` of the current window was
/// blocked. Repeated denials are how policy probing looks from outside.
pub struct BlockedRatio {
    pub max_ratio: f64,
    pub min_count: u64,
}

impl BlockedRatio {
    pub fn new(max_ratio: f64, min_count: u64) -> Self {
        Self { max_ratio, min_count }
    }
}

impl DetectionStrategy for BlockedRatio {
    fn inspect(&self, signal: &Signal, stats: &WindowStats) -> Option<Finding> {
        if stats.count < self.min_count {
            return None;
        }
        let ratio = stats.blocked_ratio();
        (ratio > self.max_ratio).then(|| Finding {
            observed: ratio,
            threshold: self.max_ratio,
            detail: format!(
                "{} of {} calls to '{}' blocked in one window",
                stats.blocked, stats.count, signal.subject
            ),
        })
    }

    fn name(&self) -> &str {
        "blocked_ratio"
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use warden_contracts::{action::TraceId, agent::AgentId, policy::Verdict};

    use super::{BaselineSurge, BlockedRatio, DetectionStrategy, RateCeiling};
    use crate::baseline::WindowStats;
    use crate::signal::{Signal, SignalSource};

    fn signal() -> Signal {
        Signal {
            agent_id: AgentId::new("bot"),
            subject: "export".to_string(),
            at: Utc::now(),
            blocked: false,
            source: SignalSource::Audit {
                trace_id: TraceId::new(),
                verdict: Verdict::Allowed,
            },
        }
    }

    fn stats(count: u64, blocked: u64, history: u64) -> WindowStats {
        WindowStats { count, blocked, history, history_windows: 4 }
    }

    #[test]
    fn rate_ceiling() {
        let strategy = RateCeiling::new(5);
        assert!(strategy.inspect(&signal(), &stats(5, 0, 0)).is_none());
        let finding = strategy.inspect(&signal(), &stats(6, 0, 0)).unwrap();
        assert_eq!(finding.observed, 6.0);
    }

    #[test]
    fn baseline_surge_needs_history() {
        let strategy = BaselineSurge::new(3.0, 2);
        assert!(strategy.inspect(&signal(), &stats(50, 0, 0)).is_none());
        // history 8 over 4 windows: baseline 2, threshold 6
        assert!(strategy.inspect(&signal(), &stats(6, 0, 8)).is_none());
        assert!(strategy.inspect(&signal(), &stats(7, 0, 8)).is_some());
    }

    #[test]
    fn blocked_ratio_respects_min_count() {
        let strategy = BlockedRatio::new(0.5, 4);
        assert!(strategy.inspect(&signal(), &stats(3, 3, 0)).is_none());
        assert!(strategy.inspect(&signal(), &stats(4, 2, 0)).is_none());
        assert!(strategy.inspect(&signal(), &stats(4, 3, 0)).is_some());
    }
}
