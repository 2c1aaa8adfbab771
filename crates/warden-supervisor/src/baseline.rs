//! Rolling per-(agent, subject) baselines.
//!
//! Each series keeps the observations of the current window plus
//! `history_windows` windows before it. Anything older is pruned on the
//! next observation, so memory per series is bounded by traffic inside
//! that horizon. Once per window, series whose newest observation has
//! fallen out of the horizon are forgotten altogether.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};

use warden_contracts::agent::AgentId;

use crate::signal::Signal;

/// Counts for one series as of its latest observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowStats {
    /// Observations in the current window.
    pub count: u64,
    /// Blocked observations in the current window.
    pub blocked: u64,
    /// Observations in the history before the current window.
    pub history: u64,
    pub history_windows: u32,
}

impl WindowStats {
    /// Mean observations per window over the history.
    pub fn baseline(&self) -> f64 {
        if self.history_windows == 0 {
            return 0.0;
        }
        self.history as f64 / f64::from(self.history_windows)
    }

    pub fn blocked_ratio(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.blocked as f64 / self.count as f64
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    at: DateTime<Utc>,
    blocked: bool,
}

type SeriesKey = (AgentId, String);

#[derive(Debug)]
pub struct Baselines {
    window: Duration,
    history_windows: u32,
    series: HashMap<SeriesKey, VecDeque<Observation>>,
    /// Newest observation across every series.
    latest: Option<DateTime<Utc>>,
    last_sweep: Option<DateTime<Utc>>,
}

impl Baselines {
    pub fn new(window: Duration, history_windows: u32) -> Self {
        Self {
            window,
            history_windows,
            series: HashMap::new(),
            latest: None,
            last_sweep: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Newest observation seen in any series.
    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.latest
    }

    /// Forget every series with nothing inside the horizon ending at `now`.
    pub fn sweep(&mut self, now: DateTime<Utc>) {
        let horizon = now - self.window * (self.history_windows as i32 + 1);
        self.series
            .retain(|_, series| series.back().is_some_and(|o| o.at > horizon));
        self.last_sweep = Some(now);
    }

    /// Add `signal` to its series and return the series' counts.
    ///
    /// Windows are anchored at the newest observation in the series, so a
    /// late signal is counted but never moves the window backwards.
    pub fn observe(&mut self, signal: &Signal) -> WindowStats {
        let stats = self.record(signal);

        let latest = self.latest.map_or(signal.at, |l| l.max(signal.at));
        self.latest = Some(latest);
        if self.last_sweep.map_or(true, |t| latest - t >= self.window) {
            self.sweep(latest);
        }
        stats
    }

    fn record(&mut self, signal: &Signal) -> WindowStats {
        let series = self
            .series
            .entry((signal.agent_id.clone(), signal.subject.clone()))
            .or_default();

        let position = series.partition_point(|o| o.at <= signal.at);
        series.insert(
            position,
            Observation {
                at: signal.at,
                blocked: signal.blocked,
            },
        );

        let Some(newest) = series.back().map(|o| o.at) else {
            return WindowStats::default();
        };
        let window_start = newest - self.window;
        let horizon = window_start - self.window * self.history_windows as i32;
        while series.front().is_some_and(|o| o.at <= horizon) {
            series.pop_front();
        }

        let mut stats = WindowStats {
            history_windows: self.history_windows,
            ..WindowStats::default()
        };
        for observation in series.iter() {
            if observation.at > window_start {
                stats.count += 1;
                stats.blocked += u64::from(observation.blocked);
            } else {
                stats.history += 1;
            }
        }
        stats
    }

    /// Number of series being tracked.
    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use warden_contracts::{action::TraceId, agent::AgentId, policy::Verdict};

    use super::Baselines;
    use crate::signal::{Signal, SignalSource};

    fn signal(minute: i64, blocked: bool) -> Signal {
        Signal {
            agent_id: AgentId::new("bot"),
            subject: "read_report".to_string(),
            at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap() + Duration::minutes(minute),
            blocked,
            source: SignalSource::Audit {
                trace_id: TraceId::new(),
                verdict: if blocked { Verdict::Blocked } else { Verdict::Allowed },
            },
        }
    }

    #[test]
    fn counts_split_between_window_and_history() {
        let mut baselines = Baselines::new(Duration::minutes(1), 3);
        for minute in [0, 1, 2] {
            baselines.observe(&signal(minute, false));
        }
        let stats = baselines.observe(&signal(3, true));

        assert_eq!(stats.count, 1);
        assert_eq!(stats.blocked, 1);
        assert_eq!(stats.history, 3);
        assert!((stats.baseline() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn old_observations_are_pruned() {
        let mut baselines = Baselines::new(Duration::minutes(1), 1);
        baselines.observe(&signal(0, false));
        let stats = baselines.observe(&signal(10, false));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.history, 0);
    }

    #[test]
    fn idle_series_are_forgotten() {
        let mut baselines = Baselines::new(Duration::minutes(1), 2);
        for n in 0..50 {
            let mut idle = signal(0, true);
            idle.agent_id = AgentId::new(format!("agent-{n}"));
            baselines.observe(&idle);
        }
        assert_eq!(baselines.len(), 50);

        // Still inside the three-minute horizon.
        baselines.observe(&signal(2, false));
        assert_eq!(baselines.len(), 51);

        baselines.observe(&signal(4, false));
        assert_eq!(baselines.len(), 1);
    }

    #[test]
    fn late_signal_does_not_move_the_window() {
        let mut baselines = Baselines::new(Duration::minutes(5), 2);
        baselines.observe(&signal(20, false));
        let stats = baselines.observe(&signal(12, true));
        assert_eq!(stats.count, 1);
        assert_eq!(stats.history, 1);
        assert_eq!(stats.blocked, 0);
    }
}
