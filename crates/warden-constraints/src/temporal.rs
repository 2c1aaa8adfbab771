//! The temporal graph: named time-of-day windows.
//!
//! Windows are evaluated in UTC against the time of day only. A window whose
//! start is later than its end wraps midnight (`22:00-06:00`). Start is
//! inclusive, end exclusive.
//!
//! - A `deny` window denies selected actions inside it.
//! - If any `allow` window selects an action, the action is allowed only
//!   inside one of those windows.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use warden_contracts::constraint::{ActionSelector, ConstraintAction};
use warden_core::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEffect {
    Deny,
    Allow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub name: String,
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    pub effect: WindowEffect,
    #[serde(flatten)]
    pub selector: ActionSelector,
}

impl TimeWindow {
    pub fn new(
        name: impl Into<String>,
        start: NaiveTime,
        end: NaiveTime,
        effect: WindowEffect,
        selector: ActionSelector,
    ) -> Self {
        Self { name: name.into(), start, end, effect, selector }
    }

    /// True if `time` falls inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time < self.end
        } else {
            time >= self.start || time < self.end
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TemporalGraph {
    windows: Vec<TimeWindow>,
}

impl TemporalGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a window. Fails if the name is taken or the window is empty.
    pub fn add_window(&mut self, window: TimeWindow) -> Result<(), String> {
        if window.start == window.end {
            return Err(format!("window '{}' starts and ends at the same time", window.name));
        }
        if self.windows.iter().any(|w| w.name == window.name) {
            return Err(format!("window '{}' is already registered", window.name));
        }
        self.windows.push(window);
        Ok(())
    }

    pub fn remove_window(&mut self, name: &str) -> bool {
        let before = self.windows.len();
        self.windows.retain(|w| w.name != name);
        before != self.windows.len()
    }

    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    pub fn is_allowed_now(&self, action: &ConstraintAction, clock: &dyn Clock) -> bool {
        self.evaluate_at(action, clock.now()).is_ok()
    }

    /// Judge `action` at instant `now`, naming the deciding window on
    /// denial.
    pub fn evaluate_at(&self, action: &ConstraintAction, now: DateTime<Utc>) -> Result<(), String> {
        let time = now.time();
        let selected = || {
            self.windows
                .iter()
                .filter(|w| w.selector.matches(&action.tool_name, action.access))
        };

        if let Some(window) = selected().find(|w| w.effect == WindowEffect::Deny && w.contains(time)) {
            return Err(format!(
                "'{}' is not permitted during window '{}' ({}-{} UTC)",
                action.tool_name,
                window.name,
                window.start.format("%H:%M"),
                window.end.format("%H:%M")
            ));
        }

        let mut allow_windows = selected().filter(|w| w.effect == WindowEffect::Allow).peekable();
        if allow_windows.peek().is_some() && !allow_windows.any(|w| w.contains(time)) {
            return Err(format!(
                "'{}' is only permitted inside its allow windows",
                action.tool_name
            ));
        }
        Ok(())
    }
}

/// `HH:MM` or `HH:MM:SS` time-of-day strings.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time of day '{s}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Utc};
    use serde_json::Map;

    use warden_contracts::{
        agent::AgentId,
        constraint::{ActionSelector, ConstraintAction},
        policy::PermissionLevel,
    };

    use super::{TemporalGraph, TimeWindow, WindowEffect};

    fn at(hour: u32, minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 14, hour, minute, 0).unwrap()
    }

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn action(tool: &str, access: PermissionLevel) -> ConstraintAction {
        ConstraintAction {
            agent_id: AgentId::new("bot"),
            tool_name: tool.to_string(),
            access,
            args: Map::new(),
            context: Map::new(),
            resource: None,
            resource_missing: false,
        }
    }

    #[test]
    fn deny_window_blocks_writes_inside_it() {
        let mut graph = TemporalGraph::new();
        graph
            .add_window(TimeWindow::new("freeze", hm(2, 0), hm(4, 0), WindowEffect::Deny, ActionSelector::writes()))
            .unwrap();

        let write = action("update_ledger", PermissionLevel::ReadWrite);
        let read = action("read_ledger", PermissionLevel::ReadOnly);

        assert!(graph.evaluate_at(&write, at(3, 0)).is_err());
        assert!(graph.evaluate_at(&write, at(2, 0)).is_err());
        assert!(graph.evaluate_at(&write, at(4, 0)).is_ok());
        assert!(graph.evaluate_at(&write, at(5, 0)).is_ok());
        assert!(graph.evaluate_at(&read, at(3, 0)).is_ok());
    }

    #[test]
    fn windows_wrap_midnight() {
        let window = TimeWindow::new("night", hm(22, 0), hm(6, 0), WindowEffect::Deny, ActionSelector::any());
        assert!(window.contains(hm(23, 30)));
        assert!(window.contains(hm(0, 0)));
        assert!(window.contains(hm(5, 59)));
        assert!(!window.contains(hm(6, 0)));
        assert!(!window.contains(hm(12, 0)));
    }

    #[test]
    fn allow_windows_confine_selected_actions() {
        let mut graph = TemporalGraph::new();
        graph
            .add_window(TimeWindow::new(
                "business-hours",
                hm(9, 0),
                hm(17, 0),
                WindowEffect::Allow,
                ActionSelector::tools(["wire_transfer"]),
            ))
            .unwrap();

        let wire = action("wire_transfer", PermissionLevel::ReadWrite);
        assert!(graph.evaluate_at(&wire, at(10, 0)).is_ok());
        assert!(graph.evaluate_at(&wire, at(20, 0)).is_err());
        assert!(graph.evaluate_at(&action("lookup", PermissionLevel::ReadOnly), at(20, 0)).is_ok());
    }

    #[test]
    fn empty_and_duplicate_windows_are_rejected() {
        let mut graph = TemporalGraph::new();
        let w = TimeWindow::new("w", hm(1, 0), hm(2, 0), WindowEffect::Deny, ActionSelector::any());
        graph.add_window(w.clone()).unwrap();
        assert!(graph.add_window(w).is_err());
        assert!(graph
            .add_window(TimeWindow::new("zero", hm(1, 0), hm(1, 0), WindowEffect::Deny, ActionSelector::any()))
            .is_err());
        assert!(graph.remove_window("w"));
    }
}
