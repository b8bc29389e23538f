//! Daily display on/off window plus the manual override set from the web.

use chrono::{Local, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::config::DisplayOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayOverride {
    #[default]
    Auto,
    On,
    Off,
}

impl DisplayOverride {
    pub fn parse(action: &str) -> Option<Self> {
        match action.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    /// `None` for auto, otherwise whether the display is forced on.
    pub fn forced(&self) -> Option<bool> {
        match self {
            Self::Auto => None,
            Self::On => Some(true),
            Self::Off => Some(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySchedule {
    pub on: NaiveTime,
    pub off: NaiveTime,
}

impl DisplaySchedule {
    pub fn from_options(opts: &DisplayOptions) -> Self {
        Self {
            on: opts.on_time,
            off: opts.off_time,
        }
    }

    /// Whether the schedule wants the display on at `t`. The window may wrap
    /// past midnight; equal times mean always on.
    pub fn is_on_at(&self, t: NaiveTime) -> bool {
        if self.on == self.off {
            true
        } else if self.on < self.off {
            self.on <= t && t < self.off
        } else {
            t >= self.on || t < self.off
        }
    }
}

/// Resolve the effective display state from override and schedule.
pub fn display_on(over: DisplayOverride, schedule: &DisplaySchedule, t: NaiveTime) -> bool {
    over.forced().unwrap_or_else(|| schedule.is_on_at(t))
}

/// Current wall-clock time in the configured zone, or the system zone.
pub fn local_now(tz: Option<Tz>) -> NaiveDateTime {
    match tz {
        Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
        None => Local::now().naive_local(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerChange {
    pub on: bool,
    /// First observation after startup rather than a real transition.
    pub initial: bool,
}

/// Edge detector for display power changes.
#[derive(Debug, Default)]
pub struct PowerEdge {
    last: Option<bool>,
}

impl PowerEdge {
    /// Reports the state when it differs from the last observation.
    /// The first observation always reports.
    pub fn observe(&mut self, on: bool) -> Option<PowerChange> {
        if self.last == Some(on) {
            return None;
        }
        let initial = self.last.is_none();
        self.last = Some(on);
        Some(PowerChange { on, initial })
    }

    pub fn last(&self) -> Option<bool> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn daytime_window() {
        let s = DisplaySchedule { on: t(5, 0), off: t(23, 0) };
        assert!(!s.is_on_at(t(4, 59)));
        assert!(s.is_on_at(t(5, 0)));
        assert!(s.is_on_at(t(22, 59)));
        assert!(!s.is_on_at(t(23, 0)));
    }

    #[test]
    fn window_wrapping_midnight() {
        let s = DisplaySchedule { on: t(22, 0), off: t(6, 0) };
        assert!(s.is_on_at(t(23, 30)));
        assert!(s.is_on_at(t(0, 0)));
        assert!(s.is_on_at(t(5, 59)));
        assert!(!s.is_on_at(t(6, 0)));
        assert!(!s.is_on_at(t(12, 0)));
    }

    #[test]
    fn equal_times_mean_always_on() {
        let s = DisplaySchedule { on: t(7, 0), off: t(7, 0) };
        assert!(s.is_on_at(t(3, 0)));
        assert!(s.is_on_at(t(7, 0)));
    }

    #[test]
    fn override_beats_schedule() {
        let s = DisplaySchedule { on: t(5, 0), off: t(23, 0) };
        assert!(!display_on(DisplayOverride::Off, &s, t(12, 0)));
        assert!(display_on(DisplayOverride::On, &s, t(2, 0)));
        assert!(!display_on(DisplayOverride::Auto, &s, t(2, 0)));
        assert_eq!(DisplayOverride::parse("ON"), Some(DisplayOverride::On));
        assert_eq!(DisplayOverride::parse("dim"), None);
    }

    #[test]
    fn edges_report_changes_only() {
        let mut edge = PowerEdge::default();
        assert_eq!(edge.observe(true), Some(PowerChange { on: true, initial: true }));
        assert_eq!(edge.observe(true), None);
        assert_eq!(edge.observe(false), Some(PowerChange { on: false, initial: false }));
        assert_eq!(edge.last(), Some(false));
    }
}
