use serde::Deserialize;

use crate::limits::MIN_SLOT_STEP_MINUTES;
use crate::model::Minute;

/// Tunables for slot search and cascade grouping.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Spacing of candidate start times.
    pub slot_step_minutes: Minute,
    /// Heuristic visit detection: bookings created within ± this many minutes.
    pub cascade_window_minutes: i64,
    /// Heuristic visit detection: more candidates than this is ambiguous.
    pub heuristic_group_cap: usize,
    /// Explicitly grouped visits are truncated to this many members.
    pub explicit_group_cap: usize,
    /// How often the hold reaper scans for expired pending visits.
    pub reaper_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: 15,
            cascade_window_minutes: 2,
            heuristic_group_cap: 10,
            explicit_group_cap: 20,
            reaper_interval_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Read `VISITCHAIN_*` overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.parse().ok())
        }

        let defaults = Self::default();
        let config = Self {
            slot_step_minutes: parsed(&lookup, "VISITCHAIN_SLOT_STEP_MINUTES")
                .unwrap_or(defaults.slot_step_minutes),
            cascade_window_minutes: parsed(&lookup, "VISITCHAIN_CASCADE_WINDOW_MINUTES")
                .unwrap_or(defaults.cascade_window_minutes),
            heuristic_group_cap: parsed(&lookup, "VISITCHAIN_HEURISTIC_GROUP_CAP")
                .unwrap_or(defaults.heuristic_group_cap),
            explicit_group_cap: parsed(&lookup, "VISITCHAIN_EXPLICIT_GROUP_CAP")
                .unwrap_or(defaults.explicit_group_cap),
            reaper_interval_secs: parsed(&lookup, "VISITCHAIN_REAPER_INTERVAL_SECS")
                .unwrap_or(defaults.reaper_interval_secs),
        };
        config.sanitized()
    }

    /// Clamp values that would make the engine misbehave.
    pub fn sanitized(mut self) -> Self {
        self.slot_step_minutes = self.slot_step_minutes.max(MIN_SLOT_STEP_MINUTES);
        self.cascade_window_minutes = self.cascade_window_minutes.max(0);
        self.heuristic_group_cap = self.heuristic_group_cap.max(1);
        self.explicit_group_cap = self.explicit_group_cap.max(1);
        self.reaper_interval_secs = self.reaper_interval_secs.max(1);
        self
    }
}
