use serde::{Deserialize, Serialize};

/// One hourly window and the limits to apply while it's active.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandwidthRule {
    /// Start hour, inclusive, in `[0, 24)`.
    pub start: u8,
    /// End hour, exclusive, in `(0, 24]`.
    pub end: u8,
    /// Download limit to apply, bytes/sec; 0 = unlimited.
    pub download_bps: u64,
    /// Upload limit to apply, bytes/sec; 0 = unlimited.
    pub upload_bps: u64,
}

impl BandwidthRule {
    fn matches(&self, hour: u8) -> bool {
        self.start <= hour && hour < self.end
    }
}

/// The `bandwidth_schedule` setting: evaluated every 60 s against the
/// current wall-clock hour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BandwidthSchedule {
    /// Master switch; when `false`, the schedule never acts.
    pub enabled: bool,
    /// Rules in declaration order; the first matching rule wins when two
    /// rules overlap the same hour.
    pub rules: Vec<BandwidthRule>,
}

/// The outcome of evaluating a schedule for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Apply these limits (the first matching rule).
    Apply {
        /// Download limit to apply, bytes/sec.
        download_bps: u64,
        /// Upload limit to apply, bytes/sec.
        upload_bps: u64,
    },
    /// No rule matched the current hour; revert to the settings values.
    RevertToSettings,
    /// The schedule is disabled; take no action at all.
    NoAction,
}

impl BandwidthSchedule {
    /// Evaluate the schedule for `current_hour` (`[0, 24)`).
    #[must_use]
    pub fn evaluate(&self, current_hour: u8) -> ScheduleDecision {
        if !self.enabled {
            return ScheduleDecision::NoAction;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(current_hour))
            .map_or(ScheduleDecision::RevertToSettings, |rule| ScheduleDecision::Apply {
                download_bps: rule.download_bps,
                upload_bps: rule.upload_bps,
            })
    }
}
