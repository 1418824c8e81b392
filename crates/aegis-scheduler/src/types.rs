use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A subset of Mon-Sun, stored as a 7-bit mask (bit 0 = Monday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayMask(pub u8);

impl DayMask {
    pub const MON: u8 = 1 << 0;
    pub const TUE: u8 = 1 << 1;
    pub const WED: u8 = 1 << 2;
    pub const THU: u8 = 1 << 3;
    pub const FRI: u8 = 1 << 4;
    pub const SAT: u8 = 1 << 5;
    pub const SUN: u8 = 1 << 6;

    pub const ALL: DayMask = DayMask(0b111_1111);
    pub const WEEKDAYS: DayMask = DayMask(Self::MON | Self::TUE | Self::WED | Self::THU | Self::FRI);
    pub const WEEKENDS: DayMask = DayMask(Self::SAT | Self::SUN);

    pub fn contains(&self, day: Weekday) -> bool {
        let bit = match day {
            Weekday::Mon => Self::MON,
            Weekday::Tue => Self::TUE,
            Weekday::Wed => Self::WED,
            Weekday::Thu => Self::THU,
            Weekday::Fri => Self::FRI,
            Weekday::Sat => Self::SAT,
            Weekday::Sun => Self::SUN,
        };
        self.0 & bit != 0
    }

    /// Parse a named preset (`weekdays`, `weekends`, `all`), falling back to
    /// `ALL` for anything unrecognized.
    pub fn from_preset(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "weekdays" => Self::WEEKDAYS,
            "weekends" => Self::WEEKENDS,
            _ => Self::ALL,
        }
    }

    /// Parse a comma-separated day-name list (`"monday,friday"`), ignoring
    /// unrecognized tokens. Returns `ALL` if nothing parsed, matching the
    /// "no day restriction applies to all days" rule.
    pub fn from_day_list(s: &str) -> Self {
        let mut mask = 0u8;
        for token in s.split(',') {
            let bit = match token.trim().to_ascii_lowercase().as_str() {
                "monday" | "mon" => Self::MON,
                "tuesday" | "tue" => Self::TUE,
                "wednesday" | "wed" => Self::WED,
                "thursday" | "thu" => Self::THU,
                "friday" | "fri" => Self::FRI,
                "saturday" | "sat" => Self::SAT,
                "sunday" | "sun" => Self::SUN,
                _ => 0,
            };
            mask |= bit;
        }
        if mask == 0 {
            Self::ALL
        } else {
            DayMask(mask)
        }
    }
}

impl Default for DayMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// The three cadences a schedule unit can run under (spec §4.G).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Cadence {
    /// Run, sleep `every_secs`, repeat. Does not catch up after suspension.
    Interval { every_secs: u64 },
    /// Fire once a day at `hour:minute` UTC, on any day in `days`.
    TimeOfDay { hour: u32, minute: u32, days: DayMask },
    /// Fire every `every_secs` while `now` falls within `[start, end)` on an
    /// allowed day; otherwise jump to `start` of the next allowed day.
    IntervalWithinRange {
        every_secs: u64,
        start_hour: u32,
        start_minute: u32,
        end_hour: u32,
        end_minute: u32,
        days: DayMask,
    },
}

impl Cadence {
    /// `time_of_day` units are the only ones eligible for suspension catch-up.
    pub fn is_time_based(&self) -> bool {
        matches!(self, Cadence::TimeOfDay { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Enabled,
    Disabled,
    Failed,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitStatus::Enabled => "enabled",
            UnitStatus::Disabled => "disabled",
            UnitStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for UnitStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "enabled" => Ok(UnitStatus::Enabled),
            "disabled" => Ok(UnitStatus::Disabled),
            "failed" => Ok(UnitStatus::Failed),
            other => Err(format!("unknown unit status: {other}")),
        }
    }
}

/// A named, persistent schedule unit (spec §3 "Schedule unit" / §4.G).
///
/// `body` is either a free-form instruction handed to the agent loop as a
/// synthetic user message, or a `protocol://server/promptname` reference
/// resolved against the tool-server supervisor at run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUnit {
    pub id: String,
    pub name: String,
    pub body: String,
    pub cadence: Cadence,
    pub enabled: bool,
    pub notify: bool,
    pub channels: Vec<String>,
    #[serde(default)]
    pub arguments: serde_json::Value,
    pub conditions: Option<String>,
    pub max_turns: Option<u32>,
    pub status: UnitStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub run_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a single unit run, reported to notification channels when
/// `notify` is set and always persisted to `last_run`/`run_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub unit_name: String,
    pub success: bool,
    pub output: String,
    pub metadata: serde_json::Value,
    pub ran_at: DateTime<Utc>,
}
