//! Parsing for the persisted schedule file (spec §6: `{version, monitors,
//! tasks}`, each entry `{name, prompt, interval, description?, enabled,
//! conditions?, prompt_arguments?, notify?, notification_channels?}`).
//!
//! `interval` accepts three grammars, tried in order:
//! - duration string: `30s`, `5m`, `1h`, `2h30m`
//! - time-of-day: `9:00 on weekdays`, `morning on monday,friday`
//!   (`morning|afternoon|evening|night` are presets for 9/14/18/22)
//! - interval-with-range: `1h between 9:00 and 23:00 [on weekdays]`

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::engine::SchedulerHandle;
use crate::error::{Result, SchedulerError};
use crate::types::{Cadence, DayMask};

pub const DEFAULT_NIGHTLY_SYNTHESIS_NAME: &str = "nightly-synthesis";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleFileEntry {
    pub name: String,
    pub prompt: String,
    pub interval: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Option<String>,
    #[serde(default)]
    pub prompt_arguments: Option<serde_json::Value>,
    #[serde(default)]
    pub notify: Option<bool>,
    #[serde(default)]
    pub notification_channels: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleFile {
    pub version: u32,
    #[serde(default)]
    pub monitors: Vec<ScheduleFileEntry>,
    #[serde(default)]
    pub tasks: Vec<ScheduleFileEntry>,
}

impl ScheduleFile {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let mut file: Self = serde_json::from_str(&raw)?;
        file.ensure_default_nightly_synthesis();
        Ok(file)
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    pub fn all_entries(&self) -> impl Iterator<Item = &ScheduleFileEntry> {
        self.monitors.iter().chain(self.tasks.iter())
    }

    /// Ensure a `nightly-synthesis` entry exists unless the user renamed or
    /// removed it deliberately (tracked here as "absent and no entry already
    /// uses that name").
    pub fn ensure_default_nightly_synthesis(&mut self) {
        let exists = self.all_entries().any(|e| e.name == DEFAULT_NIGHTLY_SYNTHESIS_NAME);
        if !exists {
            self.tasks.push(ScheduleFileEntry {
                name: DEFAULT_NIGHTLY_SYNTHESIS_NAME.to_string(),
                prompt: "Synthesize today's knowledge-graph learnings into durable lessons.".to_string(),
                interval: "23:30 daily".to_string(),
                description: Some("Nightly knowledge-graph synthesis pass.".to_string()),
                enabled: true,
                conditions: None,
                prompt_arguments: None,
                notify: Some(false),
                notification_channels: None,
            });
        }
    }
}

impl Default for ScheduleFile {
    fn default() -> Self {
        let mut file = Self { version: 1, monitors: Vec::new(), tasks: Vec::new() };
        file.ensure_default_nightly_synthesis();
        file
    }
}

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:(\d+)h)?(?:(\d+)m)?(?:(\d+)s)?$").unwrap());
static TIME_OF_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?i)(\d{1,2}:\d{2}|morning|afternoon|evening|night)(?:\s+on\s+(.+))?(?:\s+daily)?$").unwrap());
static WITHIN_RANGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?i)(\d+h\d*m?|\d+m|\d+h)\s+between\s+(\d{1,2}:\d{2})\s+and\s+(\d{1,2}:\d{2})(?:\s+on\s+(.+))?$").unwrap()
});

fn preset_time(name: &str) -> Option<(u32, u32)> {
    match name.to_ascii_lowercase().as_str() {
        "morning" => Some((9, 0)),
        "afternoon" => Some((14, 0)),
        "evening" => Some((18, 0)),
        "night" => Some((22, 0)),
        _ => None,
    }
}

fn parse_day_spec(spec: Option<&str>) -> DayMask {
    match spec {
        None => DayMask::ALL,
        Some(s) => {
            let lower = s.trim().to_ascii_lowercase();
            if lower == "weekdays" || lower == "weekends" {
                DayMask::from_preset(&lower)
            } else {
                DayMask::from_day_list(&lower)
            }
        }
    }
}

fn parse_hh_mm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    Some((h.parse().ok()?, m.parse().ok()?))
}

fn parse_duration_secs(s: &str) -> Option<u64> {
    let caps = DURATION_RE.captures(s)?;
    if caps.iter().skip(1).all(|c| c.is_none()) {
        return None;
    }
    let hours: u64 = caps.get(1).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
    let minutes: u64 = caps.get(2).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
    let seconds: u64 = caps.get(3).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
    Some(hours * 3600 + minutes * 60 + seconds)
}

/// Parse one of the three interval grammars into a [`Cadence`].
pub fn parse_interval(raw: &str) -> Result<Cadence> {
    let s = raw.trim();

    if let Some(caps) = WITHIN_RANGE_RE.captures(s) {
        let every_secs = parse_duration_secs(&caps[1])
            .ok_or_else(|| SchedulerError::InvalidInterval(raw.to_string()))?;
        let (start_hour, start_minute) =
            parse_hh_mm(&caps[2]).ok_or_else(|| SchedulerError::InvalidInterval(raw.to_string()))?;
        let (end_hour, end_minute) =
            parse_hh_mm(&caps[3]).ok_or_else(|| SchedulerError::InvalidInterval(raw.to_string()))?;
        let days = parse_day_spec(caps.get(4).map(|m| m.as_str()));
        return Ok(Cadence::IntervalWithinRange { every_secs, start_hour, start_minute, end_hour, end_minute, days });
    }

    if let Some(caps) = TIME_OF_DAY_RE.captures(s) {
        let time_token = &caps[1];
        let (hour, minute) = if let Some(preset) = preset_time(time_token) {
            preset
        } else {
            parse_hh_mm(time_token).ok_or_else(|| SchedulerError::InvalidInterval(raw.to_string()))?
        };
        let days = parse_day_spec(caps.get(2).map(|m| m.as_str()));
        return Ok(Cadence::TimeOfDay { hour, minute, days });
    }

    if let Some(secs) = parse_duration_secs(s) {
        if secs > 0 {
            return Ok(Cadence::Interval { every_secs: secs });
        }
    }

    Err(SchedulerError::InvalidInterval(raw.to_string()))
}

/// Apply the parsed file to `handle`'s unit table: entries not yet present
/// (by name) are added, `enabled` toggles are applied to existing units.
/// Cadence/body edits to an existing unit require a name change or explicit
/// removal-and-recreation via the schedule CRUD tools, keeping this sync an
/// additive reconciliation rather than a destructive replace.
pub fn sync_to_handle(file: &ScheduleFile, handle: &SchedulerHandle) -> Result<()> {
    let existing = handle.list_units()?;
    for entry in file.all_entries() {
        if existing.iter().any(|u| u.name == entry.name) {
            handle.set_enabled(&entry.name, entry.enabled)?;
            continue;
        }
        if !entry.enabled {
            continue;
        }
        let cadence = parse_interval(&entry.interval)?;
        handle.add_unit(
            &entry.name,
            &entry.prompt,
            cadence,
            entry.notify.unwrap_or(false),
            entry.notification_channels.clone().unwrap_or_default(),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_duration() {
        assert_eq!(parse_interval("30s").unwrap(), Cadence::Interval { every_secs: 30 });
        assert_eq!(parse_interval("5m").unwrap(), Cadence::Interval { every_secs: 300 });
        assert_eq!(parse_interval("1h").unwrap(), Cadence::Interval { every_secs: 3600 });
        assert_eq!(parse_interval("2h30m").unwrap(), Cadence::Interval { every_secs: 9000 });
    }

    #[test]
    fn parses_time_of_day_with_explicit_clock() {
        let cadence = parse_interval("9:00 on weekdays").unwrap();
        assert_eq!(cadence, Cadence::TimeOfDay { hour: 9, minute: 0, days: DayMask::WEEKDAYS });
    }

    #[test]
    fn parses_time_of_day_preset_with_day_list() {
        let cadence = parse_interval("morning on monday,friday").unwrap();
        assert_eq!(
            cadence,
            Cadence::TimeOfDay { hour: 9, minute: 0, days: DayMask(DayMask::MON | DayMask::FRI) }
        );
    }

    #[test]
    fn parses_interval_within_range() {
        let cadence = parse_interval("1h between 9:00 and 23:00 on weekdays").unwrap();
        assert_eq!(
            cadence,
            Cadence::IntervalWithinRange {
                every_secs: 3600,
                start_hour: 9,
                start_minute: 0,
                end_hour: 23,
                end_minute: 0,
                days: DayMask::WEEKDAYS,
            }
        );
    }

    #[test]
    fn rejects_garbage_interval() {
        assert!(parse_interval("whenever I feel like it").is_err());
    }

    #[test]
    fn default_schedule_file_has_nightly_synthesis() {
        let file = ScheduleFile::default();
        assert!(file.all_entries().any(|e| e.name == DEFAULT_NIGHTLY_SYNTHESIS_NAME));
    }

    #[test]
    fn ensure_default_does_not_duplicate_existing() {
        let mut file = ScheduleFile { version: 1, monitors: vec![], tasks: vec![] };
        file.ensure_default_nightly_synthesis();
        file.ensure_default_nightly_synthesis();
        assert_eq!(file.all_entries().filter(|e| e.name == DEFAULT_NIGHTLY_SYNTHESIS_NAME).count(), 1);
    }

    #[test]
    fn sync_adds_entries_and_is_idempotent() {
        let handle = SchedulerHandle::new(rusqlite::Connection::open_in_memory().unwrap()).unwrap();
        let file = ScheduleFile::default();
        sync_to_handle(&file, &handle).unwrap();
        sync_to_handle(&file, &handle).unwrap();
        let units = handle.list_units().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, DEFAULT_NIGHTLY_SYNTHESIS_NAME);
    }
}
