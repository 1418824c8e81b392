use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};

use crate::types::{Cadence, DayMask};

/// Compute the next fire instant for `cadence` relative to `from`, per
/// spec §4.G's per-cadence driver rules.
pub fn compute_next_run(cadence: &Cadence, from: DateTime<Utc>) -> DateTime<Utc> {
    match cadence {
        Cadence::Interval { every_secs } => from + Duration::seconds(*every_secs as i64),
        Cadence::TimeOfDay { hour, minute, days } => next_time_of_day(from, *hour, *minute, *days),
        Cadence::IntervalWithinRange {
            every_secs,
            start_hour,
            start_minute,
            end_hour,
            end_minute,
            days,
        } => next_within_range(from, *every_secs, *start_hour, *start_minute, *end_hour, *end_minute, *days),
    }
}

/// Same-day fire if `hour:minute` is still ahead of `from` and today is in
/// `days`; otherwise walk forward day by day for up to 7 days.
fn next_time_of_day(from: DateTime<Utc>, hour: u32, minute: u32, days: DayMask) -> DateTime<Utc> {
    let target_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    for offset in 0..8 {
        let candidate_date = (from + Duration::days(offset)).date_naive();
        let candidate = candidate_date.and_time(target_time).and_utc();
        if candidate > from && days.contains(candidate.weekday()) {
            return candidate;
        }
    }
    // Degenerate day mask (empty): fall back to tomorrow same time.
    (from + Duration::days(1)).date_naive().and_time(target_time).and_utc()
}

/// `interval_within_range`: if `now` is inside `[start, end)` on an allowed
/// day and `now + every_secs <= end`, fire and sleep `every_secs`; otherwise
/// jump to `start` of the next allowed day.
fn next_within_range(
    from: DateTime<Utc>,
    every_secs: u64,
    start_hour: u32,
    start_minute: u32,
    end_hour: u32,
    end_minute: u32,
    days: DayMask,
) -> DateTime<Utc> {
    let start_time = NaiveTime::from_hms_opt(start_hour, start_minute, 0).unwrap_or(NaiveTime::MIN);
    let end_time = NaiveTime::from_hms_opt(end_hour, end_minute, 0).unwrap_or(NaiveTime::MIN);

    let today = from.date_naive();
    let today_start = today.and_time(start_time).and_utc();
    let today_end = today.and_time(end_time).and_utc();

    if days.contains(from.weekday())
        && from >= today_start
        && from < today_end
        && from + Duration::seconds(every_secs as i64) <= today_end
    {
        return from + Duration::seconds(every_secs as i64);
    }

    for offset in 0..8 {
        let candidate_date = (from + Duration::days(offset)).date_naive();
        let candidate_start = candidate_date.and_time(start_time).and_utc();
        if candidate_start > from && days.contains(candidate_date.weekday()) {
            return candidate_start;
        }
        // If it's today and we haven't yet reached the window, jump to it.
        if offset == 0 && candidate_start >= from && days.contains(candidate_date.weekday()) {
            return candidate_start;
        }
    }
    (from + Duration::days(1)).date_naive().and_time(start_time).and_utc()
}

/// Did a `time_of_day(hour, minute, days)` unit have a scheduled fire inside
/// `[before, now]`? Checks both today's and yesterday's scheduled instant so
/// a suspension window crossing midnight is still caught (spec §4.G
/// "Suspension recovery"; grounded on the original `_has_missed_run`).
pub fn missed_time_of_day_fire(
    hour: u32,
    minute: u32,
    days: DayMask,
    before: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    let target_time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);

    let today = now.date_naive();
    let today_scheduled = today.and_time(target_time).and_utc();
    if days.contains(today.weekday()) && before <= today_scheduled && today_scheduled <= now {
        return true;
    }

    let yesterday = (now - Duration::days(1)).date_naive();
    let yesterday_scheduled = yesterday.and_time(target_time).and_utc();
    if days.contains(yesterday.weekday()) && before <= yesterday_scheduled && yesterday_scheduled <= now {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn dt(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, mi, 0).unwrap()
    }

    #[test]
    fn interval_adds_seconds() {
        let next = compute_next_run(&Cadence::Interval { every_secs: 900 }, dt(2026, 1, 5, 10, 0));
        assert_eq!(next, dt(2026, 1, 5, 10, 15));
    }

    #[test]
    fn time_of_day_same_day_when_still_ahead() {
        // 2026-01-05 is a Monday.
        let next = compute_next_run(
            &Cadence::TimeOfDay { hour: 9, minute: 0, days: DayMask::ALL },
            dt(2026, 1, 5, 6, 0),
        );
        assert_eq!(next, dt(2026, 1, 5, 9, 0));
    }

    #[test]
    fn time_of_day_rolls_to_next_allowed_weekday() {
        // 2026-01-09 is a Friday; weekdays-only mask should skip the weekend.
        let next = compute_next_run(
            &Cadence::TimeOfDay { hour: 9, minute: 0, days: DayMask::WEEKDAYS },
            dt(2026, 1, 9, 10, 0),
        );
        assert_eq!(next, dt(2026, 1, 12, 9, 0)); // following Monday
    }

    #[test]
    fn within_range_fires_while_inside_window() {
        let cadence = Cadence::IntervalWithinRange {
            every_secs: 1800,
            start_hour: 9,
            start_minute: 0,
            end_hour: 17,
            end_minute: 0,
            days: DayMask::ALL,
        };
        let next = compute_next_run(&cadence, dt(2026, 1, 5, 16, 0));
        assert_eq!(next, dt(2026, 1, 5, 16, 30));
    }

    #[test]
    fn within_range_jumps_to_next_window_when_past_end() {
        let cadence = Cadence::IntervalWithinRange {
            every_secs: 1800,
            start_hour: 9,
            start_minute: 0,
            end_hour: 17,
            end_minute: 0,
            days: DayMask::ALL,
        };
        let next = compute_next_run(&cadence, dt(2026, 1, 5, 20, 0));
        assert_eq!(next, dt(2026, 1, 6, 9, 0));
    }

    #[test]
    fn within_range_jumps_to_start_when_before_window() {
        let cadence = Cadence::IntervalWithinRange {
            every_secs: 1800,
            start_hour: 9,
            start_minute: 0,
            end_hour: 17,
            end_minute: 0,
            days: DayMask::ALL,
        };
        let next = compute_next_run(&cadence, dt(2026, 1, 5, 6, 0));
        assert_eq!(next, dt(2026, 1, 5, 9, 0));
    }

    #[test]
    fn missed_fire_detected_within_suspension_window() {
        // Suspended from 08:55 to 09:10; the 09:00 fire should be caught.
        let before = dt(2026, 1, 5, 8, 55);
        let now = dt(2026, 1, 5, 9, 10);
        assert!(missed_time_of_day_fire(9, 0, DayMask::ALL, before, now));
    }

    #[test]
    fn missed_fire_not_detected_outside_window() {
        let before = dt(2026, 1, 5, 7, 0);
        let now = dt(2026, 1, 5, 7, 30);
        assert!(!missed_time_of_day_fire(9, 0, DayMask::ALL, before, now));
    }

    #[test]
    fn missed_fire_crossing_midnight_checks_yesterday() {
        // Suspended from 23:50 yesterday to 00:10 today; yesterday's 23:55 fire applies.
        let before = dt(2026, 1, 5, 23, 50);
        let now = dt(2026, 1, 6, 0, 10);
        assert!(missed_time_of_day_fire(23, 55, DayMask::ALL, before, now));
    }
}
