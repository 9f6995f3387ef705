//! Quiet-hours evaluation.
//!
//! Bounds are compared as minutes since midnight, both inclusive. A window
//! whose start is later than its end (22:00-06:00) wraps past midnight.

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveTime, Timelike};

use crate::error::CoreError;
use crate::preferences::{NotificationPreferences, QuietHours};
use crate::types::Timestamp;

/// Which wall clock "now" is read from before comparing against the stored
/// time-of-day bounds. The same clock must be used on every path that
/// evaluates quiet hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuietHoursClock {
    /// The server's local time zone.
    #[default]
    ServerLocal,
    Utc,
}

impl QuietHoursClock {
    pub fn time_of_day(&self, now: Timestamp) -> NaiveTime {
        match self {
            QuietHoursClock::ServerLocal => now.with_timezone(&Local).time(),
            QuietHoursClock::Utc => now.time(),
        }
    }
}

impl fmt::Display for QuietHoursClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuietHoursClock::ServerLocal => "local",
            QuietHoursClock::Utc => "utc",
        })
    }
}

impl FromStr for QuietHoursClock {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(QuietHoursClock::ServerLocal),
            "utc" => Ok(QuietHoursClock::Utc),
            other => Err(CoreError::Validation(format!(
                "Unknown quiet hours clock '{other}' (expected 'local' or 'utc')"
            ))),
        }
    }
}

fn minutes_since_midnight(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Whether `time_of_day` falls inside `window`.
pub fn window_contains(window: QuietHours, time_of_day: NaiveTime) -> bool {
    let now = minutes_since_midnight(time_of_day);
    let start = minutes_since_midnight(window.start);
    let end = minutes_since_midnight(window.end);

    if start > end {
        now >= start || now <= end
    } else {
        start <= now && now <= end
    }
}

/// Whether the user is in quiet hours at `time_of_day`. Always false unless
/// both bounds are configured.
pub fn is_quiet(prefs: &NotificationPreferences, time_of_day: NaiveTime) -> bool {
    prefs
        .quiet_hours()
        .is_some_and(|window| window_contains(window, time_of_day))
}

/// [`is_quiet`] for an absolute instant read through `clock`.
pub fn is_quiet_at(prefs: &NotificationPreferences, now: Timestamp, clock: QuietHoursClock) -> bool {
    is_quiet(prefs, clock.time_of_day(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn prefs_with(start: Option<NaiveTime>, end: Option<NaiveTime>) -> NotificationPreferences {
        let mut p = NotificationPreferences::defaults_for(uuid::Uuid::now_v7(), Utc::now());
        p.quiet_hours_start = start;
        p.quiet_hours_end = end;
        p
    }

    #[test]
    fn overnight_window_wraps_midnight() {
        let p = prefs_with(Some(hm(22, 0)), Some(hm(6, 0)));
        assert!(is_quiet(&p, hm(23, 30)));
        assert!(is_quiet(&p, hm(2, 0)));
        assert!(!is_quiet(&p, hm(12, 0)));
    }

    #[test]
    fn daytime_window_is_inclusive() {
        let p = prefs_with(Some(hm(9, 0)), Some(hm(17, 0)));
        assert!(is_quiet(&p, hm(9, 0)));
        assert!(is_quiet(&p, hm(17, 0)));
        assert!(!is_quiet(&p, hm(8, 59)));
        assert!(!is_quiet(&p, hm(17, 1)));
    }

    #[test]
    fn overnight_bounds_are_inclusive() {
        let p = prefs_with(Some(hm(22, 0)), Some(hm(6, 0)));
        assert!(is_quiet(&p, hm(22, 0)));
        assert!(is_quiet(&p, hm(6, 0)));
        assert!(!is_quiet(&p, hm(6, 1)));
        assert!(!is_quiet(&p, hm(21, 59)));
    }

    #[test]
    fn seconds_are_ignored() {
        let p = prefs_with(Some(hm(9, 0)), Some(hm(17, 0)));
        assert!(is_quiet(&p, NaiveTime::from_hms_opt(17, 0, 59).unwrap()));
    }

    #[test]
    fn unset_bounds_are_never_quiet() {
        assert!(!is_quiet(&prefs_with(None, None), hm(23, 0)));
        assert!(!is_quiet(&prefs_with(Some(hm(22, 0)), None), hm(23, 0)));
        assert!(!is_quiet(&prefs_with(None, Some(hm(6, 0))), hm(2, 0)));
    }

    #[test]
    fn utc_clock_reads_utc_time_of_day() {
        let p = prefs_with(Some(hm(22, 0)), Some(hm(6, 0)));
        let late = Utc.with_ymd_and_hms(2026, 5, 4, 23, 30, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap();
        assert!(is_quiet_at(&p, late, QuietHoursClock::Utc));
        assert!(!is_quiet_at(&p, noon, QuietHoursClock::Utc));
    }

    #[test]
    fn clock_parses_case_insensitively() {
        assert_eq!("UTC".parse::<QuietHoursClock>().unwrap(), QuietHoursClock::Utc);
        assert_eq!(
            "local".parse::<QuietHoursClock>().unwrap(),
            QuietHoursClock::ServerLocal
        );
        assert!("pacific".parse::<QuietHoursClock>().is_err());
    }
}
