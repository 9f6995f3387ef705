//! Cadences of the scheduled notification triggers.
//!
//! All wall-clock cadences are evaluated in UTC.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveTime, TimeZone, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

// ---------------------------------------------------------------------------
// Trigger constants
// ---------------------------------------------------------------------------

/// Assessment reminders cover assessments due within this many days. An
/// assessment is reminded once while it is inside the window.
pub const ASSESSMENT_DUE_DAYS_AHEAD: i64 = 2;

/// Live-session reminders target sessions starting this far ahead.
pub const LIVE_SESSION_LEAD_MINUTES: i64 = 15;

/// Half-width of the live-session match window, tolerating tick drift.
pub const LIVE_SESSION_WINDOW_MINUTES: i64 = 5;

/// A live-session reminder is not repeated within this many hours.
pub const LIVE_SESSION_DEDUPE_HOURS: i64 = 2;

/// Weekly summaries cover this many trailing days.
pub const WEEKLY_SUMMARY_DAYS: i64 = 7;

/// Weekly jobs skip a recipient already notified within this many days.
/// Shorter than a week so the previous Monday's run does not block this one.
pub const WEEKLY_DEDUPE_DAYS: i64 = 6;

// ---------------------------------------------------------------------------
// Cadence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval, first run one interval after start.
    Every { secs: u64 },
    /// Once a day at `hour:minute` UTC.
    DailyAt { hour: u32, minute: u32 },
    /// Once a week on `weekday` at `hour:minute` UTC.
    WeeklyAt {
        weekday: Weekday,
        hour: u32,
        minute: u32,
    },
}

impl Cadence {
    /// The next run strictly after `now`.
    pub fn next_after(&self, now: Timestamp) -> Timestamp {
        match *self {
            Cadence::Every { secs } => now + Duration::seconds(secs.max(1) as i64),
            Cadence::DailyAt { hour, minute } => {
                let today = at_on(now.date_naive(), hour, minute);
                if today > now {
                    today
                } else {
                    today + Duration::days(1)
                }
            }
            Cadence::WeeklyAt {
                weekday,
                hour,
                minute,
            } => {
                let today = now.date_naive();
                let ahead = (7 + i64::from(weekday.num_days_from_monday())
                    - i64::from(today.weekday().num_days_from_monday()))
                    % 7;
                let candidate = at_on(today + Duration::days(ahead), hour, minute);
                if candidate > now {
                    candidate
                } else {
                    candidate + Duration::days(7)
                }
            }
        }
    }

    /// How long to sleep from `now` until the next run.
    pub fn delay_from(&self, now: Timestamp) -> std::time::Duration {
        (self.next_after(now) - now)
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}

fn at_on(date: chrono::NaiveDate, hour: u32, minute: u32) -> Timestamp {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// The scheduled trigger jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerJob {
    AssessmentDue,
    WeeklySummary,
    LiveSessionStartingSoon,
    AtRiskStudents,
}

impl TriggerJob {
    pub const ALL: [TriggerJob; 4] = [
        TriggerJob::AssessmentDue,
        TriggerJob::WeeklySummary,
        TriggerJob::LiveSessionStartingSoon,
        TriggerJob::AtRiskStudents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerJob::AssessmentDue => "assessment-due",
            TriggerJob::WeeklySummary => "weekly-summary",
            TriggerJob::LiveSessionStartingSoon => "live-session-starting-soon",
            TriggerJob::AtRiskStudents => "at-risk-students",
        }
    }

    pub fn cadence(&self) -> Cadence {
        match self {
            TriggerJob::AssessmentDue => Cadence::DailyAt { hour: 9, minute: 0 },
            TriggerJob::WeeklySummary => Cadence::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 9,
                minute: 0,
            },
            TriggerJob::LiveSessionStartingSoon => Cadence::Every {
                secs: (LIVE_SESSION_LEAD_MINUTES * 60) as u64,
            },
            TriggerJob::AtRiskStudents => Cadence::WeeklyAt {
                weekday: Weekday::Mon,
                hour: 10,
                minute: 0,
            },
        }
    }
}

impl fmt::Display for TriggerJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerJob {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TriggerJob::ALL
            .into_iter()
            .find(|j| j.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown trigger job '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
