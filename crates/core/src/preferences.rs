//! Per-user notification preferences.
//!
//! One record per user, created lazily with [`NotificationPreferences::defaults_for`]
//! on first access. Only [`NotificationPreferences::apply`] mutates a record.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::notification::{NotificationCategory, NotificationType};
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Digest frequency
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFrequency {
    None,
    Realtime,
    #[default]
    Daily,
    Weekly,
}

/// The two batched cadences a digest can be flushed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestWindow {
    Daily,
    Weekly,
}

impl DigestFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestFrequency::None => "none",
            DigestFrequency::Realtime => "realtime",
            DigestFrequency::Daily => "daily",
            DigestFrequency::Weekly => "weekly",
        }
    }

    /// The digest window this frequency batches into, if any.
    pub fn digest_window(&self) -> Option<DigestWindow> {
        match self {
            DigestFrequency::Daily => Some(DigestWindow::Daily),
            DigestFrequency::Weekly => Some(DigestWindow::Weekly),
            DigestFrequency::None | DigestFrequency::Realtime => None,
        }
    }
}

impl fmt::Display for DigestFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestFrequency {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(DigestFrequency::None),
            "realtime" => Ok(DigestFrequency::Realtime),
            "daily" => Ok(DigestFrequency::Daily),
            "weekly" => Ok(DigestFrequency::Weekly),
            other => Err(CoreError::Validation(format!(
                "Unknown digest frequency '{other}'"
            ))),
        }
    }
}

impl DigestWindow {
    pub const ALL: [DigestWindow; 2] = [DigestWindow::Daily, DigestWindow::Weekly];

    pub fn as_str(&self) -> &'static str {
        match self {
            DigestWindow::Daily => "daily",
            DigestWindow::Weekly => "weekly",
        }
    }

    /// Capitalized form used in email subjects.
    pub fn title(&self) -> &'static str {
        match self {
            DigestWindow::Daily => "Daily",
            DigestWindow::Weekly => "Weekly",
        }
    }
}

impl fmt::Display for DigestWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestWindow {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(DigestWindow::Daily),
            "weekly" => Ok(DigestWindow::Weekly),
            other => Err(CoreError::Validation(format!("Unknown digest window '{other}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Preferences record
// ---------------------------------------------------------------------------

/// Inclusive quiet-hours window. `start > end` means it wraps midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    pub user_id: DbId,
    pub enable_progress_notifications: bool,
    pub enable_risk_alerts: bool,
    pub enable_achievement_notifications: bool,
    pub enable_course_updates: bool,
    pub enable_assignment_reminders: bool,
    pub enable_email_notifications: bool,
    pub email_digest_frequency: DigestFrequency,
    #[serde(with = "time_of_day::option")]
    pub quiet_hours_start: Option<NaiveTime>,
    #[serde(with = "time_of_day::option")]
    pub quiet_hours_end: Option<NaiveTime>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NotificationPreferences {
    /// Defaults: every category on, email on, daily digest, no quiet hours.
    pub fn defaults_for(user_id: DbId, now: Timestamp) -> Self {
        Self {
            user_id,
            enable_progress_notifications: true,
            enable_risk_alerts: true,
            enable_achievement_notifications: true,
            enable_course_updates: true,
            enable_assignment_reminders: true,
            enable_email_notifications: true,
            email_digest_frequency: DigestFrequency::Daily,
            quiet_hours_start: None,
            quiet_hours_end: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the category governing `notification_type` is enabled.
    pub fn allows(&self, notification_type: NotificationType) -> bool {
        match notification_type.category() {
            NotificationCategory::ProgressUpdates => self.enable_progress_notifications,
            NotificationCategory::RiskAlerts => self.enable_risk_alerts,
            NotificationCategory::AchievementNotifications => {
                self.enable_achievement_notifications
            }
            NotificationCategory::CourseUpdates => self.enable_course_updates,
            NotificationCategory::AssignmentReminders => self.enable_assignment_reminders,
        }
    }

    /// The configured window, only when both bounds are set.
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) => Some(QuietHours { start, end }),
            _ => None,
        }
    }

    /// Immediate email goes out only for the `realtime` frequency.
    pub fn wants_immediate_email(&self) -> bool {
        self.enable_email_notifications
            && self.email_digest_frequency == DigestFrequency::Realtime
    }

    /// The digest window new notifications are batched into, if any.
    pub fn digest_window(&self) -> Option<DigestWindow> {
        if !self.enable_email_notifications {
            return None;
        }
        self.email_digest_frequency.digest_window()
    }

    /// Merge a partial update. The result must keep quiet-hours bounds
    /// both set or both unset; on error `self` is left unchanged.
    pub fn apply(&mut self, patch: &PreferencesPatch, now: Timestamp) -> Result<(), CoreError> {
        let mut next = self.clone();
        if let Some(v) = patch.enable_progress_notifications {
            next.enable_progress_notifications = v;
        }
        if let Some(v) = patch.enable_risk_alerts {
            next.enable_risk_alerts = v;
        }
        if let Some(v) = patch.enable_achievement_notifications {
            next.enable_achievement_notifications = v;
        }
        if let Some(v) = patch.enable_course_updates {
            next.enable_course_updates = v;
        }
        if let Some(v) = patch.enable_assignment_reminders {
            next.enable_assignment_reminders = v;
        }
        if let Some(v) = patch.enable_email_notifications {
            next.enable_email_notifications = v;
        }
        if let Some(v) = patch.email_digest_frequency {
            next.email_digest_frequency = v;
        }
        if let Some(v) = patch.quiet_hours_start {
            next.quiet_hours_start = v;
        }
        if let Some(v) = patch.quiet_hours_end {
            next.quiet_hours_end = v;
        }

        if next.quiet_hours_start.is_some() != next.quiet_hours_end.is_some() {
            return Err(CoreError::Validation(
                "quietHoursStart and quietHoursEnd must be set together".to_string(),
            ));
        }

        next.updated_at = now;
        *self = next;
        Ok(())
    }
}

/// Partial preference update. For the quiet-hours bounds, an absent field
/// leaves the value alone while an explicit `null` clears it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesPatch {
    pub enable_progress_notifications: Option<bool>,
    pub enable_risk_alerts: Option<bool>,
    pub enable_achievement_notifications: Option<bool>,
    pub enable_course_updates: Option<bool>,
    pub enable_assignment_reminders: Option<bool>,
    pub enable_email_notifications: Option<bool>,
    pub email_digest_frequency: Option<DigestFrequency>,
    #[serde(default, with = "time_of_day::patch")]
    pub quiet_hours_start: Option<Option<NaiveTime>>,
    #[serde(default, with = "time_of_day::patch")]
    pub quiet_hours_end: Option<Option<NaiveTime>>,
}

// ---------------------------------------------------------------------------
// Time-of-day serde
// ---------------------------------------------------------------------------

/// `HH:MM` on the way out; `HH:MM` or `HH:MM:SS` on the way in.
pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(s, "%H:%M:%S").or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
    }

    pub fn format(t: NaiveTime) -> String {
        t.format("%H:%M").to_string()
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(v: &Option<NaiveTime>, s: S) -> Result<S::Ok, S::Error> {
            match v {
                Some(t) => s.serialize_some(&format(*t)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveTime>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| parse(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }

    pub mod patch {
        use super::*;

        /// Only invoked when the field is present, so the outer `Some` marks
        /// presence and the inner value may be `null`.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<Option<NaiveTime>>, D::Error> {
            super::option::deserialize(d).map(Some)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
