//! Row model for `notification_preferences`.

use chrono::NaiveTime;
use sqlx::FromRow;

use coursecast_core::preferences::NotificationPreferences;
use coursecast_core::types::{DbId, Timestamp};

use crate::error::StoreError;

/// A row from the `notification_preferences` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationPreferencesRow {
    pub user_id: DbId,
    pub enable_progress_notifications: bool,
    pub enable_risk_alerts: bool,
    pub enable_achievement_notifications: bool,
    pub enable_course_updates: bool,
    pub enable_assignment_reminders: bool,
    pub enable_email_notifications: bool,
    pub email_digest_frequency: String,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<NotificationPreferencesRow> for NotificationPreferences {
    type Error = StoreError;

    fn try_from(row: NotificationPreferencesRow) -> Result<Self, Self::Error> {
        Ok(NotificationPreferences {
            user_id: row.user_id,
            enable_progress_notifications: row.enable_progress_notifications,
            enable_risk_alerts: row.enable_risk_alerts,
            enable_achievement_notifications: row.enable_achievement_notifications,
            enable_course_updates: row.enable_course_updates,
            enable_assignment_reminders: row.enable_assignment_reminders,
            enable_email_notifications: row.enable_email_notifications,
            email_digest_frequency: row.email_digest_frequency.parse()?,
            quiet_hours_start: row.quiet_hours_start,
            quiet_hours_end: row.quiet_hours_end,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
