//! Repository for the `notification_preferences` table.

use sqlx::PgPool;

use coursecast_core::preferences::NotificationPreferences;
use coursecast_core::types::{DbId, Timestamp};

use crate::models::preference::NotificationPreferencesRow;

/// Column list for `notification_preferences` queries.
const COLUMNS: &str = "user_id, enable_progress_notifications, enable_risk_alerts, \
    enable_achievement_notifications, enable_course_updates, enable_assignment_reminders, \
    enable_email_notifications, email_digest_frequency, quiet_hours_start, quiet_hours_end, \
    created_at, updated_at";

/// Provides read and upsert operations for notification preferences.
pub struct NotificationPreferenceRepo;

impl NotificationPreferenceRepo {
    pub async fn get(
        pool: &PgPool,
        user_id: DbId,
    ) -> Result<Option<NotificationPreferencesRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_preferences WHERE user_id = $1");
        sqlx::query_as::<_, NotificationPreferencesRow>(&query)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Return the user's row, inserting column defaults if none exists.
    ///
    /// Concurrent first accesses race on the primary key; the loser's insert
    /// is a no-op and the follow-up select sees the winner's row.
    pub async fn get_or_create(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<NotificationPreferencesRow, sqlx::Error> {
        if let Some(row) = Self::get(pool, user_id).await? {
            return Ok(row);
        }
        sqlx::query(
            "INSERT INTO notification_preferences (user_id, created_at, updated_at) \
             VALUES ($1, $2, $2) \
             ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await?;
        Self::get(pool, user_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Insert or overwrite the full record.
    pub async fn upsert(
        pool: &PgPool,
        prefs: &NotificationPreferences,
    ) -> Result<NotificationPreferencesRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO notification_preferences ({COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (user_id) DO UPDATE SET \
                enable_progress_notifications = EXCLUDED.enable_progress_notifications, \
                enable_risk_alerts = EXCLUDED.enable_risk_alerts, \
                enable_achievement_notifications = EXCLUDED.enable_achievement_notifications, \
                enable_course_updates = EXCLUDED.enable_course_updates, \
                enable_assignment_reminders = EXCLUDED.enable_assignment_reminders, \
                enable_email_notifications = EXCLUDED.enable_email_notifications, \
                email_digest_frequency = EXCLUDED.email_digest_frequency, \
                quiet_hours_start = EXCLUDED.quiet_hours_start, \
                quiet_hours_end = EXCLUDED.quiet_hours_end, \
                updated_at = EXCLUDED.updated_at \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NotificationPreferencesRow>(&query)
            .bind(prefs.user_id)
            .bind(prefs.enable_progress_notifications)
            .bind(prefs.enable_risk_alerts)
            .bind(prefs.enable_achievement_notifications)
            .bind(prefs.enable_course_updates)
            .bind(prefs.enable_assignment_reminders)
            .bind(prefs.enable_email_notifications)
            .bind(prefs.email_digest_frequency.as_str())
            .bind(prefs.quiet_hours_start)
            .bind(prefs.quiet_hours_end)
            .bind(prefs.created_at)
            .bind(prefs.updated_at)
            .fetch_one(pool)
            .await
    }
}
