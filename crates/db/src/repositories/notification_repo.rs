//! Repository for the `notifications` table.

use sqlx::PgPool;

use coursecast_core::notification::{Notification, NotificationFilter, DedupeQuery};
use coursecast_core::types::{DbId, Timestamp};

use crate::models::notification::NotificationRow;

/// Column list for `notifications` queries.
pub(crate) const COLUMNS: &str = "id, user_id, type, priority, title, message, data, \
    action_url, action_text, related_entity_type, related_entity_id, is_read, read_at, \
    created_at, expires_at";

/// Provides CRUD operations for notifications.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Insert a fully materialized notification.
    pub async fn insert(pool: &PgPool, n: &Notification) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO notifications \
                (id, user_id, type, priority, title, message, data, action_url, action_text, \
                 related_entity_type, related_entity_id, is_read, read_at, created_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(n.id)
        .bind(n.user_id)
        .bind(n.notification_type.as_str())
        .bind(n.priority.as_str())
        .bind(&n.title)
        .bind(&n.message)
        .bind(&n.data)
        .bind(&n.action_url)
        .bind(&n.action_text)
        .bind(n.related_entity.map(|r| r.entity_type.as_str()))
        .bind(n.related_entity.map(|r| r.id))
        .bind(n.is_read)
        .bind(n.read_at)
        .bind(n.created_at)
        .bind(n.expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Find a notification owned by `user_id`.
    pub async fn find(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
    ) -> Result<Option<NotificationRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notifications WHERE id = $1 AND user_id = $2");
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// List a user's notifications, newest first, skipping expired rows.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: DbId,
        filter: &NotificationFilter,
        now: Timestamp,
    ) -> Result<Vec<NotificationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notifications \
             WHERE user_id = $1 \
               AND (expires_at IS NULL OR expires_at > $2) \
               AND ($3 OR is_read = false) \
               AND ($4::text IS NULL OR type = $4) \
               AND ($5::text IS NULL OR priority = $5) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $6 OFFSET $7"
        );
        sqlx::query_as::<_, NotificationRow>(&query)
            .bind(user_id)
            .bind(now)
            .bind(filter.include_read)
            .bind(filter.notification_type.map(|t| t.as_str()))
            .bind(filter.priority.map(|p| p.as_str()))
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(pool)
            .await
    }

    /// Get the number of unread, unexpired notifications for a user.
    pub async fn unread_count(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE user_id = $1 AND is_read = false \
               AND (expires_at IS NULL OR expires_at > $2)",
        )
        .bind(user_id)
        .bind(now)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Mark a single notification as read, keeping an earlier `read_at`.
    ///
    /// Returns `true` if the notification exists for the given user.
    pub async fn mark_read(
        pool: &PgPool,
        id: DbId,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = COALESCE(read_at, $3) \
             WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark all unread notifications as read for a user.
    ///
    /// Returns the number of notifications that were marked read.
    pub async fn mark_all_read(
        pool: &PgPool,
        user_id: DbId,
        now: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE notifications \
             SET is_read = true, read_at = $2 \
             WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete(pool: &PgPool, id: DbId, user_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete every notification whose expiry has passed.
    pub async fn delete_expired(pool: &PgPool, now: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at <= $1",
        )
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Whether a notification satisfying the dedupe query exists.
    pub async fn exists_matching(
        pool: &PgPool,
        dedupe: &DedupeQuery,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (\
                SELECT 1 FROM notifications \
                WHERE user_id = $1 \
                  AND related_entity_type = $2 \
                  AND related_entity_id = $3 \
                  AND created_at >= $4 \
                  AND ($5::text IS NULL OR type = $5) \
                  AND ($6::text IS NULL OR strpos(message, $6) > 0))",
        )
        .bind(dedupe.user_id)
        .bind(dedupe.related_entity.entity_type.as_str())
        .bind(dedupe.related_entity.id)
        .bind(dedupe.created_since)
        .bind(dedupe.notification_type.map(|t| t.as_str()))
        .bind(dedupe.message_contains.as_deref())
        .fetch_one(pool)
        .await
    }
}
