//! Repository for the `deferred_notifications` table.

use sqlx::PgPool;

use coursecast_core::notification::DedupeQuery;
use coursecast_core::types::{DbId, Timestamp};

use crate::models::notification::DeferredNotificationRow;
use crate::store::{DeferredEntry, DeferredStatus};

/// Column list for `deferred_notifications` queries.
const COLUMNS: &str = "id, user_id, type, priority, title, message, data, action_url, \
    action_text, related_entity_type, related_entity_id, expires_at, status, queued_at, \
    resolved_at";

/// Provides queue operations for deferred notifications.
pub struct DeferredNotificationRepo;

impl DeferredNotificationRepo {
    pub async fn insert(pool: &PgPool, entry: &DeferredEntry) -> Result<(), sqlx::Error> {
        let r = &entry.request;
        sqlx::query(
            "INSERT INTO deferred_notifications \
                (id, user_id, type, priority, title, message, data, action_url, action_text, \
                 related_entity_type, related_entity_id, expires_at, status, queued_at, \
                 resolved_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(entry.id)
        .bind(r.user_id)
        .bind(r.notification_type.as_str())
        .bind(r.priority.as_str())
        .bind(&r.title)
        .bind(&r.message)
        .bind(&r.data)
        .bind(&r.action_url)
        .bind(&r.action_text)
        .bind(r.related_entity.map(|e| e.entity_type.as_str()))
        .bind(r.related_entity.map(|e| e.id))
        .bind(r.expires_at)
        .bind(entry.status.as_str())
        .bind(entry.queued_at)
        .bind(entry.resolved_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// List all entries still queued, oldest first.
    pub async fn list_queued(pool: &PgPool) -> Result<Vec<DeferredNotificationRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM deferred_notifications \
             WHERE status = 'queued' \
             ORDER BY queued_at, id"
        );
        sqlx::query_as::<_, DeferredNotificationRow>(&query)
            .fetch_all(pool)
            .await
    }

    /// Transition a queued entry to `to` in one conditional update.
    ///
    /// Returns `false` when the entry was not queued any more.
    pub async fn claim(
        pool: &PgPool,
        id: DbId,
        to: DeferredStatus,
        now: Timestamp,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE deferred_notifications \
             SET status = $2, resolved_at = $3 \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(now)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Undo a `delivered` claim whose delivery failed.
    pub async fn release(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE deferred_notifications \
             SET status = 'queued', resolved_at = NULL \
             WHERE id = $1 AND status = 'delivered'",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn queued_count(pool: &PgPool, user_id: DbId) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            "SELECT COUNT(*) FROM deferred_notifications \
             WHERE user_id = $1 AND status = 'queued'",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Whether a queued entry satisfies the dedupe query.
    pub async fn exists_queued_matching(
        pool: &PgPool,
        dedupe: &DedupeQuery,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS (\
                SELECT 1 FROM deferred_notifications \
                WHERE status = 'queued' \
                  AND user_id = $1 \
                  AND related_entity_type = $2 \
                  AND related_entity_id = $3 \
                  AND queued_at >= $4 \
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
