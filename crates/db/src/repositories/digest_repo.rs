//! Repository for the `email_digests` table.

use sqlx::PgPool;

use coursecast_core::preferences::DigestWindow;
use coursecast_core::types::{DbId, Timestamp};

use crate::models::digest::DueDigestJoinRow;
use crate::store::{DigestEntry, DigestStats};

/// Provides queue operations for digest entries.
pub struct DigestRepo;

impl DigestRepo {
    pub async fn insert(pool: &PgPool, entry: &DigestEntry) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO email_digests \
                (id, user_id, notification_id, frequency, scheduled_for, sent, sent_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id)
        .bind(entry.user_id)
        .bind(entry.notification_id)
        .bind(entry.window.as_str())
        .bind(entry.scheduled_for)
        .bind(entry.sent)
        .bind(entry.sent_at)
        .bind(entry.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Due, unsent entries of a window joined with notification content and
    /// recipient contact details. Users without an account row are skipped.
    pub async fn list_due(
        pool: &PgPool,
        window: DigestWindow,
        now: Timestamp,
    ) -> Result<Vec<DueDigestJoinRow>, sqlx::Error> {
        sqlx::query_as::<_, DueDigestJoinRow>(
            "SELECT d.id AS entry_id, u.email, u.first_name, \
                    n.id, n.user_id, n.type, n.priority, n.title, n.message, n.data, \
                    n.action_url, n.action_text, n.related_entity_type, n.related_entity_id, \
                    n.is_read, n.read_at, n.created_at, n.expires_at \
             FROM email_digests d \
             JOIN notifications n ON n.id = d.notification_id \
             JOIN users u ON u.id = d.user_id \
             WHERE d.frequency = $1 AND d.sent = false AND d.scheduled_for <= $2 \
             ORDER BY d.user_id, n.created_at DESC",
        )
        .bind(window.as_str())
        .bind(now)
        .fetch_all(pool)
        .await
    }

    /// Mark every pending entry of a user and window as sent in one
    /// transaction.
    pub async fn mark_sent(
        pool: &PgPool,
        user_id: DbId,
        window: DigestWindow,
        cutoff: Timestamp,
        sent_at: Timestamp,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let result = sqlx::query(
            "UPDATE email_digests \
             SET sent = true, sent_at = $4 \
             WHERE user_id = $1 AND frequency = $2 AND sent = false AND scheduled_for <= $3",
        )
        .bind(user_id)
        .bind(window.as_str())
        .bind(cutoff)
        .bind(sent_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Delete sent entries older than `older_than`.
    pub async fn purge_sent(pool: &PgPool, older_than: Timestamp) -> Result<u64, sqlx::Error> {
        let result =
            sqlx::query("DELETE FROM email_digests WHERE sent = true AND sent_at < $1")
                .bind(older_than)
                .execute(pool)
                .await?;
        Ok(result.rows_affected())
    }

    /// Delete unsent entries scheduled before `older_than` whose user has no
    /// account row. `list_due` never returns them, so they would never be
    /// marked sent.
    pub async fn purge_orphaned(pool: &PgPool, older_than: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM email_digests d \
             WHERE d.sent = false AND d.scheduled_for < $1 \
               AND NOT EXISTS (SELECT 1 FROM users u WHERE u.id = d.user_id)",
        )
        .bind(older_than)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(pool: &PgPool) -> Result<DigestStats, sqlx::Error> {
        let (sent_daily, sent_weekly, pending): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                COUNT(*) FILTER (WHERE sent AND frequency = 'daily'), \
                COUNT(*) FILTER (WHERE sent AND frequency = 'weekly'), \
                COUNT(*) FILTER (WHERE NOT sent) \
             FROM email_digests",
        )
        .fetch_one(pool)
        .await?;
        Ok(DigestStats {
            sent_daily,
            sent_weekly,
            pending,
        })
    }
}
