//! PostgreSQL-backed implementation of every store trait.

use async_trait::async_trait;

use coursecast_core::notification::{Notification, NotificationFilter, DedupeQuery};
use coursecast_core::preferences::{DigestWindow, NotificationPreferences};
use coursecast_core::triggers::{
    AssessmentDueRow, AtRiskStudentRow, LiveSessionAttendeeRow, WeeklyActivityRow,
};
use coursecast_core::types::{DbId, Timestamp};

use crate::error::StoreResult;
use crate::repositories::{
    DeferredNotificationRepo, DigestRepo, NotificationPreferenceRepo, NotificationRepo,
    RecipientRepo, TriggerRepo,
};
use crate::store::{
    DeferredEntry, DeferredQueueStore, DeferredStatus, DigestEntry, DigestQueueStore,
    DigestStats, DueDigestRow, NotificationStore, PreferenceStore, Recipient,
    RecipientDirectory, TriggerSource,
};
use crate::DbPool;

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl PreferenceStore for PgStore {
    async fn load_or_create_preferences(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> StoreResult<NotificationPreferences> {
        NotificationPreferenceRepo::get_or_create(&self.pool, user_id, now)
            .await?
            .try_into()
    }

    async fn save_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> StoreResult<NotificationPreferences> {
        NotificationPreferenceRepo::upsert(&self.pool, prefs)
            .await?
            .try_into()
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        Ok(NotificationRepo::insert(&self.pool, notification).await?)
    }

    async fn find_notification(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> StoreResult<Option<Notification>> {
        NotificationRepo::find(&self.pool, id, user_id)
            .await?
            .map(Notification::try_from)
            .transpose()
    }

    async fn list_notifications(
        &self,
        user_id: DbId,
        filter: &NotificationFilter,
        now: Timestamp,
    ) -> StoreResult<Vec<Notification>> {
        NotificationRepo::list_for_user(&self.pool, user_id, filter, now)
            .await?
            .into_iter()
            .map(Notification::try_from)
            .collect()
    }

    async fn unread_count(&self, user_id: DbId, now: Timestamp) -> StoreResult<i64> {
        Ok(NotificationRepo::unread_count(&self.pool, user_id, now).await?)
    }

    async fn mark_read(&self, id: DbId, user_id: DbId, now: Timestamp) -> StoreResult<bool> {
        Ok(NotificationRepo::mark_read(&self.pool, id, user_id, now).await?)
    }

    async fn mark_all_read(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64> {
        Ok(NotificationRepo::mark_all_read(&self.pool, user_id, now).await?)
    }

    async fn delete_notification(&self, id: DbId, user_id: DbId) -> StoreResult<bool> {
        Ok(NotificationRepo::delete(&self.pool, id, user_id).await?)
    }

    async fn delete_expired(&self, now: Timestamp) -> StoreResult<u64> {
        Ok(NotificationRepo::delete_expired(&self.pool, now).await?)
    }

    async fn exists_matching(&self, dedupe: &DedupeQuery) -> StoreResult<bool> {
        Ok(NotificationRepo::exists_matching(&self.pool, dedupe).await?)
    }
}

#[async_trait]
impl DeferredQueueStore for PgStore {
    async fn enqueue_deferred(&self, entry: &DeferredEntry) -> StoreResult<()> {
        Ok(DeferredNotificationRepo::insert(&self.pool, entry).await?)
    }

    async fn list_queued(&self) -> StoreResult<Vec<DeferredEntry>> {
        DeferredNotificationRepo::list_queued(&self.pool)
            .await?
            .into_iter()
            .map(DeferredEntry::try_from)
            .collect()
    }

    async fn claim_deferred(
        &self,
        id: DbId,
        to: DeferredStatus,
        now: Timestamp,
    ) -> StoreResult<bool> {
        Ok(DeferredNotificationRepo::claim(&self.pool, id, to, now).await?)
    }

    async fn release_deferred(&self, id: DbId) -> StoreResult<bool> {
        Ok(DeferredNotificationRepo::release(&self.pool, id).await?)
    }

    async fn queued_count(&self, user_id: DbId) -> StoreResult<i64> {
        Ok(DeferredNotificationRepo::queued_count(&self.pool, user_id).await?)
    }

    async fn exists_queued_matching(&self, dedupe: &DedupeQuery) -> StoreResult<bool> {
        Ok(DeferredNotificationRepo::exists_queued_matching(&self.pool, dedupe).await?)
    }
}

#[async_trait]
impl DigestQueueStore for PgStore {
    async fn enqueue_digest(&self, entry: &DigestEntry) -> StoreResult<()> {
        Ok(DigestRepo::insert(&self.pool, entry).await?)
    }

    async fn due_digest_rows(
        &self,
        window: DigestWindow,
        now: Timestamp,
    ) -> StoreResult<Vec<DueDigestRow>> {
        DigestRepo::list_due(&self.pool, window, now)
            .await?
            .into_iter()
            .map(DueDigestRow::try_from)
            .collect()
    }

    async fn mark_digest_sent(
        &self,
        user_id: DbId,
        window: DigestWindow,
        cutoff: Timestamp,
        sent_at: Timestamp,
    ) -> StoreResult<u64> {
        Ok(DigestRepo::mark_sent(&self.pool, user_id, window, cutoff, sent_at).await?)
    }

    async fn purge_sent_digests(&self, older_than: Timestamp) -> StoreResult<u64> {
        let sent = DigestRepo::purge_sent(&self.pool, older_than).await?;
        let orphaned = DigestRepo::purge_orphaned(&self.pool, older_than).await?;
        if orphaned > 0 {
            tracing::warn!(orphaned, "Purged digest entries for users without an account");
        }
        Ok(sent + orphaned)
    }

    async fn digest_stats(&self) -> StoreResult<DigestStats> {
        Ok(DigestRepo::stats(&self.pool).await?)
    }
}

#[async_trait]
impl RecipientDirectory for PgStore {
    async fn find_recipient(&self, user_id: DbId) -> StoreResult<Option<Recipient>> {
        Ok(RecipientRepo::find(&self.pool, user_id).await?)
    }
}

#[async_trait]
impl TriggerSource for PgStore {
    async fn assessments_due_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Vec<AssessmentDueRow>> {
        Ok(TriggerRepo::assessments_due_between(&self.pool, from, to)
            .await?
            .into_iter()
            .map(AssessmentDueRow::from)
            .collect())
    }

    async fn weekly_activity(
        &self,
        since: Timestamp,
        until: Timestamp,
    ) -> StoreResult<Vec<WeeklyActivityRow>> {
        Ok(TriggerRepo::weekly_activity(&self.pool, since, until)
            .await?
            .into_iter()
            .map(WeeklyActivityRow::from)
            .collect())
    }

    async fn live_sessions_starting_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Vec<LiveSessionAttendeeRow>> {
        Ok(TriggerRepo::live_sessions_starting_between(&self.pool, from, to)
            .await?
            .into_iter()
            .map(LiveSessionAttendeeRow::from)
            .collect())
    }

    async fn at_risk_students(&self) -> StoreResult<Vec<AtRiskStudentRow>> {
        TriggerRepo::at_risk_students(&self.pool)
            .await?
            .into_iter()
            .map(AtRiskStudentRow::try_from)
            .collect()
    }
}
