//! In-process implementation of every store trait.
//!
//! Used by service and HTTP tests, and by anything that wants the delivery
//! core without PostgreSQL. State lives in `Mutex<Vec<_>>` collections.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use coursecast_core::notification::{Notification, NotificationFilter, DedupeQuery};
use coursecast_core::preferences::{DigestWindow, NotificationPreferences};
use coursecast_core::triggers::{
    AssessmentDueRow, AtRiskStudentRow, LiveSessionAttendeeRow, WeeklyActivityRow,
};
use coursecast_core::types::{DbId, Timestamp};

use crate::error::{StoreError, StoreResult};
use crate::store::{
    DeferredEntry, DeferredQueueStore, DeferredStatus, DigestEntry, DigestQueueStore,
    DigestStats, DueDigestRow, NotificationStore, PreferenceStore, Recipient,
    RecipientDirectory, TriggerSource,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct InMemoryStore {
    preferences: Mutex<Vec<NotificationPreferences>>,
    notifications: Mutex<Vec<Notification>>,
    deferred: Mutex<Vec<DeferredEntry>>,
    digests: Mutex<Vec<DigestEntry>>,
    recipients: Mutex<Vec<Recipient>>,
    assessments_due: Mutex<Vec<AssessmentDueRow>>,
    weekly_activity: Mutex<Vec<WeeklyActivityRow>>,
    live_sessions: Mutex<Vec<LiveSessionAttendeeRow>>,
    at_risk: Mutex<Vec<AtRiskStudentRow>>,
    fail_writes: AtomicBool,
    fail_notification_inserts: AtomicBool,
    fail_inserts_for: Mutex<HashSet<DbId>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -- fixtures ----------------------------------------------------------

    pub fn add_recipient(&self, recipient: Recipient) {
        lock(&self.recipients).push(recipient);
    }

    pub fn set_assessments_due(&self, rows: Vec<AssessmentDueRow>) {
        *lock(&self.assessments_due) = rows;
    }

    pub fn set_weekly_activity(&self, rows: Vec<WeeklyActivityRow>) {
        *lock(&self.weekly_activity) = rows;
    }

    pub fn set_live_sessions(&self, rows: Vec<LiveSessionAttendeeRow>) {
        *lock(&self.live_sessions) = rows;
    }

    pub fn set_at_risk_students(&self, rows: Vec<AtRiskStudentRow>) {
        *lock(&self.at_risk) = rows;
    }

    /// Make every subsequent write fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail only notification inserts, leaving the queues writable.
    pub fn set_fail_notification_inserts(&self, fail: bool) {
        self.fail_notification_inserts.store(fail, Ordering::SeqCst);
    }

    /// Fail notification inserts addressed to `user_id` only.
    pub fn set_fail_notification_inserts_for(&self, user_id: DbId, fail: bool) {
        let mut users = lock(&self.fail_inserts_for);
        if fail {
            users.insert(user_id);
        } else {
            users.remove(&user_id);
        }
    }

    // -- snapshots ---------------------------------------------------------

    pub fn notifications(&self) -> Vec<Notification> {
        lock(&self.notifications).clone()
    }

    pub fn deferred_entries(&self) -> Vec<DeferredEntry> {
        lock(&self.deferred).clone()
    }

    pub fn digest_entries(&self) -> Vec<DigestEntry> {
        lock(&self.digests).clone()
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store is read-only".into()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

#[async_trait]
impl PreferenceStore for InMemoryStore {
    async fn load_or_create_preferences(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> StoreResult<NotificationPreferences> {
        let mut prefs = lock(&self.preferences);
        if let Some(existing) = prefs.iter().find(|p| p.user_id == user_id) {
            return Ok(existing.clone());
        }
        self.check_writable()?;
        let created = NotificationPreferences::defaults_for(user_id, now);
        prefs.push(created.clone());
        Ok(created)
    }

    async fn save_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> StoreResult<NotificationPreferences> {
        self.check_writable()?;
        let mut all = lock(&self.preferences);
        match all.iter_mut().find(|p| p.user_id == prefs.user_id) {
            Some(existing) => *existing = prefs.clone(),
            None => all.push(prefs.clone()),
        }
        Ok(prefs.clone())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()> {
        self.check_writable()?;
        if self.fail_notification_inserts.load(Ordering::SeqCst)
            || lock(&self.fail_inserts_for).contains(&notification.user_id)
        {
            return Err(StoreError::Unavailable("notification inserts disabled".into()));
        }
        let mut all = lock(&self.notifications);
        if all.iter().any(|n| n.id == notification.id) {
            return Err(StoreError::Conflict(format!(
                "notification {} already exists",
                notification.id
            )));
        }
        all.push(notification.clone());
        Ok(())
    }

    async fn find_notification(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> StoreResult<Option<Notification>> {
        Ok(lock(&self.notifications)
            .iter()
            .find(|n| n.id == id && n.user_id == user_id)
            .cloned())
    }

    async fn list_notifications(
        &self,
        user_id: DbId,
        filter: &NotificationFilter,
        now: Timestamp,
    ) -> StoreResult<Vec<Notification>> {
        let mut matching: Vec<Notification> = lock(&self.notifications)
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_expired_at(now) && filter.matches(n))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn unread_count(&self, user_id: DbId, now: Timestamp) -> StoreResult<i64> {
        Ok(lock(&self.notifications)
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read && !n.is_expired_at(now))
            .count() as i64)
    }

    async fn mark_read(&self, id: DbId, user_id: DbId, now: Timestamp) -> StoreResult<bool> {
        self.check_writable()?;
        let mut all = lock(&self.notifications);
        match all.iter_mut().find(|n| n.id == id && n.user_id == user_id) {
            Some(n) => {
                n.is_read = true;
                n.read_at = n.read_at.or(Some(now));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64> {
        self.check_writable()?;
        let mut count = 0;
        for n in lock(&self.notifications)
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            n.is_read = true;
            n.read_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn delete_notification(&self, id: DbId, user_id: DbId) -> StoreResult<bool> {
        self.check_writable()?;
        let mut all = lock(&self.notifications);
        let before = all.len();
        all.retain(|n| !(n.id == id && n.user_id == user_id));
        let deleted = all.len() < before;
        drop(all);
        if deleted {
            lock(&self.digests).retain(|d| d.notification_id != id);
        }
        Ok(deleted)
    }

    async fn delete_expired(&self, now: Timestamp) -> StoreResult<u64> {
        self.check_writable()?;
        let mut all = lock(&self.notifications);
        let expired: Vec<DbId> = all
            .iter()
            .filter(|n| n.is_expired_at(now))
            .map(|n| n.id)
            .collect();
        all.retain(|n| !n.is_expired_at(now));
        drop(all);
        lock(&self.digests).retain(|d| !expired.contains(&d.notification_id));
        Ok(expired.len() as u64)
    }

    async fn exists_matching(&self, dedupe: &DedupeQuery) -> StoreResult<bool> {
        Ok(lock(&self.notifications)
            .iter()
            .any(|n| dedupe.matches_notification(n)))
    }
}

// ---------------------------------------------------------------------------
// Deferred queue
// ---------------------------------------------------------------------------

#[async_trait]
impl DeferredQueueStore for InMemoryStore {
    async fn enqueue_deferred(&self, entry: &DeferredEntry) -> StoreResult<()> {
        self.check_writable()?;
        lock(&self.deferred).push(entry.clone());
        Ok(())
    }

    async fn list_queued(&self) -> StoreResult<Vec<DeferredEntry>> {
        let mut queued: Vec<DeferredEntry> = lock(&self.deferred)
            .iter()
            .filter(|e| e.status == DeferredStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by_key(|e| (e.queued_at, e.id));
        Ok(queued)
    }

    async fn claim_deferred(
        &self,
        id: DbId,
        to: DeferredStatus,
        now: Timestamp,
    ) -> StoreResult<bool> {
        self.check_writable()?;
        let mut all = lock(&self.deferred);
        match all
            .iter_mut()
            .find(|e| e.id == id && e.status == DeferredStatus::Queued)
        {
            Some(entry) => {
                entry.status = to;
                entry.resolved_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn release_deferred(&self, id: DbId) -> StoreResult<bool> {
        self.check_writable()?;
        let mut all = lock(&self.deferred);
        match all
            .iter_mut()
            .find(|e| e.id == id && e.status == DeferredStatus::Delivered)
        {
            Some(entry) => {
                entry.status = DeferredStatus::Queued;
                entry.resolved_at = None;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn queued_count(&self, user_id: DbId) -> StoreResult<i64> {
        Ok(lock(&self.deferred)
            .iter()
            .filter(|e| e.request.user_id == user_id && e.status == DeferredStatus::Queued)
            .count() as i64)
    }

    async fn exists_queued_matching(&self, dedupe: &DedupeQuery) -> StoreResult<bool> {
        Ok(lock(&self.deferred).iter().any(|e| {
            e.status == DeferredStatus::Queued && dedupe.matches(&e.request, e.queued_at)
        }))
    }
}

// ---------------------------------------------------------------------------
// Digest queue
// ---------------------------------------------------------------------------

#[async_trait]
impl DigestQueueStore for InMemoryStore {
    async fn enqueue_digest(&self, entry: &DigestEntry) -> StoreResult<()> {
        self.check_writable()?;
        let mut all = lock(&self.digests);
        if all
            .iter()
            .any(|d| d.notification_id == entry.notification_id && d.window == entry.window)
        {
            return Err(StoreError::Conflict(format!(
                "notification {} is already queued for the {} digest",
                entry.notification_id, entry.window
            )));
        }
        all.push(entry.clone());
        Ok(())
    }

    async fn due_digest_rows(
        &self,
        window: DigestWindow,
        now: Timestamp,
    ) -> StoreResult<Vec<DueDigestRow>> {
        let digests = lock(&self.digests).clone();
        let notifications = lock(&self.notifications).clone();
        let recipients = lock(&self.recipients).clone();

        let mut rows: Vec<DueDigestRow> = digests
            .iter()
            .filter(|d| d.window == window && !d.sent && d.scheduled_for <= now)
            .filter_map(|d| {
                let notification = notifications.iter().find(|n| n.id == d.notification_id)?;
                let recipient = recipients.iter().find(|r| r.user_id == d.user_id)?;
                Some(DueDigestRow {
                    entry_id: d.id,
                    recipient: recipient.clone(),
                    notification: notification.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            a.recipient
                .user_id
                .cmp(&b.recipient.user_id)
                .then(b.notification.created_at.cmp(&a.notification.created_at))
        });
        Ok(rows)
    }

    async fn mark_digest_sent(
        &self,
        user_id: DbId,
        window: DigestWindow,
        cutoff: Timestamp,
        sent_at: Timestamp,
    ) -> StoreResult<u64> {
        self.check_writable()?;
        let mut count = 0;
        for d in lock(&self.digests).iter_mut().filter(|d| {
            d.user_id == user_id && d.window == window && !d.sent && d.scheduled_for <= cutoff
        }) {
            d.sent = true;
            d.sent_at = Some(sent_at);
            count += 1;
        }
        Ok(count)
    }

    async fn purge_sent_digests(&self, older_than: Timestamp) -> StoreResult<u64> {
        self.check_writable()?;
        let notifications = lock(&self.notifications).clone();
        let recipients = lock(&self.recipients).clone();
        let deliverable = |d: &DigestEntry| {
            notifications.iter().any(|n| n.id == d.notification_id)
                && recipients.iter().any(|r| r.user_id == d.user_id)
        };

        let mut all = lock(&self.digests);
        let before = all.len();
        all.retain(|d| {
            let expired_sent = d.sent && d.sent_at.is_some_and(|at| at < older_than);
            let orphaned = !d.sent && d.scheduled_for < older_than && !deliverable(d);
            !(expired_sent || orphaned)
        });
        Ok((before - all.len()) as u64)
    }

    async fn digest_stats(&self) -> StoreResult<DigestStats> {
        let all = lock(&self.digests);
        let mut stats = DigestStats::default();
        for d in all.iter() {
            match (d.sent, d.window) {
                (true, DigestWindow::Daily) => stats.sent_daily += 1,
                (true, DigestWindow::Weekly) => stats.sent_weekly += 1,
                (false, _) => stats.pending += 1,
            }
        }
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Directory and triggers
// ---------------------------------------------------------------------------

#[async_trait]
impl RecipientDirectory for InMemoryStore {
    async fn find_recipient(&self, user_id: DbId) -> StoreResult<Option<Recipient>> {
        Ok(lock(&self.recipients)
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned())
    }
}

#[async_trait]
impl TriggerSource for InMemoryStore {
    async fn assessments_due_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Vec<AssessmentDueRow>> {
        Ok(lock(&self.assessments_due)
            .iter()
            .filter(|r| r.due_date >= from && r.due_date < to)
            .cloned()
            .collect())
    }

    async fn weekly_activity(
        &self,
        _since: Timestamp,
        _until: Timestamp,
    ) -> StoreResult<Vec<WeeklyActivityRow>> {
        Ok(lock(&self.weekly_activity).clone())
    }

    async fn live_sessions_starting_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Vec<LiveSessionAttendeeRow>> {
        Ok(lock(&self.live_sessions)
            .iter()
            .filter(|r| r.scheduled_at >= from && r.scheduled_at <= to)
            .cloned()
            .collect())
    }

    async fn at_risk_students(&self) -> StoreResult<Vec<AtRiskStudentRow>> {
        Ok(lock(&self.at_risk)
            .iter()
            .filter(|r| r.risk_level.is_reportable())
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};
    use coursecast_core::notification::{NotificationRequest, NotificationType};
    use coursecast_core::types::new_id;

    fn notification(user_id: DbId, now: Timestamp) -> Notification {
        Notification::from_request(
            NotificationRequest::new(user_id, NotificationType::Course, "t", "m"),
            now,
        )
    }

    #[tokio::test]
    async fn preferences_are_created_once() {
        let store = InMemoryStore::new();
        let user = new_id();
        let first = store.load_or_create_preferences(user, Utc::now()).await.unwrap();
        let second = store
            .load_or_create_preferences(user, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn claim_is_single_shot() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let entry = DeferredEntry::queued(
            NotificationRequest::new(new_id(), NotificationType::Progress, "t", "m"),
            now,
        );
        store.enqueue_deferred(&entry).await.unwrap();

        assert!(store
            .claim_deferred(entry.id, DeferredStatus::Delivered, now)
            .await
            .unwrap());
        assert!(!store
            .claim_deferred(entry.id, DeferredStatus::Delivered, now)
            .await
            .unwrap());
        assert!(store.list_queued().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn release_requeues_a_delivered_claim() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let entry = DeferredEntry::queued(
            NotificationRequest::new(new_id(), NotificationType::Progress, "t", "m"),
            now,
        );
        store.enqueue_deferred(&entry).await.unwrap();
        store
            .claim_deferred(entry.id, DeferredStatus::Delivered, now)
            .await
            .unwrap();
        assert!(store.release_deferred(entry.id).await.unwrap());
        assert_eq!(store.queued_count(entry.request.user_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expired_notifications_are_hidden_from_counts() {
        let store = InMemoryStore::new();
        let user = new_id();
        let now = Utc::now();
        let mut expired = notification(user, now - Duration::hours(2));
        expired.expires_at = Some(now - Duration::hours(1));
        store.insert_notification(&expired).await.unwrap();
        store.insert_notification(&notification(user, now)).await.unwrap();

        assert_eq!(store.unread_count(user, now).await.unwrap(), 1);
        let listed = store
            .list_notifications(user, &NotificationFilter::default(), now)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(store.delete_expired(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mark_read_keeps_first_read_at() {
        let store = InMemoryStore::new();
        let user = new_id();
        let now = Utc::now();
        let n = notification(user, now);
        store.insert_notification(&n).await.unwrap();

        assert!(store.mark_read(n.id, user, now).await.unwrap());
        assert!(store
            .mark_read(n.id, user, now + Duration::minutes(5))
            .await
            .unwrap());
        let stored = store.find_notification(n.id, user).await.unwrap().unwrap();
        assert_eq!(stored.read_at, Some(now));
        assert!(!store.mark_read(n.id, new_id(), now).await.unwrap());
    }

    #[tokio::test]
    async fn failing_writes_surface_as_unavailable() {
        let store = InMemoryStore::new();
        store.set_fail_writes(true);
        let result = store
            .insert_notification(&notification(new_id(), Utc::now()))
            .await;
        assert_matches!(result, Err(StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn mark_digest_sent_respects_cutoff() {
        let store = InMemoryStore::new();
        let user = new_id();
        let now = Utc::now();
        for offset in [-2, -1, 3] {
            store
                .enqueue_digest(&DigestEntry {
                    id: new_id(),
                    user_id: user,
                    notification_id: new_id(),
                    window: DigestWindow::Daily,
                    scheduled_for: now + Duration::hours(offset),
                    sent: false,
                    sent_at: None,
                    created_at: now - Duration::days(1),
                })
                .await
                .unwrap();
        }
        let marked = store
            .mark_digest_sent(user, DigestWindow::Daily, now, now)
            .await
            .unwrap();
        assert_eq!(marked, 2);
        let stats = store.digest_stats().await.unwrap();
        assert_eq!((stats.sent_daily, stats.pending), (2, 1));
    }
}
