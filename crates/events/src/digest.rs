//! Digest aggregation and flushing.
//!
//! [`DigestAggregator`] queues notifications for a user's daily or weekly
//! digest and, on each poll, sends one batched email per user whose entries
//! are due. Entries are marked sent only after the email went out, all of a
//! user's due entries at once; a failed send leaves them for the next run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use coursecast_core::clock::Clock;
use coursecast_core::digest::{render_digest, scheduled_for, DIGEST_RETENTION_DAYS};
use coursecast_core::notification::Notification;
use coursecast_core::preferences::DigestWindow;
use coursecast_core::types::{new_id, DbId, Timestamp};
use coursecast_db::store::{DigestEntry, DigestQueueStore, DigestStats, Recipient};

use crate::delivery::email::{EmailLinks, EmailMessage, EmailSender};
use crate::error::NotificationResult;
use crate::guard::InFlightGuard;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything due for one user in one window, newest notification first.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDigest {
    pub recipient: Recipient,
    pub window: DigestWindow,
    pub notifications: Vec<Notification>,
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Digest emails sent.
    pub sent: usize,
    /// Users whose digest could not be sent or marked; retried next run.
    pub failed: usize,
    /// Queue entries marked sent.
    pub entries_marked: u64,
    /// The pass did nothing because another flush of the window was running.
    pub skipped: bool,
}

// ---------------------------------------------------------------------------
// DigestAggregator
// ---------------------------------------------------------------------------

pub struct DigestAggregator {
    store: Arc<dyn DigestQueueStore>,
    email: Option<Arc<dyn EmailSender>>,
    links: EmailLinks,
    clock: Arc<dyn Clock>,
    daily_guard: InFlightGuard,
    weekly_guard: InFlightGuard,
}

impl DigestAggregator {
    pub fn new(
        store: Arc<dyn DigestQueueStore>,
        email: Option<Arc<dyn EmailSender>>,
        links: EmailLinks,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            email,
            links,
            clock,
            daily_guard: InFlightGuard::new(),
            weekly_guard: InFlightGuard::new(),
        }
    }

    fn guard(&self, window: DigestWindow) -> &InFlightGuard {
        match window {
            DigestWindow::Daily => &self.daily_guard,
            DigestWindow::Weekly => &self.weekly_guard,
        }
    }

    /// Queue `notification_id` for the user's next `window` digest.
    pub async fn enqueue(
        &self,
        user_id: DbId,
        notification_id: DbId,
        window: DigestWindow,
    ) -> NotificationResult<DigestEntry> {
        let now = self.clock.now();
        let entry = DigestEntry {
            id: new_id(),
            user_id,
            notification_id,
            window,
            scheduled_for: scheduled_for(window, now),
            sent: false,
            sent_at: None,
            created_at: now,
        };
        self.store.enqueue_digest(&entry).await?;
        tracing::debug!(
            user_id = %user_id,
            notification_id = %notification_id,
            window = %window,
            scheduled_for = %entry.scheduled_for,
            "Notification queued for digest"
        );
        Ok(entry)
    }

    /// Due, unsent entries of `window` grouped per user.
    pub async fn due_digests(&self, window: DigestWindow) -> NotificationResult<Vec<UserDigest>> {
        self.due_digests_at(window, self.clock.now()).await
    }

    async fn due_digests_at(
        &self,
        window: DigestWindow,
        now: Timestamp,
    ) -> NotificationResult<Vec<UserDigest>> {
        let rows = self.store.due_digest_rows(window, now).await?;

        let mut grouped: IndexMap<DbId, UserDigest> = IndexMap::new();
        for row in rows {
            grouped
                .entry(row.recipient.user_id)
                .or_insert_with(|| UserDigest {
                    recipient: row.recipient.clone(),
                    window,
                    notifications: Vec::new(),
                })
                .notifications
                .push(row.notification);
        }

        let mut digests: Vec<UserDigest> = grouped.into_values().collect();
        for digest in &mut digests {
            digest
                .notifications
                .sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        Ok(digests)
    }

    /// Send every due digest of `window`.
    ///
    /// A second call while one is running for the same window returns a
    /// report with `skipped` set.
    pub async fn flush(&self, window: DigestWindow) -> NotificationResult<FlushReport> {
        let Some(_permit) = self.guard(window).try_begin() else {
            tracing::warn!(window = %window, "Digest flush already running, skipping");
            return Ok(FlushReport {
                skipped: true,
                ..Default::default()
            });
        };

        let Some(sender) = &self.email else {
            tracing::debug!(window = %window, "Email channel not configured, digests stay queued");
            return Ok(FlushReport::default());
        };

        let cutoff = self.clock.now();
        let digests = self.due_digests_at(window, cutoff).await?;
        if digests.is_empty() {
            tracing::debug!(window = %window, "No digests due");
            return Ok(FlushReport::default());
        }

        let mut report = FlushReport::default();
        for digest in &digests {
            let user_id = digest.recipient.user_id;
            let rendered = render_digest(
                &digest.recipient.first_name,
                window,
                &digest.notifications,
                &self.links.notification_center(),
            );
            let message = EmailMessage::from_rendered(digest.recipient.email.clone(), rendered);

            if let Err(e) = sender.send(&message).await {
                tracing::warn!(
                    user_id = %user_id,
                    window = %window,
                    error = %e,
                    "Digest email failed, entries left for next run"
                );
                report.failed += 1;
                continue;
            }

            match self
                .store
                .mark_digest_sent(user_id, window, cutoff, self.clock.now())
                .await
            {
                Ok(marked) => {
                    report.sent += 1;
                    report.entries_marked += marked;
                    tracing::info!(
                        user_id = %user_id,
                        window = %window,
                        notification_count = digest.notifications.len(),
                        "Digest sent"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        window = %window,
                        error = %e,
                        "Digest sent but entries could not be marked"
                    );
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            window = %window,
            sent = report.sent,
            failed = report.failed,
            "Processed digest deliveries"
        );
        Ok(report)
    }

    /// Delete sent entries older than the retention period.
    pub async fn purge_sent(&self) -> NotificationResult<u64> {
        let older_than = self.clock.now() - ChronoDuration::days(DIGEST_RETENTION_DAYS);
        Ok(self.store.purge_sent_digests(older_than).await?)
    }

    pub async fn stats(&self) -> NotificationResult<DigestStats> {
        Ok(self.store.digest_stats().await?)
    }

    /// Run the flush loop for one window until `cancel` fires.
    pub async fn run(&self, window: DigestWindow, poll_interval: Duration, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(poll_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(window = %window, "Digest scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.flush(window).await {
                        tracing::error!(window = %window, error = %e, "Failed to process digests");
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use coursecast_core::clock::ManualClock;
    use coursecast_core::notification::{NotificationRequest, NotificationType};
    use coursecast_db::store::NotificationStore;
    use coursecast_db::InMemoryStore;

    use crate::testing::RecordingEmailSender;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        email: Arc<RecordingEmailSender>,
        digests: DigestAggregator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        // Wednesday 2026-03-04 10:00 UTC.
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 4, 10, 0, 0).unwrap(),
        ));
        let email = Arc::new(RecordingEmailSender::new());
        let digests = DigestAggregator::new(
            store.clone(),
            Some(email.clone() as Arc<dyn EmailSender>),
            EmailLinks::default(),
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            email,
            digests,
        }
    }

    async fn queue_n(f: &Fixture, user: DbId, n: usize, window: DigestWindow) {
        for i in 0..n {
            let notification = Notification::from_request(
                NotificationRequest::new(user, NotificationType::Progress, format!("n{i}"), "m"),
                f.clock.now(),
            );
            f.store.insert_notification(&notification).await.unwrap();
            f.digests
                .enqueue(user, notification.id, window)
                .await
                .unwrap();
            f.clock.advance(ChronoDuration::minutes(1));
        }
    }

    fn add_recipient(f: &Fixture, user: DbId) {
        f.store.add_recipient(Recipient {
            user_id: user,
            email: "ada@example.com".into(),
            first_name: "Ada".into(),
        });
    }

    #[tokio::test]
    async fn nothing_is_due_before_rollover() {
        let f = fixture();
        let user = uuid::Uuid::now_v7();
        add_recipient(&f, user);
        queue_n(&f, user, 2, DigestWindow::Daily).await;

        let report = f.digests.flush(DigestWindow::Daily).await.unwrap();
        assert_eq!(report, FlushReport::default());
        assert!(f.email.sent().is_empty());
    }

    #[tokio::test]
    async fn five_entries_flush_as_one_email() {
        let f = fixture();
        let user = uuid::Uuid::now_v7();
        add_recipient(&f, user);
        queue_n(&f, user, 5, DigestWindow::Daily).await;

        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap());
        let report = f.digests.flush(DigestWindow::Daily).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.entries_marked, 5);
        let sent = f.email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Your Daily Digest: 5 notifications");
        for i in 0..5 {
            assert!(sent[0].text_body.contains(&format!("n{i}")));
        }
        assert!(f.store.digest_entries().iter().all(|e| e.sent));

        let again = f.digests.flush(DigestWindow::Daily).await.unwrap();
        assert_eq!(again.sent, 0);
        assert_eq!(f.email.sent().len(), 1);
    }

    #[tokio::test]
    async fn failed_send_leaves_entries_unsent() {
        let f = fixture();
        let user = uuid::Uuid::now_v7();
        add_recipient(&f, user);
        queue_n(&f, user, 3, DigestWindow::Daily).await;
        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap());

        f.email.set_failing(true);
        let report = f.digests.flush(DigestWindow::Daily).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(f.store.digest_entries().iter().all(|e| !e.sent));

        f.email.set_failing(false);
        let report = f.digests.flush(DigestWindow::Daily).await.unwrap();
        assert_eq!(report.entries_marked, 3);
    }

    #[tokio::test]
    async fn weekly_entries_wait_for_monday() {
        let f = fixture();
        let user = uuid::Uuid::now_v7();
        add_recipient(&f, user);
        queue_n(&f, user, 1, DigestWindow::Weekly).await;

        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 8, 23, 0, 0).unwrap());
        assert!(f.digests.due_digests(DigestWindow::Weekly).await.unwrap().is_empty());

        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 9, 8, 0, 0).unwrap());
        let due = f.digests.due_digests(DigestWindow::Weekly).await.unwrap();
        assert_eq!(due.len(), 1);
        assert!(f.digests.due_digests(DigestWindow::Daily).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn digests_are_grouped_per_user_newest_first() {
        let f = fixture();
        let (a, b) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());
        add_recipient(&f, a);
        add_recipient(&f, b);
        queue_n(&f, a, 2, DigestWindow::Daily).await;
        queue_n(&f, b, 1, DigestWindow::Daily).await;

        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap());
        let due = f.digests.due_digests(DigestWindow::Daily).await.unwrap();
        assert_eq!(due.len(), 2);
        let for_a = due.iter().find(|d| d.recipient.user_id == a).unwrap();
        assert_eq!(for_a.notifications[0].title, "n1");
        assert_eq!(for_a.notifications[1].title, "n0");
    }

    #[tokio::test]
    async fn purge_keeps_recent_sent_entries() {
        let f = fixture();
        let user = uuid::Uuid::now_v7();
        add_recipient(&f, user);
        queue_n(&f, user, 1, DigestWindow::Daily).await;
        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap());
        f.digests.flush(DigestWindow::Daily).await.unwrap();

        assert_eq!(f.digests.purge_sent().await.unwrap(), 0);
        f.clock.advance(ChronoDuration::days(31));
        assert_eq!(f.digests.purge_sent().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn large_digest_marks_every_entry_but_lists_twenty() {
        let f = fixture();
        let user = uuid::Uuid::now_v7();
        add_recipient(&f, user);
        queue_n(&f, user, 25, DigestWindow::Daily).await;

        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap());
        let report = f.digests.flush(DigestWindow::Daily).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(report.entries_marked, 25);
        assert!(f.store.digest_entries().iter().all(|e| e.sent));

        let sent = f.email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Your Daily Digest: 25 notifications");
        assert!(sent[0].text_body.contains("n24"));
        assert!(sent[0]
            .text_body
            .contains("+ 5 more notifications in your notification center"));
    }

    #[tokio::test]
    async fn purge_drops_entries_of_deleted_users() {
        let f = fixture();
        let (kept, gone) = (uuid::Uuid::now_v7(), uuid::Uuid::now_v7());
        add_recipient(&f, kept);
        queue_n(&f, kept, 1, DigestWindow::Daily).await;
        queue_n(&f, gone, 2, DigestWindow::Daily).await;

        f.clock
            .set(Utc.with_ymd_and_hms(2026, 3, 5, 8, 0, 0).unwrap());
        f.email.set_failing(true);
        f.digests.flush(DigestWindow::Daily).await.unwrap();
        assert_eq!(f.store.digest_entries().len(), 3);

        // Still inside the retention period: nothing is purged yet.
        assert_eq!(f.digests.purge_sent().await.unwrap(), 0);

        f.clock.advance(ChronoDuration::days(31));
        assert_eq!(f.digests.purge_sent().await.unwrap(), 2);
        let left = f.store.digest_entries();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].user_id, kept);
        assert!(!left[0].sent);
    }
}
