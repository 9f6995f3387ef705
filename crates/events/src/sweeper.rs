//! Redelivery of notifications held back by quiet hours.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use coursecast_core::clock::Clock;
use coursecast_core::preferences::NotificationPreferences;
use coursecast_core::quiet_hours::{is_quiet_at, QuietHoursClock};
use coursecast_core::types::{DbId, Timestamp};
use coursecast_db::store::{DeferredEntry, DeferredQueueStore, DeferredStatus, PreferenceStore};

use crate::dispatcher::NotificationDispatcher;
use crate::error::NotificationResult;
use crate::guard::InFlightGuard;

/// Outcome of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub delivered: usize,
    pub expired: usize,
    /// Entries left queued because their user is still in quiet hours.
    pub still_quiet: usize,
    /// Entries that hit a store error. They stay queued for the next pass.
    pub failed: usize,
    /// Another sweep was running; this one did nothing.
    pub skipped: bool,
}

/// Walks the deferred queue and delivers every entry whose user has left
/// quiet hours.
///
/// Each entry is claimed before it is delivered. A claim is a
/// compare-and-swap on the `queued` status, so two sweeps racing for one
/// entry deliver it once. If delivery fails after the claim, the claim is
/// released and the entry is retried on the next pass. An error on one
/// entry is logged and the pass moves on to the next.
pub struct DeferredSweeper {
    deferred: Arc<dyn DeferredQueueStore>,
    preferences: Arc<dyn PreferenceStore>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    quiet_hours_clock: QuietHoursClock,
    guard: InFlightGuard,
}

impl DeferredSweeper {
    pub fn new(
        deferred: Arc<dyn DeferredQueueStore>,
        preferences: Arc<dyn PreferenceStore>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        quiet_hours_clock: QuietHoursClock,
    ) -> Self {
        Self {
            deferred,
            preferences,
            dispatcher,
            clock,
            quiet_hours_clock,
            guard: InFlightGuard::new(),
        }
    }

    pub async fn sweep(&self) -> NotificationResult<SweepReport> {
        let Some(_permit) = self.guard.try_begin() else {
            tracing::warn!("Deferred sweep already running, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..Default::default()
            });
        };

        let now = self.clock.now();
        let queued = self.deferred.list_queued().await?;
        if queued.is_empty() {
            tracing::debug!("Deferred queue empty");
            return Ok(SweepReport::default());
        }

        // Current preferences, not the ones in force when the entry was
        // queued. Loaded once per user per pass.
        let mut prefs_by_user: HashMap<DbId, NotificationPreferences> = HashMap::new();
        let mut report = SweepReport::default();

        for entry in queued {
            let deferred_id = entry.id;

            if entry.request.is_expired_at(now) {
                match self
                    .deferred
                    .claim_deferred(deferred_id, DeferredStatus::Expired, now)
                    .await
                {
                    Ok(true) => {
                        tracing::debug!(deferred_id = %deferred_id, "Deferred notification expired");
                        report.expired += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(
                            deferred_id = %deferred_id,
                            error = %e,
                            "Failed to expire deferred notification"
                        );
                        report.failed += 1;
                    }
                }
                continue;
            }

            let user_id = entry.request.user_id;
            let prefs = match prefs_by_user.entry(user_id) {
                Entry::Occupied(cached) => cached.into_mut(),
                Entry::Vacant(slot) => {
                    match self.preferences.load_or_create_preferences(user_id, now).await {
                        Ok(prefs) => slot.insert(prefs),
                        Err(e) => {
                            tracing::error!(
                                user_id = %user_id,
                                deferred_id = %deferred_id,
                                error = %e,
                                "Failed to load preferences for deferred notification"
                            );
                            report.failed += 1;
                            continue;
                        }
                    }
                }
            };
            if is_quiet_at(prefs, now, self.quiet_hours_clock) {
                report.still_quiet += 1;
                continue;
            }

            match self.deliver(entry, now).await {
                Ok(true) => report.delivered += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        deferred_id = %deferred_id,
                        user_id = %user_id,
                        error = %e,
                        "Failed to redeliver deferred notification"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.delivered > 0 || report.expired > 0 || report.failed > 0 {
            tracing::info!(
                delivered = report.delivered,
                expired = report.expired,
                still_quiet = report.still_quiet,
                failed = report.failed,
                "Deferred sweep completed"
            );
        }
        Ok(report)
    }

    /// Claim then deliver. `Ok(false)` when another sweep won the claim.
    async fn deliver(&self, entry: DeferredEntry, now: Timestamp) -> NotificationResult<bool> {
        if !self
            .deferred
            .claim_deferred(entry.id, DeferredStatus::Delivered, now)
            .await?
        {
            return Ok(false);
        }

        match self.dispatcher.create_direct(entry.request).await {
            Ok(notification) => {
                tracing::debug!(
                    deferred_id = %entry.id,
                    notification_id = %notification.id,
                    "Deferred notification delivered"
                );
                Ok(true)
            }
            Err(e) => {
                if let Err(release_err) = self.deferred.release_deferred(entry.id).await {
                    tracing::error!(
                        deferred_id = %entry.id,
                        error = %release_err,
                        "Failed to release deferred claim"
                    );
                }
                Err(e)
            }
        }
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Deferred sweeper cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Deferred sweep failed");
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
    use chrono::Duration as ChronoDuration;
    use coursecast_core::notification::{NotificationRequest, NotificationType};
    use coursecast_core::preferences::PreferencesPatch;

    use crate::dispatcher::DispatchOutcome;
    use crate::testing::Harness;

    /// Quiet 09:00-11:00 UTC; the harness clock starts at 10:00.
    async fn quiet_user(h: &Harness) -> DbId {
        let user = h.add_user("ada@example.com", "Ada");
        let patch: PreferencesPatch = serde_json::from_value(serde_json::json!({
            "quietHoursStart": "09:00",
            "quietHoursEnd": "11:00"
        }))
        .unwrap();
        h.core.preferences.update(user, &patch).await.unwrap();
        user
    }

    async fn defer(h: &Harness, user: DbId) -> DbId {
        let outcome = h
            .core
            .dispatcher
            .create(NotificationRequest::new(user, NotificationType::Course, "t", "m"))
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Deferred(id) => id,
            other => panic!("expected deferral, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn entries_stay_queued_during_quiet_hours() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        defer(&h, user).await;

        let report = h.core.sweeper.sweep().await.unwrap();
        assert_eq!(report.still_quiet, 1);
        assert_eq!(report.delivered, 0);
        assert!(h.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn sweep_twice_delivers_once() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        defer(&h, user).await;
        defer(&h, user).await;

        h.clock.advance(ChronoDuration::hours(2));
        let first = h.core.sweeper.sweep().await.unwrap();
        let second = h.core.sweeper.sweep().await.unwrap();

        assert_eq!(first.delivered, 2);
        assert_eq!(second, SweepReport::default());
        assert_eq!(h.store.notifications().len(), 2);
        assert!(h
            .store
            .deferred_entries()
            .iter()
            .all(|e| e.status == DeferredStatus::Delivered));
    }

    #[tokio::test]
    async fn current_preferences_decide_release() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        defer(&h, user).await;

        let clear: PreferencesPatch = serde_json::from_value(serde_json::json!({
            "quietHoursStart": null,
            "quietHoursEnd": null
        }))
        .unwrap();
        h.core.preferences.update(user, &clear).await.unwrap();

        let report = h.core.sweeper.sweep().await.unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(h.store.notifications().len(), 1);
    }

    #[tokio::test]
    async fn widened_window_keeps_entries_queued() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        defer(&h, user).await;

        let wider: PreferencesPatch = serde_json::from_value(serde_json::json!({
            "quietHoursEnd": "13:00"
        }))
        .unwrap();
        h.core.preferences.update(user, &wider).await.unwrap();
        h.clock.advance(ChronoDuration::hours(2));

        let report = h.core.sweeper.sweep().await.unwrap();
        assert_eq!(report.still_quiet, 1);
        assert!(h.store.notifications().is_empty());
    }

    #[tokio::test]
    async fn expired_entries_are_never_delivered() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        let request = NotificationRequest::new(user, NotificationType::Course, "t", "m")
            .with_expiry(h.clock.now() + ChronoDuration::minutes(30));
        h.core.dispatcher.create(request).await.unwrap();

        h.clock.advance(ChronoDuration::hours(2));
        let report = h.core.sweeper.sweep().await.unwrap();

        assert_eq!(report.expired, 1);
        assert_eq!(report.delivered, 0);
        assert!(h.store.notifications().is_empty());
        assert_eq!(h.store.deferred_entries()[0].status, DeferredStatus::Expired);
    }

    #[tokio::test]
    async fn failed_delivery_releases_the_claim() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        let id = defer(&h, user).await;
        h.clock.advance(ChronoDuration::hours(2));

        h.store.set_fail_notification_inserts(true);
        let failed = h.core.sweeper.sweep().await.unwrap();
        assert_eq!((failed.failed, failed.delivered), (1, 0));
        h.store.set_fail_notification_inserts(false);

        let entry = h
            .store
            .deferred_entries()
            .into_iter()
            .find(|e| e.id == id)
            .unwrap();
        assert_eq!(entry.status, DeferredStatus::Queued);

        let report = h.core.sweeper.sweep().await.unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn one_failing_entry_does_not_hold_back_the_rest() {
        let h = Harness::new();
        let unlucky = quiet_user(&h).await;
        let other = {
            let user = h.add_user("bob@example.com", "Bob");
            let patch: PreferencesPatch = serde_json::from_value(serde_json::json!({
                "quietHoursStart": "09:00",
                "quietHoursEnd": "11:00"
            }))
            .unwrap();
            h.core.preferences.update(user, &patch).await.unwrap();
            user
        };
        let stuck = defer(&h, unlucky).await;
        defer(&h, other).await;
        defer(&h, other).await;
        h.clock.advance(ChronoDuration::hours(2));

        h.store.set_fail_notification_inserts_for(unlucky, true);
        let report = h.core.sweeper.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 2);
        let stored = h.store.notifications();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|n| n.user_id == other));
        let entry = h
            .store
            .deferred_entries()
            .into_iter()
            .find(|e| e.id == stuck)
            .unwrap();
        assert_eq!(entry.status, DeferredStatus::Queued);
    }

    #[tokio::test]
    async fn redelivery_does_not_recheck_category() {
        let h = Harness::new();
        let user = quiet_user(&h).await;
        defer(&h, user).await;

        let off: PreferencesPatch =
            serde_json::from_value(serde_json::json!({ "enableCourseUpdates": false })).unwrap();
        h.core.preferences.update(user, &off).await.unwrap();
        h.clock.advance(ChronoDuration::hours(2));

        let report = h.core.sweeper.sweep().await.unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn overlapping_sweep_is_skipped() {
        let h = Harness::new();
        let _held = h.core.sweeper.guard.try_begin();
        let report = h.core.sweeper.sweep().await.unwrap();
        assert!(report.skipped);
    }
}
