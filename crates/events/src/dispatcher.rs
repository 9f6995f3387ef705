//! Notification creation and channel routing.
//!
//! [`NotificationDispatcher::create`] is the single entry point for new
//! notifications. It decides, from the recipient's current preferences,
//! whether the request is dropped, deferred until quiet hours end, or
//! persisted and fanned out:
//!
//! ```text
//! category disabled  -> Suppressed (nothing written)
//! quiet hours active -> Deferred   (deferred queue entry)
//! otherwise          -> Created    (notification row)
//!                         +- realtime push to user-{id}
//!                         +- email now        (email on, frequency realtime)
//!                         +- digest queue     (email on, daily / weekly)
//! ```
//!
//! Only persistence failures reach the caller. Realtime and email failures
//! are logged and dropped.

use std::sync::Arc;

use coursecast_core::channels::{user_room, CHANNEL_EMAIL};
use coursecast_core::clock::Clock;
use coursecast_core::digest::render_notification_email;
use coursecast_core::notification::{Notification, NotificationRequest};
use coursecast_core::preferences::NotificationPreferences;
use coursecast_core::quiet_hours::{is_quiet_at, QuietHoursClock};
use coursecast_core::types::{DbId, Timestamp};
use coursecast_db::store::{DeferredEntry, Stores};

use crate::delivery::email::{EmailLinks, EmailMessage, EmailSender};
use crate::delivery::realtime::{RealtimeEvent, RealtimeTransport};
use crate::delivery::{BackgroundTasks, DeliveryError};
use crate::digest::DigestAggregator;
use crate::error::NotificationResult;

/// What [`NotificationDispatcher::create`] did with a request.
///
/// The two ids are not interchangeable: a deferred id names a queue entry,
/// not a notification, and cannot be read, marked or deleted as one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Created(DbId),
    Deferred(DbId),
    /// The notification category is disabled for the user.
    Suppressed,
}

impl DispatchOutcome {
    /// The opaque id handed back to callers, if anything was written.
    pub fn id(&self) -> Option<DbId> {
        match self {
            DispatchOutcome::Created(id) | DispatchOutcome::Deferred(id) => Some(*id),
            DispatchOutcome::Suppressed => None,
        }
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, DispatchOutcome::Suppressed)
    }
}

pub struct NotificationDispatcher {
    stores: Stores,
    transport: Arc<dyn RealtimeTransport>,
    email: Option<Arc<dyn EmailSender>>,
    digests: Arc<DigestAggregator>,
    tasks: BackgroundTasks,
    links: EmailLinks,
    clock: Arc<dyn Clock>,
    quiet_hours_clock: QuietHoursClock,
}

impl NotificationDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stores: Stores,
        transport: Arc<dyn RealtimeTransport>,
        email: Option<Arc<dyn EmailSender>>,
        digests: Arc<DigestAggregator>,
        tasks: BackgroundTasks,
        links: EmailLinks,
        clock: Arc<dyn Clock>,
        quiet_hours_clock: QuietHoursClock,
    ) -> Self {
        Self {
            stores,
            transport,
            email,
            digests,
            tasks,
            links,
            clock,
            quiet_hours_clock,
        }
    }

    /// Create a notification, honoring category toggles and quiet hours.
    pub async fn create(&self, request: NotificationRequest) -> NotificationResult<DispatchOutcome> {
        let now = self.clock.now();
        request.validate_at(now)?;

        let prefs = self
            .stores
            .preferences
            .load_or_create_preferences(request.user_id, now)
            .await?;

        if !prefs.allows(request.notification_type) {
            tracing::info!(
                user_id = %request.user_id,
                notification_type = %request.notification_type,
                "Notification skipped: category disabled in preferences"
            );
            return Ok(DispatchOutcome::Suppressed);
        }

        if is_quiet_at(&prefs, now, self.quiet_hours_clock) {
            let entry = DeferredEntry::queued(request, now);
            self.stores.deferred.enqueue_deferred(&entry).await?;
            tracing::info!(
                user_id = %entry.request.user_id,
                deferred_id = %entry.id,
                "Notification deferred: user is in quiet hours"
            );
            return Ok(DispatchOutcome::Deferred(entry.id));
        }

        let notification = self.persist_and_fan_out(request, &prefs, now).await?;
        Ok(DispatchOutcome::Created(notification.id))
    }

    /// Persist and fan out a request whose routing was already decided when
    /// it was deferred. Neither quiet hours nor the category toggle are
    /// checked again.
    pub async fn create_direct(&self, request: NotificationRequest) -> NotificationResult<Notification> {
        let now = self.clock.now();
        let prefs = self
            .stores
            .preferences
            .load_or_create_preferences(request.user_id, now)
            .await?;
        self.persist_and_fan_out(request, &prefs, now).await
    }

    async fn persist_and_fan_out(
        &self,
        request: NotificationRequest,
        prefs: &NotificationPreferences,
        now: Timestamp,
    ) -> NotificationResult<Notification> {
        let notification = Notification::from_request(request, now);
        self.stores
            .notifications
            .insert_notification(&notification)
            .await?;

        tracing::info!(
            user_id = %notification.user_id,
            notification_id = %notification.id,
            notification_type = %notification.notification_type,
            priority = %notification.priority,
            "Notification created"
        );

        self.push_realtime(&notification).await;

        if prefs.wants_immediate_email() {
            self.send_email_in_background(&notification);
        } else if let Some(window) = prefs.digest_window() {
            // The notification is already visible in-app; a digest queue
            // failure only costs the email.
            if let Err(e) = self
                .digests
                .enqueue(notification.user_id, notification.id, window)
                .await
            {
                tracing::error!(
                    user_id = %notification.user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "Failed to queue notification for digest"
                );
            }
        }

        Ok(notification)
    }

    async fn push_realtime(&self, notification: &Notification) {
        let result = match RealtimeEvent::notification_created(notification) {
            Ok(event) => {
                self.transport
                    .emit(&[user_room(notification.user_id)], &event)
                    .await
            }
            Err(e) => Err(e),
        };
        match result {
            Ok(connections) => tracing::debug!(
                user_id = %notification.user_id,
                connections,
                "Notification pushed"
            ),
            Err(e) => tracing::warn!(
                user_id = %notification.user_id,
                notification_id = %notification.id,
                error = %e,
                "Realtime push failed"
            ),
        }
    }

    fn send_email_in_background(&self, notification: &Notification) {
        let Some(sender) = self.email.clone() else {
            tracing::debug!(
                user_id = %notification.user_id,
                "Email channel not configured, skipping immediate email"
            );
            return;
        };
        let recipients = Arc::clone(&self.stores.recipients);
        let notification = notification.clone();
        let settings_url = self.links.settings();

        self.tasks.spawn_isolated(CHANNEL_EMAIL, async move {
            let recipient = recipients
                .find_recipient(notification.user_id)
                .await?
                .ok_or(DeliveryError::RecipientMissing)?;
            let rendered =
                render_notification_email(&recipient.first_name, &notification, &settings_url);
            sender
                .send(&EmailMessage::from_rendered(recipient.email, rendered))
                .await?;
            Ok(())
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
