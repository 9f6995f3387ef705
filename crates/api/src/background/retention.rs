//! Periodic cleanup of expired notifications and old sent digests.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use coursecast_events::NotificationCore;

/// Run the retention loop until `cancel` fires.
pub async fn run(core: Arc<NotificationCore>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Retention job started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention job stopping");
                break;
            }
            _ = ticker.tick() => {
                run_once(&core).await;
            }
        }
    }
}

/// One retention pass. Failures are logged; the next tick retries.
pub async fn run_once(core: &NotificationCore) {
    match core.inbox.cleanup_expired().await {
        Ok(0) => tracing::debug!("Retention: no expired notifications"),
        Ok(_) => {}
        Err(e) => tracing::error!(error = %e, "Retention: expired notification cleanup failed"),
    }

    match core.digests.purge_sent().await {
        Ok(0) => tracing::debug!("Retention: no sent digests to purge"),
        Ok(purged) => tracing::info!(purged, "Retention: purged sent digest entries"),
        Err(e) => tracing::error!(error = %e, "Retention: digest purge failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use coursecast_core::clock::Clock;
    use coursecast_core::notification::{NotificationRequest, NotificationType};
    use coursecast_events::testing::Harness;

    #[tokio::test]
    async fn expired_notifications_are_removed() {
        let h = Harness::new();
        let user = h.add_user("ada@example.com", "Ada");
        let request = NotificationRequest::new(user, NotificationType::Course, "t", "m")
            .with_expiry(h.clock.now() + ChronoDuration::hours(1));
        h.core.dispatcher.create(request).await.unwrap();
        h.core
            .dispatcher
            .create(NotificationRequest::new(user, NotificationType::Course, "kept", "m"))
            .await
            .unwrap();

        h.clock.advance(ChronoDuration::hours(2));
        run_once(&h.core).await;

        let remaining = h.store.notifications();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "kept");
    }
}
