//! The user-facing read side: listing, counting, marking and deleting a
//! user's own notifications.

use std::sync::Arc;

use coursecast_core::clock::Clock;
use coursecast_core::notification::{Notification, NotificationFilter};
use coursecast_core::types::DbId;
use coursecast_db::store::{DeferredQueueStore, NotificationStore};

use crate::error::NotificationResult;

pub struct Inbox {
    notifications: Arc<dyn NotificationStore>,
    deferred: Arc<dyn DeferredQueueStore>,
    clock: Arc<dyn Clock>,
}

impl Inbox {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        deferred: Arc<dyn DeferredQueueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifications,
            deferred,
            clock,
        }
    }

    /// Newest first. The filter limit is clamped to `1..=100`.
    pub async fn list(
        &self,
        user_id: DbId,
        filter: NotificationFilter,
    ) -> NotificationResult<Vec<Notification>> {
        Ok(self
            .notifications
            .list_notifications(user_id, &filter.normalized(), self.clock.now())
            .await?)
    }

    pub async fn get(&self, id: DbId, user_id: DbId) -> NotificationResult<Option<Notification>> {
        Ok(self.notifications.find_notification(id, user_id).await?)
    }

    pub async fn unread_count(&self, user_id: DbId) -> NotificationResult<i64> {
        Ok(self
            .notifications
            .unread_count(user_id, self.clock.now())
            .await?)
    }

    /// Deferred entries still held back by quiet hours.
    pub async fn queued_count(&self, user_id: DbId) -> NotificationResult<i64> {
        Ok(self.deferred.queued_count(user_id).await?)
    }

    /// `false` when the notification does not exist or is not the user's.
    pub async fn mark_read(&self, id: DbId, user_id: DbId) -> NotificationResult<bool> {
        Ok(self
            .notifications
            .mark_read(id, user_id, self.clock.now())
            .await?)
    }

    pub async fn mark_all_read(&self, user_id: DbId) -> NotificationResult<u64> {
        let count = self
            .notifications
            .mark_all_read(user_id, self.clock.now())
            .await?;
        tracing::debug!(user_id = %user_id, count, "Marked all notifications read");
        Ok(count)
    }

    pub async fn delete(&self, id: DbId, user_id: DbId) -> NotificationResult<bool> {
        Ok(self.notifications.delete_notification(id, user_id).await?)
    }

    /// Delete every notification whose expiry has passed.
    pub async fn cleanup_expired(&self) -> NotificationResult<u64> {
        let deleted = self.notifications.delete_expired(self.clock.now()).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Expired notifications removed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use coursecast_core::clock::ManualClock;
    use coursecast_core::notification::{NotificationRequest, NotificationType, Priority};
    use coursecast_core::types::new_id;
    use coursecast_db::InMemoryStore;

    struct Fixture {
        store: Arc<InMemoryStore>,
        clock: Arc<ManualClock>,
        inbox: Inbox,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let inbox = Inbox::new(store.clone(), store.clone(), clock.clone());
        Fixture {
            store,
            clock,
            inbox,
        }
    }

    async fn seed(f: &Fixture, user: DbId, priority: Priority) -> Notification {
        let n = Notification::from_request(
            NotificationRequest::new(user, NotificationType::Course, "t", "m")
                .with_priority(priority),
            f.clock.now(),
        );
        f.store.insert_notification(&n).await.unwrap();
        f.clock.advance(Duration::seconds(1));
        n
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filterable() {
        let f = fixture();
        let user = new_id();
        let first = seed(&f, user, Priority::Low).await;
        let second = seed(&f, user, Priority::Urgent).await;

        let all = f.inbox.list(user, NotificationFilter::default()).await.unwrap();
        assert_eq!(
            all.iter().map(|n| n.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );

        let urgent = f
            .inbox
            .list(
                user,
                NotificationFilter {
                    priority: Some(Priority::Urgent),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(urgent.len(), 1);
        assert_eq!(urgent[0].id, second.id);
    }

    #[tokio::test]
    async fn mark_read_is_scoped_to_owner() {
        let f = fixture();
        let user = new_id();
        let n = seed(&f, user, Priority::Normal).await;

        assert!(!f.inbox.mark_read(n.id, new_id()).await.unwrap());
        assert_eq!(f.inbox.unread_count(user).await.unwrap(), 1);
        assert!(f.inbox.mark_read(n.id, user).await.unwrap());
        assert_eq!(f.inbox.unread_count(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mark_all_read_counts_only_unread() {
        let f = fixture();
        let user = new_id();
        let n = seed(&f, user, Priority::Normal).await;
        seed(&f, user, Priority::Normal).await;
        f.inbox.mark_read(n.id, user).await.unwrap();

        assert_eq!(f.inbox.mark_all_read(user).await.unwrap(), 1);
        assert_eq!(f.inbox.mark_all_read(user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_removes_only_owned_notification() {
        let f = fixture();
        let user = new_id();
        let n = seed(&f, user, Priority::Normal).await;

        assert!(!f.inbox.delete(n.id, new_id()).await.unwrap());
        assert!(f.inbox.delete(n.id, user).await.unwrap());
        assert!(f.inbox.get(n.id, user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_expired_only() {
        let f = fixture();
        let user = new_id();
        let now = f.clock.now();
        let expiring = Notification::from_request(
            NotificationRequest::new(user, NotificationType::Course, "t", "m")
                .with_expiry(now + Duration::minutes(5)),
            now,
        );
        f.store.insert_notification(&expiring).await.unwrap();
        seed(&f, user, Priority::Normal).await;

        assert_eq!(f.inbox.cleanup_expired().await.unwrap(), 0);
        f.clock.advance(Duration::minutes(10));
        assert_eq!(f.inbox.cleanup_expired().await.unwrap(), 1);
        assert_eq!(f.store.notifications().len(), 1);
    }
}
