use std::sync::Arc;

use coursecast_core::clock::Clock;
use coursecast_core::preferences::{NotificationPreferences, PreferencesPatch};
use coursecast_core::types::DbId;
use coursecast_db::store::PreferenceStore;

use crate::error::NotificationResult;

/// Read and update per-user notification preferences. A user without a
/// record gets the defaults, persisted on first access.
pub struct PreferenceService {
    store: Arc<dyn PreferenceStore>,
    clock: Arc<dyn Clock>,
}

impl PreferenceService {
    pub fn new(store: Arc<dyn PreferenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get(&self, user_id: DbId) -> NotificationResult<NotificationPreferences> {
        Ok(self
            .store
            .load_or_create_preferences(user_id, self.clock.now())
            .await?)
    }

    /// Apply a partial update. Fields absent from `patch` keep their value;
    /// an invalid patch leaves the stored record untouched.
    pub async fn update(
        &self,
        user_id: DbId,
        patch: &PreferencesPatch,
    ) -> NotificationResult<NotificationPreferences> {
        let now = self.clock.now();
        let mut prefs = self.store.load_or_create_preferences(user_id, now).await?;
        prefs.apply(patch, now)?;
        let saved = self.store.save_preferences(&prefs).await?;
        tracing::info!(user_id = %user_id, "Notification preferences updated");
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{NaiveTime, Utc};
    use coursecast_core::clock::ManualClock;
    use coursecast_core::error::CoreError;
    use coursecast_core::preferences::DigestFrequency;
    use coursecast_core::types::new_id;
    use coursecast_db::InMemoryStore;

    use crate::error::NotificationError;

    fn service() -> PreferenceService {
        PreferenceService::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        )
    }

    fn patch(json: serde_json::Value) -> PreferencesPatch {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn first_read_returns_defaults() {
        let prefs = service().get(new_id()).await.unwrap();
        assert!(prefs.enable_risk_alerts);
        assert!(prefs.enable_email_notifications);
        assert_eq!(prefs.email_digest_frequency, DigestFrequency::Daily);
        assert!(prefs.quiet_hours().is_none());
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let service = service();
        let user = new_id();
        let updated = service
            .update(
                user,
                &patch(serde_json::json!({
                    "enableRiskAlerts": false,
                    "quietHoursStart": "22:00",
                    "quietHoursEnd": "06:00"
                })),
            )
            .await
            .unwrap();
        assert!(!updated.enable_risk_alerts);
        assert!(updated.enable_progress_notifications);
        assert_eq!(
            updated.quiet_hours_start,
            NaiveTime::from_hms_opt(22, 0, 0)
        );

        let reread = service.get(user).await.unwrap();
        assert_eq!(reread, updated);
    }

    #[tokio::test]
    async fn half_set_quiet_hours_is_rejected() {
        let service = service();
        let user = new_id();
        let result = service
            .update(user, &patch(serde_json::json!({ "quietHoursStart": "22:00" })))
            .await;
        assert_matches!(result, Err(NotificationError::Core(CoreError::Validation(_))));
        assert!(service.get(user).await.unwrap().quiet_hours_start.is_none());
    }
}
