//! Store traits consumed by the delivery services.
//!
//! Every method takes explicit instants instead of reading the clock so
//! callers control time.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use coursecast_core::error::CoreError;
use coursecast_core::notification::{
    Notification, NotificationFilter, DedupeQuery, NotificationRequest,
};
use coursecast_core::preferences::{DigestWindow, NotificationPreferences};
use coursecast_core::triggers::{
    AssessmentDueRow, AtRiskStudentRow, LiveSessionAttendeeRow, WeeklyActivityRow,
};
use coursecast_core::types::{DbId, Timestamp};

use crate::error::StoreResult;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Lifecycle of a deferred entry. `Queued` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeferredStatus {
    Queued,
    Delivered,
    Expired,
}

impl DeferredStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeferredStatus::Queued => "queued",
            DeferredStatus::Delivered => "delivered",
            DeferredStatus::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, DeferredStatus::Queued)
    }
}

impl fmt::Display for DeferredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeferredStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(DeferredStatus::Queued),
            "delivered" => Ok(DeferredStatus::Delivered),
            "expired" => Ok(DeferredStatus::Expired),
            other => Err(CoreError::Validation(format!("Unknown deferred status '{other}'"))),
        }
    }
}

/// A notification request held back during quiet hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredEntry {
    pub id: DbId,
    pub request: NotificationRequest,
    pub status: DeferredStatus,
    pub queued_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

impl DeferredEntry {
    pub fn queued(request: NotificationRequest, now: Timestamp) -> Self {
        Self {
            id: coursecast_core::types::new_id(),
            request,
            status: DeferredStatus::Queued,
            queued_at: now,
            resolved_at: None,
        }
    }
}

/// A notification waiting for its user's next digest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestEntry {
    pub id: DbId,
    pub user_id: DbId,
    pub notification_id: DbId,
    pub window: DigestWindow,
    pub scheduled_for: Timestamp,
    pub sent: bool,
    pub sent_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Where digest and immediate emails go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub user_id: DbId,
    pub email: String,
    pub first_name: String,
}

/// One due digest entry joined with its notification and recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct DueDigestRow {
    pub entry_id: DbId,
    pub recipient: Recipient,
    pub notification: Notification,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestStats {
    pub sent_daily: i64,
    pub sent_weekly: i64,
    pub pending: i64,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Fetch the user's preferences, inserting defaults on first access.
    async fn load_or_create_preferences(
        &self,
        user_id: DbId,
        now: Timestamp,
    ) -> StoreResult<NotificationPreferences>;

    /// Persist a full preferences record.
    async fn save_preferences(
        &self,
        prefs: &NotificationPreferences,
    ) -> StoreResult<NotificationPreferences>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> StoreResult<()>;

    async fn find_notification(
        &self,
        id: DbId,
        user_id: DbId,
    ) -> StoreResult<Option<Notification>>;

    /// Newest first, expired rows excluded.
    async fn list_notifications(
        &self,
        user_id: DbId,
        filter: &NotificationFilter,
        now: Timestamp,
    ) -> StoreResult<Vec<Notification>>;

    /// Unread and not expired.
    async fn unread_count(&self, user_id: DbId, now: Timestamp) -> StoreResult<i64>;

    /// Returns `false` only when no such notification belongs to the user.
    /// An existing read timestamp is kept.
    async fn mark_read(&self, id: DbId, user_id: DbId, now: Timestamp) -> StoreResult<bool>;

    /// Returns the number of notifications that changed from unread to read.
    async fn mark_all_read(&self, user_id: DbId, now: Timestamp) -> StoreResult<u64>;

    async fn delete_notification(&self, id: DbId, user_id: DbId) -> StoreResult<bool>;

    /// Remove every notification whose expiry has passed.
    async fn delete_expired(&self, now: Timestamp) -> StoreResult<u64>;

    async fn exists_matching(&self, dedupe: &DedupeQuery) -> StoreResult<bool>;
}

#[async_trait]
pub trait DeferredQueueStore: Send + Sync {
    async fn enqueue_deferred(&self, entry: &DeferredEntry) -> StoreResult<()>;

    /// All entries still queued, oldest first.
    async fn list_queued(&self) -> StoreResult<Vec<DeferredEntry>>;

    /// Atomically move a queued entry to `to`. Returns `false` if the entry
    /// was no longer queued, meaning another caller already claimed it.
    async fn claim_deferred(
        &self,
        id: DbId,
        to: DeferredStatus,
        now: Timestamp,
    ) -> StoreResult<bool>;

    /// Put a delivered claim back to queued after its delivery failed.
    async fn release_deferred(&self, id: DbId) -> StoreResult<bool>;

    async fn queued_count(&self, user_id: DbId) -> StoreResult<i64>;

    /// Whether a still-queued entry satisfies the query, using `queued_at`
    /// as the creation instant.
    async fn exists_queued_matching(&self, dedupe: &DedupeQuery) -> StoreResult<bool>;
}

#[async_trait]
pub trait DigestQueueStore: Send + Sync {
    async fn enqueue_digest(&self, entry: &DigestEntry) -> StoreResult<()>;

    /// Unsent entries of `window` with `scheduled_for <= now`, joined with
    /// their notification and recipient, newest notification first.
    async fn due_digest_rows(
        &self,
        window: DigestWindow,
        now: Timestamp,
    ) -> StoreResult<Vec<DueDigestRow>>;

    /// Mark every unsent entry of the user and window scheduled at or before
    /// `cutoff` as sent, all or nothing.
    async fn mark_digest_sent(
        &self,
        user_id: DbId,
        window: DigestWindow,
        cutoff: Timestamp,
        sent_at: Timestamp,
    ) -> StoreResult<u64>;

    /// Delete sent entries whose `sent_at` is before `older_than`, and unsent
    /// entries scheduled before `older_than` that can no longer be delivered
    /// because their user or notification is gone.
    async fn purge_sent_digests(&self, older_than: Timestamp) -> StoreResult<u64>;

    async fn digest_stats(&self) -> StoreResult<DigestStats>;
}

#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    async fn find_recipient(&self, user_id: DbId) -> StoreResult<Option<Recipient>>;
}

/// Read-only domain queries the scheduled triggers run.
#[async_trait]
pub trait TriggerSource: Send + Sync {
    async fn assessments_due_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Vec<AssessmentDueRow>>;

    async fn weekly_activity(
        &self,
        since: Timestamp,
        until: Timestamp,
    ) -> StoreResult<Vec<WeeklyActivityRow>>;

    async fn live_sessions_starting_between(
        &self,
        from: Timestamp,
        to: Timestamp,
    ) -> StoreResult<Vec<LiveSessionAttendeeRow>>;

    async fn at_risk_students(&self) -> StoreResult<Vec<AtRiskStudentRow>>;
}

// ---------------------------------------------------------------------------
// Bundle
// ---------------------------------------------------------------------------

/// Every store a delivery service may need, behind trait objects.
#[derive(Clone)]
pub struct Stores {
    pub preferences: Arc<dyn PreferenceStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub deferred: Arc<dyn DeferredQueueStore>,
    pub digests: Arc<dyn DigestQueueStore>,
    pub recipients: Arc<dyn RecipientDirectory>,
    pub triggers: Arc<dyn TriggerSource>,
}

impl Stores {
    /// Use one backend for every store.
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: PreferenceStore
            + NotificationStore
            + DeferredQueueStore
            + DigestQueueStore
            + RecipientDirectory
            + TriggerSource
            + 'static,
    {
        Self {
            preferences: store.clone(),
            notifications: store.clone(),
            deferred: store.clone(),
            digests: store.clone(),
            recipients: store.clone(),
            triggers: store,
        }
    }
}
