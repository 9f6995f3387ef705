//! Row models for `notifications` and `deferred_notifications`.

use sqlx::FromRow;

use coursecast_core::notification::{Notification, NotificationRequest, RelatedEntity};
use coursecast_core::types::{DbId, Timestamp};

use crate::error::StoreError;
use crate::store::DeferredEntry;

/// A row from the `notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRow {
    pub id: DbId,
    pub user_id: DbId,
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<DbId>,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

/// A row from the `deferred_notifications` table.
#[derive(Debug, Clone, FromRow)]
pub struct DeferredNotificationRow {
    pub id: DbId,
    pub user_id: DbId,
    #[sqlx(rename = "type")]
    pub notification_type: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub related_entity_type: Option<String>,
    pub related_entity_id: Option<DbId>,
    pub expires_at: Option<Timestamp>,
    pub status: String,
    pub queued_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

pub(crate) fn related_entity(
    entity_type: Option<&str>,
    id: Option<DbId>,
) -> Result<Option<RelatedEntity>, StoreError> {
    match (entity_type, id) {
        (Some(t), Some(id)) => Ok(Some(RelatedEntity {
            entity_type: t.parse()?,
            id,
        })),
        (None, None) => Ok(None),
        _ => Err(StoreError::Corrupt(
            "related entity type and id must be set together".to_string(),
        )),
    }
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            related_entity: related_entity(row.related_entity_type.as_deref(), row.related_entity_id)?,
            id: row.id,
            user_id: row.user_id,
            notification_type: row.notification_type.parse()?,
            priority: row.priority.parse()?,
            title: row.title,
            message: row.message,
            data: row.data,
            action_url: row.action_url,
            action_text: row.action_text,
            is_read: row.is_read,
            read_at: row.read_at,
            created_at: row.created_at,
            expires_at: row.expires_at,
        })
    }
}

impl TryFrom<DeferredNotificationRow> for DeferredEntry {
    type Error = StoreError;

    fn try_from(row: DeferredNotificationRow) -> Result<Self, Self::Error> {
        let request = NotificationRequest {
            related_entity: related_entity(row.related_entity_type.as_deref(), row.related_entity_id)?,
            user_id: row.user_id,
            notification_type: row.notification_type.parse()?,
            priority: row.priority.parse()?,
            title: row.title,
            message: row.message,
            data: row.data,
            action_url: row.action_url,
            action_text: row.action_text,
            expires_at: row.expires_at,
        };
        Ok(DeferredEntry {
            id: row.id,
            request,
            status: row.status.parse()?,
            queued_at: row.queued_at,
            resolved_at: row.resolved_at,
        })
    }
}
