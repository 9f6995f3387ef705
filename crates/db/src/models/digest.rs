//! Row models for `email_digests`.

use sqlx::FromRow;

use coursecast_core::notification::Notification;
use coursecast_core::types::{DbId, Timestamp};

use crate::error::StoreError;
use crate::models::notification::related_entity;
use crate::store::{DueDigestRow, Recipient};

/// A due digest entry joined with its notification and the recipient's
/// contact details.
#[derive(Debug, Clone, FromRow)]
pub struct DueDigestJoinRow {
    pub entry_id: DbId,
    pub email: String,
    pub first_name: String,
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

impl TryFrom<DueDigestJoinRow> for DueDigestRow {
    type Error = StoreError;

    fn try_from(row: DueDigestJoinRow) -> Result<Self, Self::Error> {
        let notification = Notification {
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
        };
        Ok(DueDigestRow {
            entry_id: row.entry_id,
            recipient: Recipient {
                user_id: row.user_id,
                email: row.email,
                first_name: row.first_name,
            },
            notification,
        })
    }
}
