//! Notification domain types: taxonomy, requests, stored notifications and
//! the list filter used by the inbox.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::types::{new_id, DbId, Timestamp};

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Closed set of notification types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    Progress,
    Risk,
    Achievement,
    Intervention,
    Assignment,
    Course,
}

/// Preference category a notification type is governed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationCategory {
    ProgressUpdates,
    RiskAlerts,
    AchievementNotifications,
    CourseUpdates,
    AssignmentReminders,
}

impl NotificationType {
    pub const ALL: [NotificationType; 6] = [
        NotificationType::Progress,
        NotificationType::Risk,
        NotificationType::Achievement,
        NotificationType::Intervention,
        NotificationType::Assignment,
        NotificationType::Course,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Progress => "progress",
            NotificationType::Risk => "risk",
            NotificationType::Achievement => "achievement",
            NotificationType::Intervention => "intervention",
            NotificationType::Assignment => "assignment",
            NotificationType::Course => "course",
        }
    }

    /// Risk and intervention notifications share the risk-alert toggle.
    pub fn category(&self) -> NotificationCategory {
        match self {
            NotificationType::Progress => NotificationCategory::ProgressUpdates,
            NotificationType::Risk | NotificationType::Intervention => {
                NotificationCategory::RiskAlerts
            }
            NotificationType::Achievement => NotificationCategory::AchievementNotifications,
            NotificationType::Course => NotificationCategory::CourseUpdates,
            NotificationType::Assignment => NotificationCategory::AssignmentReminders,
        }
    }

    /// Heading used for this type in digest emails.
    pub fn digest_label(&self) -> &'static str {
        match self {
            NotificationType::Progress => "Progress Updates",
            NotificationType::Risk => "Risk Alerts",
            NotificationType::Achievement => "Achievements",
            NotificationType::Intervention => "Instructor Messages",
            NotificationType::Assignment => "Assignment Reminders",
            NotificationType::Course => "Course Updates",
        }
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NotificationType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown notification type '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// High and urgent notifications get a badge in digests.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Priority::High | Priority::Urgent)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(CoreError::Validation(format!("Unknown priority '{other}'"))),
        }
    }
}

/// Kind of domain entity a notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelatedEntityType {
    Course,
    Lesson,
    Assessment,
    Student,
    LiveSession,
}

impl RelatedEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelatedEntityType::Course => "course",
            RelatedEntityType::Lesson => "lesson",
            RelatedEntityType::Assessment => "assessment",
            RelatedEntityType::Student => "student",
            RelatedEntityType::LiveSession => "live-session",
        }
    }
}

impl fmt::Display for RelatedEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelatedEntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(RelatedEntityType::Course),
            "lesson" => Ok(RelatedEntityType::Lesson),
            "assessment" => Ok(RelatedEntityType::Assessment),
            "student" => Ok(RelatedEntityType::Student),
            "live-session" => Ok(RelatedEntityType::LiveSession),
            other => Err(CoreError::Validation(format!(
                "Unknown related entity type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedEntity {
    #[serde(rename = "type")]
    pub entity_type: RelatedEntityType,
    pub id: DbId,
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Everything needed to create a notification. Also the verbatim shape of a
/// deferred queue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRequest {
    pub user_id: DbId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub priority: Priority,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1))]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub action_url: Option<String>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub action_text: Option<String>,
    #[serde(default)]
    pub related_entity: Option<RelatedEntity>,
    #[serde(default)]
    pub expires_at: Option<Timestamp>,
}

impl NotificationRequest {
    pub fn new(
        user_id: DbId,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            priority: Priority::Normal,
            title: title.into(),
            message: message.into(),
            data: None,
            action_url: None,
            action_text: None,
            related_entity: None,
            expires_at: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_action(mut self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self.action_text = Some(text.into());
        self
    }

    pub fn with_related(mut self, entity_type: RelatedEntityType, id: DbId) -> Self {
        self.related_entity = Some(RelatedEntity { entity_type, id });
        self
    }

    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Field validation plus the expiry invariant: `expires_at`, when set,
    /// must be strictly after the creation instant `now`.
    pub fn validate_at(&self, now: Timestamp) -> Result<(), CoreError> {
        self.validate()?;
        if let Some(expires_at) = self.expires_at {
            if expires_at <= now {
                return Err(CoreError::Validation(
                    "expiresAt must be after the creation time".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

// ---------------------------------------------------------------------------
// Stored notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: DbId,
    pub user_id: DbId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
    pub related_entity: Option<RelatedEntity>,
    pub is_read: bool,
    pub read_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub expires_at: Option<Timestamp>,
}

impl Notification {
    /// Materialize a request into an unread notification created at `now`.
    pub fn from_request(request: NotificationRequest, now: Timestamp) -> Self {
        Self {
            id: new_id(),
            user_id: request.user_id,
            notification_type: request.notification_type,
            priority: request.priority,
            title: request.title,
            message: request.message,
            data: request.data,
            action_url: request.action_url,
            action_text: request.action_text,
            related_entity: request.related_entity,
            is_read: false,
            read_at: None,
            created_at: now,
            expires_at: request.expires_at,
        }
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|e| e <= now)
    }
}

/// Body of the `notification-created` event on the user's private channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationCreatedPayload {
    pub id: DbId,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: String,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub action_url: Option<String>,
    pub action_text: Option<String>,
}

impl From<&Notification> for NotificationCreatedPayload {
    fn from(n: &Notification) -> Self {
        Self {
            id: n.id,
            notification_type: n.notification_type,
            priority: n.priority,
            title: n.title.clone(),
            message: n.message.clone(),
            data: n.data.clone(),
            action_url: n.action_url.clone(),
            action_text: n.action_text.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Default page size for notification lists.
pub const DEFAULT_LIST_LIMIT: i64 = 50;

/// Maximum page size for notification lists.
pub const MAX_LIST_LIMIT: i64 = 100;

/// Filters for listing a user's notifications. Expired rows are always
/// excluded.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFilter {
    pub include_read: bool,
    pub notification_type: Option<NotificationType>,
    pub priority: Option<Priority>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self {
            include_read: true,
            notification_type: None,
            priority: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }
}

impl NotificationFilter {
    /// Clamp `limit` into `1..=MAX_LIST_LIMIT` and `offset` to non-negative.
    pub fn normalized(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_LIST_LIMIT);
        self.offset = self.offset.max(0);
        self
    }

    pub fn matches(&self, n: &Notification) -> bool {
        (self.include_read || !n.is_read)
            && self.notification_type.is_none_or(|t| t == n.notification_type)
            && self.priority.is_none_or(|p| p == n.priority)
    }
}

/// Dedupe query used by scheduled triggers: "has this user already been
/// told about this entity recently?"
#[derive(Debug, Clone, PartialEq)]
pub struct DedupeQuery {
    pub user_id: DbId,
    pub notification_type: Option<NotificationType>,
    pub related_entity: RelatedEntity,
    /// Case-sensitive substring the message must contain.
    pub message_contains: Option<String>,
    pub created_since: Timestamp,
}

impl DedupeQuery {
    /// Whether a request created at `created_at` satisfies the query.
    pub fn matches(&self, request: &NotificationRequest, created_at: Timestamp) -> bool {
        request.user_id == self.user_id
            && created_at >= self.created_since
            && request.related_entity == Some(self.related_entity)
            && self
                .notification_type
                .is_none_or(|t| t == request.notification_type)
            && self
                .message_contains
                .as_deref()
                .is_none_or(|needle| request.message.contains(needle))
    }

    pub fn matches_notification(&self, n: &Notification) -> bool {
        n.user_id == self.user_id
            && n.created_at >= self.created_since
            && n.related_entity == Some(self.related_entity)
            && self.notification_type.is_none_or(|t| t == n.notification_type)
            && self
                .message_contains
                .as_deref()
                .is_none_or(|needle| n.message.contains(needle))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
