//! Room-based real-time transport seam.
//!
//! The WebSocket layer implements [`RealtimeTransport`]; the dispatcher and
//! broadcaster only ever see this trait.

use async_trait::async_trait;
use serde::Serialize;

use coursecast_core::channels::{
    EVENT_COURSE_CATALOG_CHANGED, EVENT_COURSE_ENROLLMENT_CHANGED, EVENT_COURSE_UPDATED,
    EVENT_NOTIFICATION_CREATED,
};
use coursecast_core::course_event::{
    CourseCatalogChangedPayload, CourseEnrollmentChangedPayload, CourseUpdatedPayload,
};
use coursecast_core::notification::{Notification, NotificationCreatedPayload};
use coursecast_core::types::DbId;

use super::DeliveryError;

/// A named event with a JSON payload, as pushed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeEvent {
    pub event: &'static str,
    pub data: serde_json::Value,
}

impl RealtimeEvent {
    fn new(event: &'static str, payload: impl Serialize) -> Result<Self, DeliveryError> {
        let data =
            serde_json::to_value(payload).map_err(|e| DeliveryError::Realtime(e.to_string()))?;
        Ok(Self { event, data })
    }

    pub fn notification_created(notification: &Notification) -> Result<Self, DeliveryError> {
        Self::new(
            EVENT_NOTIFICATION_CREATED,
            NotificationCreatedPayload::from(notification),
        )
    }

    pub fn course_updated(payload: &CourseUpdatedPayload) -> Result<Self, DeliveryError> {
        Self::new(EVENT_COURSE_UPDATED, payload)
    }

    pub fn catalog_changed(payload: &CourseCatalogChangedPayload) -> Result<Self, DeliveryError> {
        Self::new(EVENT_COURSE_CATALOG_CHANGED, payload)
    }

    pub fn enrollment_changed(
        payload: &CourseEnrollmentChangedPayload,
    ) -> Result<Self, DeliveryError> {
        Self::new(EVENT_COURSE_ENROLLMENT_CHANGED, payload)
    }
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Push `event` to every connection joined to any of `rooms`. A
    /// connection in several of the rooms receives it once. Returns the
    /// number of connections reached.
    async fn emit(&self, rooms: &[String], event: &RealtimeEvent) -> Result<usize, DeliveryError>;

    /// Join every live connection of `user_id` to `room`. Returns the number
    /// of connections joined.
    async fn join_user_to_room(&self, user_id: DbId, room: &str) -> Result<usize, DeliveryError>;
}
