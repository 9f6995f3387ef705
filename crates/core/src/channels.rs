//! Well-known delivery channel, room and real-time event names.
//!
//! Room names must match what browser clients subscribe to; event names
//! must match the listeners registered by the client socket service.

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Delivery channels
// ---------------------------------------------------------------------------

/// In-app notification pushed over the user's private socket channel and
/// stored for the notification bell UI.
pub const CHANNEL_IN_APP: &str = "in_app";

/// Notification queued for a daily or weekly digest email.
pub const CHANNEL_DIGEST: &str = "digest";

/// Notification delivered immediately by email.
pub const CHANNEL_EMAIL: &str = "email";

// ---------------------------------------------------------------------------
// Rooms
// ---------------------------------------------------------------------------

/// Room joined by every authenticated client browsing the course catalog.
pub const ROOM_COURSES_CATALOG: &str = "courses-catalog";

/// Prefix of the per-user private channel.
const USER_ROOM_PREFIX: &str = "user-";

/// Prefix of the per-course subscriber room.
const COURSE_ROOM_PREFIX: &str = "course-";

/// Private channel of a single user (all of that user's sockets).
pub fn user_room(user_id: DbId) -> String {
    format!("{USER_ROOM_PREFIX}{user_id}")
}

/// Subscriber room of a single course.
pub fn course_room(course_id: DbId) -> String {
    format!("{COURSE_ROOM_PREFIX}{course_id}")
}

/// Whether a client may join `room` on its own request.
///
/// Course rooms and the catalog room are public; user channels are only
/// ever joined by the server on behalf of the authenticated owner.
pub fn is_client_joinable(room: &str) -> bool {
    room == ROOM_COURSES_CATALOG
        || room
            .strip_prefix(COURSE_ROOM_PREFIX)
            .is_some_and(|id| uuid::Uuid::parse_str(id).is_ok())
}

// ---------------------------------------------------------------------------
// Real-time event names
// ---------------------------------------------------------------------------

pub const EVENT_NOTIFICATION_CREATED: &str = "notification-created";
pub const EVENT_COURSE_UPDATED: &str = "course:updated";
pub const EVENT_COURSE_CATALOG_CHANGED: &str = "course:catalog-changed";
pub const EVENT_COURSE_ENROLLMENT_CHANGED: &str = "course:enrollment-changed";
