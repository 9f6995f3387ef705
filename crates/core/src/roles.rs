//! Role names carried in access tokens.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_INSTRUCTOR: &str = "instructor";
pub const ROLE_STUDENT: &str = "student";

/// Roles allowed to create notifications for other users.
pub fn can_send_notifications(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_INSTRUCTOR
}
