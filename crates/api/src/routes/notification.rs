//! Route definitions for the `/notifications` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::notification;
use crate::state::AppState;

/// Routes mounted at `/notifications`.
///
/// ```text
/// GET    /                -> list_notifications
/// POST   /                -> create_notification (instructor, admin)
/// POST   /read-all        -> mark_all_read
/// GET    /unread-count    -> unread_count
/// GET    /queued-count    -> queued_count
/// GET    /preferences     -> get_preferences
/// PUT    /preferences     -> update_preferences
/// GET    /{id}            -> get_notification
/// DELETE /{id}            -> delete_notification
/// POST   /{id}/read       -> mark_read
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(notification::list_notifications).post(notification::create_notification),
        )
        .route("/read-all", post(notification::mark_all_read))
        .route("/unread-count", get(notification::unread_count))
        .route("/queued-count", get(notification::queued_count))
        .route(
            "/preferences",
            get(notification::get_preferences).put(notification::update_preferences),
        )
        .route(
            "/{id}",
            get(notification::get_notification).delete(notification::delete_notification),
        )
        .route("/{id}/read", post(notification::mark_read))
}
