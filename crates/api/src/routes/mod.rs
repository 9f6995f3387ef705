pub mod admin;
pub mod course_event;
pub mod health;
pub mod notification;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` REST route tree. The socket endpoint is mounted by
/// [`crate::router::build_app_router`].
///
/// ```text
/// /notifications                              inbox and preferences
/// /courses                                    course change events
/// /admin/notifications                        trigger runs, digest stats
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/notifications", notification::router())
        .nest("/courses", course_event::router())
        .nest("/admin/notifications", admin::router())
}
