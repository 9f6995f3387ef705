use axum::routing::post;
use axum::Router;

use crate::handlers::course_event;
use crate::state::AppState;

/// Routes mounted at `/courses`.
///
/// ```text
/// POST /{id}/events/updated         -> course_updated
/// POST /{id}/events/catalog         -> catalog_changed
/// POST /{id}/events/enrollment      -> enrollment_changed
/// POST /{id}/members/{user_id}      -> join_course_room
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/events/updated", post(course_event::course_updated))
        .route("/{id}/events/catalog", post(course_event::catalog_changed))
        .route("/{id}/events/enrollment", post(course_event::enrollment_changed))
        .route("/{id}/members/{user_id}", post(course_event::join_course_room))
}
