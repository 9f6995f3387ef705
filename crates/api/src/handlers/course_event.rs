//! Course change events pushed to connected clients.
//!
//! The course service calls these after it commits a change. All endpoints
//! require a sender role and answer 202; delivery happens over the socket.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use coursecast_core::course_event::CatalogAction;
use coursecast_core::error::CoreError;
use coursecast_core::types::DbId;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::RequireSender;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CourseUpdatedBody {
    pub fields: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CatalogChangedBody {
    pub action: CatalogAction,
}

#[derive(Debug, Serialize)]
pub struct JoinedResponse {
    pub connections: usize,
}

/// POST /api/v1/courses/{id}/events/updated
///
/// Debounced: several calls within the window produce one event.
pub async fn course_updated(
    RequireSender(_): RequireSender,
    State(state): State<AppState>,
    Path(course_id): Path<DbId>,
    Json(body): Json<CourseUpdatedBody>,
) -> AppResult<StatusCode> {
    if body.fields.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "fields must not be empty".into(),
        )));
    }
    state.core.broadcaster.emit_course_updated(course_id, body.fields);
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/courses/{id}/events/catalog
pub async fn catalog_changed(
    RequireSender(_): RequireSender,
    State(state): State<AppState>,
    Path(course_id): Path<DbId>,
    Json(body): Json<CatalogChangedBody>,
) -> StatusCode {
    state
        .core
        .broadcaster
        .emit_catalog_changed(body.action, course_id)
        .await;
    StatusCode::ACCEPTED
}

/// POST /api/v1/courses/{id}/events/enrollment
pub async fn enrollment_changed(
    RequireSender(_): RequireSender,
    State(state): State<AppState>,
    Path(course_id): Path<DbId>,
) -> StatusCode {
    state.core.broadcaster.emit_enrollment_changed(course_id).await;
    StatusCode::ACCEPTED
}

/// POST /api/v1/courses/{id}/members/{user_id}
///
/// Subscribe a newly enrolled user's open sockets to the course room.
pub async fn join_course_room(
    RequireSender(_): RequireSender,
    State(state): State<AppState>,
    Path((course_id, user_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<JoinedResponse>>> {
    let connections = state
        .core
        .broadcaster
        .join_room(user_id, course_id)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    Ok(Json(DataResponse::new(JoinedResponse { connections })))
}
