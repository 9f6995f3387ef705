//! Handlers for the `/notifications` resource.
//!
//! Every endpoint acts on the authenticated user's own notifications except
//! `create`, which requires a sender role.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use coursecast_core::error::CoreError;
use coursecast_core::notification::{
    Notification, NotificationFilter, NotificationRequest, NotificationType, Priority,
    DEFAULT_LIST_LIMIT,
};
use coursecast_core::preferences::{NotificationPreferences, PreferencesPatch};
use coursecast_core::types::DbId;
use coursecast_events::DispatchOutcome;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireSender;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query / response types
// ---------------------------------------------------------------------------

/// Query parameters for `GET /notifications`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationQuery {
    /// Defaults to `true`.
    pub include_read: Option<bool>,
    #[serde(rename = "type")]
    pub notification_type: Option<NotificationType>,
    pub priority: Option<Priority>,
    /// Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl From<NotificationQuery> for NotificationFilter {
    fn from(q: NotificationQuery) -> Self {
        NotificationFilter {
            include_read: q.include_read.unwrap_or(true),
            notification_type: q.notification_type,
            priority: q.priority,
            limit: q.limit.unwrap_or(DEFAULT_LIST_LIMIT),
            offset: q.offset.unwrap_or(0),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkAllReadResponse {
    pub marked_read: u64,
}

/// What `POST /notifications` did with the request.
#[derive(Debug, Serialize)]
pub struct CreateResponse {
    /// `created`, `deferred` or `suppressed`.
    pub status: &'static str,
    /// Empty when suppressed.
    pub id: Option<DbId>,
}

impl From<DispatchOutcome> for CreateResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        let status = match outcome {
            DispatchOutcome::Created(_) => "created",
            DispatchOutcome::Deferred(_) => "deferred",
            DispatchOutcome::Suppressed => "suppressed",
        };
        Self {
            status,
            id: outcome.id(),
        }
    }
}

fn not_found(id: DbId) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Notification",
        id,
    })
}

// ---------------------------------------------------------------------------
// Notification endpoints
// ---------------------------------------------------------------------------

/// GET /api/v1/notifications
pub async fn list_notifications(
    auth: AuthUser,
    State(state): State<AppState>,
    Query(params): Query<NotificationQuery>,
) -> AppResult<Json<DataResponse<Vec<Notification>>>> {
    let notifications = state.core.inbox.list(auth.user_id, params.into()).await?;
    Ok(Json(DataResponse::new(notifications)))
}

/// GET /api/v1/notifications/{id}
pub async fn get_notification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<Notification>>> {
    let notification = state
        .core
        .inbox
        .get(id, auth.user_id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(DataResponse::new(notification)))
}

/// POST /api/v1/notifications
///
/// Create a notification for any user. Returns 201 with the outcome; a
/// suppressed request still answers 201 with `id: null`.
pub async fn create_notification(
    RequireSender(sender): RequireSender,
    State(state): State<AppState>,
    Json(request): Json<NotificationRequest>,
) -> AppResult<impl IntoResponse> {
    let recipient = request.user_id;
    let outcome = state.core.dispatcher.create(request).await?;
    tracing::debug!(
        sender_id = %sender.user_id,
        user_id = %recipient,
        outcome = ?outcome,
        "Notification requested over HTTP"
    );
    Ok((
        StatusCode::CREATED,
        Json(DataResponse::new(CreateResponse::from(outcome))),
    ))
}

/// POST /api/v1/notifications/{id}/read
///
/// 204 on success, 404 if the notification is not the user's.
pub async fn mark_read(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !state.core.inbox.mark_read(id, auth.user_id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_read(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<MarkAllReadResponse>>> {
    let marked_read = state.core.inbox.mark_all_read(auth.user_id).await?;
    Ok(Json(DataResponse::new(MarkAllReadResponse { marked_read })))
}

/// DELETE /api/v1/notifications/{id}
pub async fn delete_notification(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    if !state.core.inbox.delete(id, auth.user_id).await? {
        return Err(not_found(id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/notifications/unread-count
pub async fn unread_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CountResponse>>> {
    let count = state.core.inbox.unread_count(auth.user_id).await?;
    Ok(Json(DataResponse::new(CountResponse { count })))
}

/// GET /api/v1/notifications/queued-count
///
/// Notifications held back by quiet hours.
pub async fn queued_count(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<CountResponse>>> {
    let count = state.core.inbox.queued_count(auth.user_id).await?;
    Ok(Json(DataResponse::new(CountResponse { count })))
}

// ---------------------------------------------------------------------------
// Preferences
// ---------------------------------------------------------------------------

/// GET /api/v1/notifications/preferences
pub async fn get_preferences(
    auth: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<NotificationPreferences>>> {
    let prefs = state.core.preferences.get(auth.user_id).await?;
    Ok(Json(DataResponse::new(prefs)))
}

/// PUT /api/v1/notifications/preferences
///
/// Partial update; absent fields keep their value and `null` clears a
/// quiet-hours bound.
pub async fn update_preferences(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(patch): Json<PreferencesPatch>,
) -> AppResult<Json<DataResponse<NotificationPreferences>>> {
    let prefs = state.core.preferences.update(auth.user_id, &patch).await?;
    Ok(Json(DataResponse::new(prefs)))
}
