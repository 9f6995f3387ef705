//! HTTP-level integration tests for the `/notifications` resource.
//!
//! The router runs over the in-memory harness, so these tests need no
//! database.

mod common;

use axum::http::StatusCode;
use common::{
    body_json, build_test_app, delete_auth, get, get_auth, post_auth, post_json_auth,
    put_json_auth, token_for,
};
use serde_json::json;

use coursecast_core::channels::{user_room, EVENT_NOTIFICATION_CREATED};
use coursecast_core::roles::{ROLE_INSTRUCTOR, ROLE_STUDENT};
use coursecast_core::types::DbId;
use coursecast_events::testing::Harness;

fn course_notice(user_id: DbId, title: &str) -> serde_json::Value {
    json!({
        "userId": user_id,
        "type": "course",
        "title": title,
        "message": "New lesson published"
    })
}

/// Create a notification as an instructor and return the response body.
async fn create_as_instructor(
    app: &axum::Router,
    body: serde_json::Value,
) -> serde_json::Value {
    let instructor = token_for(uuid::Uuid::now_v7(), ROLE_INSTRUCTOR);
    let response = post_json_auth(app, "/api/v1/notifications", body, &instructor).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Test: endpoints require a bearer token
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_without_token_returns_401() {
    let h = Harness::new();
    let app = build_test_app(&h);

    let response = get(&app, "/api/v1/notifications").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn invalid_token_returns_401() {
    let h = Harness::new();
    let app = build_test_app(&h);

    let response = get_auth(&app, "/api/v1/notifications", "not-a-jwt").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

// ---------------------------------------------------------------------------
// Test: only instructors and admins may create notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn student_cannot_create_notifications() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);

    let response = post_json_auth(
        &app,
        "/api/v1/notifications",
        course_notice(user, "Hello"),
        &token_for(user, ROLE_STUDENT),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(h.store.notifications().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a created notification is listed and pushed to the user channel
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_notification_is_listed_and_pushed() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);

    let created = create_as_instructor(&app, course_notice(user, "Module 3 is live")).await;
    assert_eq!(created["data"]["status"], "created");
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = get_auth(&app, "/api/v1/notifications", &token_for(user, ROLE_STUDENT)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    let items = json["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], id.as_str());
    assert_eq!(items[0]["type"], "course");
    assert_eq!(items[0]["isRead"], false);

    let pushed = h.transport.emitted_named(EVENT_NOTIFICATION_CREATED);
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0].rooms, vec![user_room(user)]);
}

#[tokio::test]
async fn invalid_request_returns_400() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    let instructor = token_for(uuid::Uuid::now_v7(), ROLE_INSTRUCTOR);

    let response = post_json_auth(
        &app,
        "/api/v1/notifications",
        course_notice(user, ""),
        &instructor,
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// ---------------------------------------------------------------------------
// Test: read state and deletion are scoped to the owner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn other_users_get_404() {
    let h = Harness::new();
    let owner = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    let created = create_as_instructor(&app, course_notice(owner, "Mine")).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let intruder = token_for(uuid::Uuid::now_v7(), ROLE_STUDENT);

    let get_one = get_auth(&app, &format!("/api/v1/notifications/{id}"), &intruder).await;
    assert_eq!(get_one.status(), StatusCode::NOT_FOUND);

    let read = post_auth(&app, &format!("/api/v1/notifications/{id}/read"), &intruder).await;
    assert_eq!(read.status(), StatusCode::NOT_FOUND);

    let delete = delete_auth(&app, &format!("/api/v1/notifications/{id}"), &intruder).await;
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);

    assert_eq!(h.store.notifications().len(), 1);
    assert!(!h.store.notifications()[0].is_read);
}

#[tokio::test]
async fn mark_read_updates_unread_count() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    let token = token_for(user, ROLE_STUDENT);

    let created = create_as_instructor(&app, course_notice(user, "One")).await;
    create_as_instructor(&app, course_notice(user, "Two")).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let json = body_json(get_auth(&app, "/api/v1/notifications/unread-count", &token).await).await;
    assert_eq!(json["data"]["count"], 2);

    let read = post_auth(&app, &format!("/api/v1/notifications/{id}/read"), &token).await;
    assert_eq!(read.status(), StatusCode::NO_CONTENT);

    let json = body_json(get_auth(&app, "/api/v1/notifications/unread-count", &token).await).await;
    assert_eq!(json["data"]["count"], 1);

    let json = body_json(
        get_auth(&app, "/api/v1/notifications?includeRead=false", &token).await,
    )
    .await;
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["data"][0]["title"], "Two");
}

#[tokio::test]
async fn read_all_reports_marked_count() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    let token = token_for(user, ROLE_STUDENT);
    for title in ["a", "b", "c"] {
        create_as_instructor(&app, course_notice(user, title)).await;
    }

    let response = post_auth(&app, "/api/v1/notifications/read-all", &token).await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["markedRead"], 3);
}

#[tokio::test]
async fn delete_removes_the_notification() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    let token = token_for(user, ROLE_STUDENT);
    let created = create_as_instructor(&app, course_notice(user, "Bye")).await;
    let id = created["data"]["id"].as_str().unwrap().to_string();

    let response = delete_auth(&app, &format!("/api/v1/notifications/{id}"), &token).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let again = delete_auth(&app, &format!("/api/v1/notifications/{id}"), &token).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_filters_by_type() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    create_as_instructor(&app, course_notice(user, "Course news")).await;
    create_as_instructor(
        &app,
        json!({
            "userId": user,
            "type": "achievement",
            "title": "Badge earned",
            "message": "First lesson done"
        }),
    )
    .await;

    let json = body_json(
        get_auth(
            &app,
            "/api/v1/notifications?type=achievement",
            &token_for(user, ROLE_STUDENT),
        )
        .await,
    )
    .await;

    let items = json["data"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["title"], "Badge earned");
}

// ---------------------------------------------------------------------------
// Test: preferences drive suppression and deferral
// ---------------------------------------------------------------------------

#[tokio::test]
async fn preferences_default_on_first_read() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);

    let response = get_auth(
        &app,
        "/api/v1/notifications/preferences",
        &token_for(user, ROLE_STUDENT),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["enableRiskAlerts"], true);
    assert_eq!(json["data"]["emailDigestFrequency"], "daily");
    assert!(json["data"]["quietHoursStart"].is_null());
}

#[tokio::test]
async fn disabled_category_is_suppressed() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);

    let update = put_json_auth(
        &app,
        "/api/v1/notifications/preferences",
        json!({ "enableRiskAlerts": false }),
        &token_for(user, ROLE_STUDENT),
    )
    .await;
    assert_eq!(update.status(), StatusCode::OK);

    let created = create_as_instructor(
        &app,
        json!({
            "userId": user,
            "type": "intervention",
            "title": "Check in",
            "message": "Your instructor wants to talk"
        }),
    )
    .await;

    assert_eq!(created["data"]["status"], "suppressed");
    assert!(created["data"]["id"].is_null());
    assert!(h.store.notifications().is_empty());
}

#[tokio::test]
async fn quiet_hours_defer_and_count_as_queued() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);
    let token = token_for(user, ROLE_STUDENT);

    // The harness clock reads 10:00 UTC.
    put_json_auth(
        &app,
        "/api/v1/notifications/preferences",
        json!({ "quietHoursStart": "09:00", "quietHoursEnd": "11:00" }),
        &token,
    )
    .await;

    let created = create_as_instructor(&app, course_notice(user, "Later")).await;
    assert_eq!(created["data"]["status"], "deferred");

    let json = body_json(get_auth(&app, "/api/v1/notifications/queued-count", &token).await).await;
    assert_eq!(json["data"]["count"], 1);

    let json = body_json(get_auth(&app, "/api/v1/notifications", &token).await).await;
    assert!(json["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn half_set_quiet_hours_return_400() {
    let h = Harness::new();
    let user = h.add_user("ada@example.com", "Ada");
    let app = build_test_app(&h);

    let response = put_json_auth(
        &app,
        "/api/v1/notifications/preferences",
        json!({ "quietHoursStart": "22:00" }),
        &token_for(user, ROLE_STUDENT),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "VALIDATION_ERROR");
}
