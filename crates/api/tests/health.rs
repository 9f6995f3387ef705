//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use common::{body_json, build_test_app, get};
use tower::ServiceExt;

use coursecast_events::testing::Harness;

// ---------------------------------------------------------------------------
// Test: GET /health returns 200 with expected JSON fields
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_check_returns_ok_with_json() {
    let h = Harness::new();
    let response = get(&build_test_app(&h), "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["db_healthy"], true);
    assert_eq!(json["ws_connections"], 0);
}

// ---------------------------------------------------------------------------
// Test: Unknown route returns 404
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unknown_route_returns_404() {
    let h = Harness::new();
    let response = get(&build_test_app(&h), "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Test: x-request-id header is present in response
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_contains_x_request_id_header() {
    let h = Harness::new();
    let response = get(&build_test_app(&h), "/health").await;

    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("Response must contain an x-request-id header");
    assert_eq!(request_id.to_str().unwrap().len(), 36);
}

// ---------------------------------------------------------------------------
// Test: socket upgrade without a token is rejected before upgrading
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ws_without_token_is_rejected() {
    let h = Harness::new();
    let response = get(&build_test_app(&h), "/api/v1/ws").await;

    // A plain GET lacks upgrade headers, so axum rejects it either way; it
    // must never succeed.
    assert!(response.status().is_client_error());
}

// ---------------------------------------------------------------------------
// Test: CORS allows the configured origin and exposes the request id
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cors_allows_configured_origin_and_exposes_request_id() {
    let h = Harness::new();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header(header::ORIGIN, common::TEST_ORIGIN)
        .body(Body::empty())
        .unwrap();

    let response = build_test_app(&h).oneshot(request).await.unwrap();

    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        common::TEST_ORIGIN
    );
    let exposed = headers
        .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
        .expect("request id must be exposed")
        .to_str()
        .unwrap();
    assert!(exposed.contains("x-request-id"));
}

#[tokio::test]
async fn cors_ignores_unknown_origin() {
    let h = Harness::new();
    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .header(header::ORIGIN, "https://evil.example.com")
        .body(Body::empty())
        .unwrap();

    let response = build_test_app(&h).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
