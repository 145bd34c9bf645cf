//! Functional tests for session authentication

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Request, StatusCode},
    Extension, Router,
};
use muse_studio::middleware::{AuthLayer, AuthenticatedUser};
use std::{collections::HashMap, sync::Arc};
use tower::ServiceExt;

fn sessions() -> Arc<HashMap<String, AuthenticatedUser>> {
    let mut sessions = HashMap::new();
    sessions.insert(
        "session-token-1".to_string(),
        AuthenticatedUser {
            user_id: "user-1".to_string(),
            email: "ada@example.com".to_string(),
            name: Some("Ada".to_string()),
        },
    );
    Arc::new(sessions)
}

async fn whoami(user: Option<Extension<AuthenticatedUser>>) -> String {
    user.map(|Extension(u)| u.user_id)
        .unwrap_or_else(|| "anonymous".to_string())
}

fn required_app() -> Router {
    Router::new()
        .route("/test", axum::routing::get(whoami))
        .layer(AuthLayer::required(sessions()))
}

fn optional_app() -> Router {
    Router::new()
        .route("/test", axum::routing::get(whoami))
        .layer(AuthLayer::optional(sessions()))
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_auth_with_valid_bearer_token() {
    let response = required_app()
        .oneshot(
            Request::builder()
                .uri("/test")
                .header(AUTHORIZATION, "Bearer session-token-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "user-1");
}

#[tokio::test]
async fn test_auth_with_raw_token() {
    let response = required_app()
        .oneshot(
            Request::builder()
                .uri("/test")
                .header(AUTHORIZATION, "session-token-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_auth_with_unknown_token() {
    let response = required_app()
        .oneshot(
            Request::builder()
                .uri("/test")
                .header(AUTHORIZATION, "Bearer forged")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Unauthorized");
    assert_eq!(body["code"], "unauthorized");
}

#[tokio::test]
async fn test_auth_without_token() {
    let response = required_app()
        .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_optional_auth_lets_anonymous_through() {
    let response = optional_app()
        .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "anonymous");
}

#[tokio::test]
async fn test_optional_auth_attaches_known_user() {
    let response = optional_app()
        .oneshot(
            Request::builder()
                .uri("/test")
                .header(AUTHORIZATION, "Bearer session-token-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(body_string(response).await, "user-1");
}

#[tokio::test]
async fn test_optional_auth_ignores_unknown_token() {
    let response = optional_app()
        .oneshot(
            Request::builder()
                .uri("/test")
                .header(AUTHORIZATION, "Bearer stale")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "anonymous");
}
