//! Functional tests for account routes: history, settings and the stored key

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, Method, Request, StatusCode},
    Router,
};
use muse_studio::backend::traits::GenerateContentRequest;
use muse_studio::backend::{BackendReply, ImageBackend, TransportError};
use muse_studio::config::{SessionConfig, Settings};
use muse_studio::store::{
    AspectRatio, GenerationStatus, MemoryStore, NewGeneration, StudioStore,
};
use muse_studio::{api, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

const ADA: &str = "session-ada";
const GRACE: &str = "session-grace";

struct UnusedBackend;

#[async_trait]
impl ImageBackend for UnusedBackend {
    fn name(&self) -> &str {
        "unused"
    }

    fn model(&self) -> &str {
        "unused"
    }

    async fn generate_content(
        &self,
        _credential: &str,
        _request: &GenerateContentRequest,
    ) -> Result<BackendReply, TransportError> {
        Err(TransportError("not wired in these tests".to_string()))
    }
}

struct TestApp {
    router: Router,
    store: Arc<dyn StudioStore>,
}

fn session(token: &str, email: &str, name: &str) -> SessionConfig {
    SessionConfig {
        token: token.to_string(),
        email: email.to_string(),
        name: Some(name.to_string()),
    }
}

async fn test_app_with(encryption_key: Option<String>) -> TestApp {
    let mut settings = Settings::default();
    settings.security.encryption_key = encryption_key;
    settings.auth.sessions = vec![
        session(ADA, "ada@example.com", "Ada"),
        session(GRACE, "grace@example.com", "Grace"),
    ];
    let store: Arc<dyn StudioStore> = Arc::new(MemoryStore::new());
    let state = AppState::build(
        settings,
        Arc::new(UnusedBackend),
        store.clone(),
        CancellationToken::new(),
    )
    .await
    .unwrap();
    TestApp {
        router: api::create_router(Arc::new(state)),
        store,
    }
}

async fn test_app() -> TestApp {
    test_app_with(Some("ab".repeat(32))).await
}

impl TestApp {
    async fn user_id(&self, email: &str) -> String {
        self.store
            .find_user_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn seed(&self, email: &str, status: GenerationStatus) -> String {
        let user_id = self.user_id(email).await;
        self.store
            .create_generation(NewGeneration {
                user_id,
                image_count: 2,
                aspect_ratio: AspectRatio::Portrait,
                prompt: Some("studio brief".to_string()),
                result_urls: vec!["data:image/png;base64,QUJD".to_string()],
                failed_slots: Vec::new(),
                status,
                error_message: None,
                processing_time_ms: Some(1200),
                model_used: Some("test-model".to_string()),
            })
            .await
            .unwrap()
            .id
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }
}

#[tokio::test]
async fn test_account_routes_require_a_session() {
    let app = test_app().await;
    for uri in ["/api/generations", "/api/history", "/api/user/settings", "/api/user/api-key"] {
        let (status, body) = app.call(Method::GET, uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body["code"], "unauthorized");
    }
}

#[tokio::test]
async fn test_list_paginates_and_filters() {
    let app = test_app().await;
    for _ in 0..3 {
        app.seed("ada@example.com", GenerationStatus::Completed).await;
    }
    app.seed("ada@example.com", GenerationStatus::Failed).await;
    app.seed("grace@example.com", GenerationStatus::Completed).await;

    let (status, body) = app
        .call(Method::GET, "/api/generations?page=2&limit=3", Some(ADA), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generations"].as_array().unwrap().len(), 1);
    assert_eq!(body["pagination"]["total"], 4);
    assert_eq!(body["pagination"]["pages"], 2);

    let (_, body) = app
        .call(Method::GET, "/api/generations?status=failed", Some(ADA), None)
        .await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["generations"][0]["status"], "failed");
}

#[tokio::test]
async fn test_list_rejects_bad_query() {
    let app = test_app().await;
    for uri in [
        "/api/generations?limit=0",
        "/api/generations?limit=101",
        "/api/generations?page=0",
        "/api/generations?status=exploded",
    ] {
        let (status, body) = app.call(Method::GET, uri, Some(ADA), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid query parameters"));
    }
}

#[tokio::test]
async fn test_records_are_private_to_their_owner() {
    let app = test_app().await;
    let id = app.seed("ada@example.com", GenerationStatus::Completed).await;
    let uri = format!("/api/generations/{}", id);

    let (status, _) = app.call(Method::GET, &uri, Some(GRACE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.call(Method::DELETE, &uri, Some(GRACE), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.call(Method::GET, &uri, Some(ADA), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generation"]["id"], id.as_str());
}

#[tokio::test]
async fn test_favorite_then_filter_then_delete() {
    let app = test_app().await;
    let id = app.seed("ada@example.com", GenerationStatus::Completed).await;
    app.seed("ada@example.com", GenerationStatus::Completed).await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/generations/{}/favorite", id),
            Some(ADA),
            Some(json!({"isFavorite": true})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_favorite"], true);

    let (_, body) = app
        .call(Method::GET, "/api/generations?favorite=true", Some(ADA), None)
        .await;
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["generations"][0]["id"], id.as_str());

    let (status, body) = app
        .call(Method::DELETE, &format!("/api/generations/{}", id), Some(ADA), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Generation deleted successfully");

    let (status, _) = app
        .call(Method::GET, &format!("/api/generations/{}", id), Some(ADA), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_history_lists_and_deletes() {
    let app = test_app().await;
    let first = app.seed("ada@example.com", GenerationStatus::Completed).await;
    let second = app.seed("ada@example.com", GenerationStatus::Failed).await;

    let (status, body) = app.call(Method::GET, "/api/history", Some(ADA), None).await;
    assert_eq!(status, StatusCode::OK);
    let history = body["history"].as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["id"], second.as_str());

    let (status, body) = app.call(Method::DELETE, "/api/history", Some(ADA), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Generation ID is required");

    let (status, _) = app
        .call(Method::DELETE, &format!("/api/history?id={}", first), Some(ADA), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.call(Method::GET, "/api/history", Some(ADA), None).await;
    assert_eq!(body["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_settings_default_then_patch() {
    let app = test_app().await;

    let (status, body) = app.call(Method::GET, "/api/user/settings", Some(ADA), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["display_name"], "Ada");
    assert_eq!(body["settings"]["aspect_ratio"], "portrait");
    assert_eq!(body["settings"]["blur_strength"], 24);
    assert_eq!(body["settings"]["theme"], "dark");
    assert_eq!(body["settings"]["has_api_key"], false);

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/user/settings",
            Some(ADA),
            Some(json!({"theme": "light", "blurStrength": 30})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["settings"]["theme"], "light");
    assert_eq!(body["settings"]["blur_strength"], 30);
    assert_eq!(body["settings"]["aspect_ratio"], "portrait");

    let (status, _) = app
        .call(
            Method::PUT,
            "/api/user/settings",
            Some(ADA),
            Some(json!({"blurStrength": 90})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_key_lifecycle() {
    let app = test_app().await;

    let (_, body) = app.call(Method::GET, "/api/user/api-key", Some(ADA), None).await;
    assert_eq!(body["has_api_key"], false);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/user/api-key",
            Some(ADA),
            Some(json!({"apiKey": "not-a-gemini-key"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid Gemini API key format");

    let (status, _) = app
        .call(
            Method::POST,
            "/api/user/api-key",
            Some(ADA),
            Some(json!({"apiKey": "AIzaSyStoredKey0123456789012345678901234"})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let user_id = app.user_id("ada@example.com").await;
    let stored = app.store.get_user_settings(&user_id).await.unwrap().unwrap();
    let sealed = stored.api_key.unwrap();
    assert!(!sealed.encrypted.contains("AIzaSy"));

    let (_, body) = app.call(Method::GET, "/api/user/api-key", Some(ADA), None).await;
    assert_eq!(body["has_api_key"], true);
    let (_, body) = app.call(Method::GET, "/api/user/api-key", Some(GRACE), None).await;
    assert_eq!(body["has_api_key"], false);

    let (status, _) = app.call(Method::DELETE, "/api/user/api-key", Some(ADA), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.call(Method::GET, "/api/user/api-key", Some(ADA), None).await;
    assert_eq!(body["has_api_key"], false);
}

#[tokio::test]
async fn test_key_storage_needs_an_encryption_key() {
    let app = test_app_with(None).await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/user/api-key",
            Some(ADA),
            Some(json!({"apiKey": "AIzaSyStoredKey0123456789012345678901234"})),
        )
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "configuration_error");
}
