//! Functional tests for the Gemini HTTP backend against a mock upstream

use muse_studio::backend::traits::{
    Content, GenerateContentRequest, GenerationConfig, Part,
};
use muse_studio::backend::{BackendReply, GeminiBackend, ImageBackend};
use muse_studio::config::{GeminiConfig, Settings};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ENDPOINT: &str = "/v1beta/models/test-model:generateContent";

fn config_for(base_url: String) -> GeminiConfig {
    let mut config = Settings::default().gemini;
    config.base_url = base_url;
    config.model = "test-model".to_string();
    config.timeout_ms = 5_000;
    config
}

fn sample_request() -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part::text("studio portrait"),
                Part::inline("image/png", "iVBORw0KGgo="),
            ],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["IMAGE".to_string()],
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
        },
    }
}

async fn backend(server: &MockServer) -> GeminiBackend {
    GeminiBackend::new(&config_for(format!("{}/v1beta/models", server.uri()))).unwrap()
}

#[tokio::test]
async fn test_sends_credential_header_and_parses_image() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "AIzaSy-test-credential"))
        .and(body_partial_json(json!({
            "generationConfig": { "responseModalities": ["IMAGE"], "topK": 40 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "finishReason": "STOP",
                "content": { "parts": [
                    { "inlineData": { "mimeType": "image/png", "data": "QUJD" } }
                ]}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reply = backend(&server)
        .await
        .generate_content("AIzaSy-test-credential", &sample_request())
        .await
        .unwrap();

    match reply {
        BackendReply::Completed(response) => {
            let image = response.candidates[0].image().unwrap();
            assert_eq!(image.data, "QUJD");
            assert_eq!(image.mime_type.as_deref(), Some("image/png"));
        }
        other => panic!("expected a completed reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_becomes_rejection_with_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": { "code": 403, "message": "API key not valid" }
        })))
        .mount(&server)
        .await;

    let reply = backend(&server)
        .await
        .generate_content("bad", &sample_request())
        .await
        .unwrap();

    match reply {
        BackendReply::Rejected { status, error } => {
            assert_eq!(status, 403);
            assert_eq!(
                error.and_then(|e| e.describe()).as_deref(),
                Some("API key not valid")
            );
        }
        other => panic!("expected a rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_error_status_without_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let reply = backend(&server)
        .await
        .generate_content("key", &sample_request())
        .await
        .unwrap();

    assert!(matches!(
        reply,
        BackendReply::Rejected {
            status: 503,
            error: None
        }
    ));
}

#[tokio::test]
async fn test_unparseable_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy page</html>"))
        .mount(&server)
        .await;

    let reply = backend(&server)
        .await
        .generate_content("key", &sample_request())
        .await
        .unwrap();

    match reply {
        BackendReply::Malformed(reason) => assert!(reason.starts_with("Failed to parse response")),
        other => panic!("expected a malformed reply, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_upstream_is_transport_error() {
    let backend = GeminiBackend::new(&config_for("http://127.0.0.1:1/v1beta/models".to_string()))
        .unwrap();

    let result = backend.generate_content("key", &sample_request()).await;

    assert!(result.is_err());
}
