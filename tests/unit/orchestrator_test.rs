//! Unit tests for the photoshoot orchestrator

use async_trait::async_trait;
use muse_studio::backend::traits::{GenerateContentRequest, GenerateContentResponse};
use muse_studio::backend::{BackendReply, ImageBackend, TransportError};
use muse_studio::gateway::{
    FailureKind, GenerationRequest, Orchestrator, RetryPolicy, Sampling,
};
use muse_studio::prompt::catalog::CAMERA_VARIATIONS;
use muse_studio::AppError;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Behaviour of the stub for one slot
#[derive(Clone, Copy)]
enum Script {
    Image,
    Safety,
    Transport,
}

/// Answers each call according to the slot named in the instruction
struct ScriptedBackend {
    script: fn(usize) -> Script,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    fn new(script: fn(usize) -> Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn slot_of(request: &GenerateContentRequest) -> usize {
    let text = request.contents[0].parts[0].text.as_deref().unwrap_or_default();
    CAMERA_VARIATIONS
        .iter()
        .position(|v| text.contains(&format!("- Shot Name: {}\n", v.name)))
        .expect("instruction names a known variation")
}

#[async_trait]
impl ImageBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn generate_content(
        &self,
        _credential: &str,
        request: &GenerateContentRequest,
    ) -> Result<BackendReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let slot = slot_of(request);
        let body = match (self.script)(slot) {
            Script::Image => json!({"candidates": [{
                "finishReason": "STOP",
                "content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": format!("SLOT{}", slot)}}]}
            }]}),
            Script::Safety => json!({"candidates": [{"finishReason": "SAFETY"}]}),
            Script::Transport => return Err(TransportError("connection reset".to_string())),
        };
        let parsed: GenerateContentResponse = serde_json::from_value(body).unwrap();
        Ok(BackendReply::Completed(parsed))
    }
}

fn orchestrator(backend: Arc<ScriptedBackend>, max_retries: u32) -> Orchestrator {
    Orchestrator::new(
        backend,
        RetryPolicy::new(max_retries, Duration::from_millis(1)),
        Sampling::default(),
    )
}

fn request(count: usize) -> GenerationRequest {
    GenerationRequest {
        image: vec![0x89, 0x50, 0x4E, 0x47, 1, 2, 3],
        mime_type: "image/png".to_string(),
        count,
        credential: "AIzaSy-test".to_string(),
    }
}

#[tokio::test]
async fn test_safety_block_on_one_slot_does_not_sink_siblings() {
    let backend = ScriptedBackend::new(|slot| if slot == 1 { Script::Safety } else { Script::Image });
    let result = orchestrator(backend, 3).generate(&request(3)).await.unwrap();

    assert_eq!(result.total, 3);
    let indices: Vec<usize> = result.successes.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![0, 2]);
    assert_eq!(result.successes[0].image_url, "data:image/png;base64,SLOT0");
    assert_eq!(result.successes[0].variation_name, CAMERA_VARIATIONS[0].name);

    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.index, 1);
    assert_eq!(failure.variation_name, CAMERA_VARIATIONS[1].name);
    assert_eq!(failure.kind, FailureKind::Blocked);
    assert_eq!(failure.error, "Image generation blocked by safety filters");
}

#[tokio::test]
async fn test_all_transport_failures_exhaust_retries() {
    let backend = ScriptedBackend::new(|_| Script::Transport);
    let result = orchestrator(backend.clone(), 2)
        .generate(&request(8))
        .await
        .unwrap();

    assert!(result.successes.is_empty());
    assert_eq!(result.failures.len(), 8);
    for failure in &result.failures {
        assert_eq!(failure.kind, FailureKind::Transport);
        assert_eq!(
            failure.error,
            "Request failed after 2 retries: connection reset"
        );
    }
    // each slot: one attempt plus two retries
    assert_eq!(backend.calls(), 24);
}

#[tokio::test]
async fn test_every_slot_settles_exactly_once() {
    let backend = ScriptedBackend::new(|slot| match slot % 3 {
        0 => Script::Image,
        1 => Script::Safety,
        _ => Script::Transport,
    });
    let orchestrator = orchestrator(backend, 0);

    for count in 1..=8 {
        let result = orchestrator.generate(&request(count)).await.unwrap();
        assert_eq!(result.total, count);
        assert_eq!(result.successes.len() + result.failures.len(), count);
        assert!(result.covers_every_slot(), "count {} left a gap", count);
    }
}

#[tokio::test]
async fn test_prompt_used_names_the_variation() {
    let backend = ScriptedBackend::new(|_| Script::Image);
    let result = orchestrator(backend, 0).generate(&request(2)).await.unwrap();

    for success in &result.successes {
        assert!(success.prompt_used.contains(&success.variation_name));
        assert!(success.prompt_used.contains("CRITICAL PRESERVATION REQUIREMENTS:"));
    }
}

#[tokio::test]
async fn test_slots_take_the_leading_catalog_variations() {
    let backend = ScriptedBackend::new(|_| Script::Image);
    let result = orchestrator(backend, 0).generate(&request(5)).await.unwrap();

    let names: Vec<&str> = result
        .successes
        .iter()
        .map(|s| s.variation_name.as_str())
        .collect();
    let expected: Vec<&str> = CAMERA_VARIATIONS[..5].iter().map(|v| v.name).collect();
    assert_eq!(names, expected);
}

#[tokio::test]
async fn test_invalid_requests_fail_before_any_call() {
    let backend = ScriptedBackend::new(|_| Script::Image);
    let orchestrator = orchestrator(backend.clone(), 0);

    let mut empty = request(1);
    empty.image.clear();
    let too_many = request(9);
    let none = request(0);
    let mut blank = request(1);
    blank.credential = "   ".to_string();

    for bad in [empty, too_many, none, blank] {
        let err = orchestrator.generate(&bad).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)), "got {:?}", err);
    }
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_shutdown_cancels_backoff() {
    let backend = ScriptedBackend::new(|_| Script::Transport);
    let token = CancellationToken::new();
    let orchestrator = Orchestrator::new(
        backend,
        RetryPolicy::new(5, Duration::from_secs(3600)),
        Sampling::default(),
    )
    .with_shutdown(token.clone());
    token.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), orchestrator.generate(&request(3)))
        .await
        .expect("cancelled slots settle promptly")
        .unwrap();

    assert_eq!(result.failures.len(), 3);
    assert!(result
        .failures
        .iter()
        .all(|f| f.kind == FailureKind::Cancelled));
}
