//! Photoshoot generation orchestrator
//!
//! One request becomes `count` independent slots. Every slot calls the
//! upstream API concurrently, retries transport failures with backoff, and
//! settles as either a success or a failure. The batch waits for all slots;
//! no slot failure ever cancels a sibling.

use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::traits::{
    BackendReply, Content, GenerateContentRequest, GenerationConfig, ImageBackend, Part,
};
use crate::config::GeminiConfig;
use crate::error::{AppError, Result};
use crate::gateway::retry::{retry_with_backoff, RetryError, RetryPolicy};
use crate::prompt::catalog::select_variations;
use crate::prompt::{ShotPlan, MAX_VARIATIONS};
use crate::upload::base64;

const DEFAULT_OUTPUT_MIME: &str = "image/png";
const TEXT_PREVIEW_CHARS: usize = 100;

/// One photoshoot invocation
#[derive(Clone)]
pub struct GenerationRequest {
    pub image: Vec<u8>,
    pub mime_type: String,
    pub count: usize,
    pub credential: String,
}

impl std::fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("image_bytes", &self.image.len())
            .field("mime_type", &self.mime_type)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

/// Sampling parameters forwarded with every call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// How a slot failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No HTTP response after the retry budget
    Transport,
    /// Non-success status or unreadable body
    Rejected,
    /// Safety, recitation or token-limit stop
    Blocked,
    /// Completed without image data
    NoImage,
    /// Shutdown interrupted the retry loop
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotSuccess {
    pub index: usize,
    pub variation_name: String,
    pub image_url: String,
    pub prompt_used: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotFailure {
    pub index: usize,
    pub variation_name: String,
    pub error: String,
    pub kind: FailureKind,
}

/// Settled outcome of one slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotResult {
    Success(SlotSuccess),
    Failure(SlotFailure),
}

impl SlotResult {
    pub fn index(&self) -> usize {
        match self {
            SlotResult::Success(s) => s.index,
            SlotResult::Failure(f) => f.index,
        }
    }
}

/// Partitioned outcome of a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    #[serde(rename = "successful")]
    pub successes: Vec<SlotSuccess>,
    #[serde(rename = "failed")]
    pub failures: Vec<SlotFailure>,
    pub total: usize,
}

impl AggregateResult {
    /// Partition settled slots, keeping slot order within each side.
    pub fn from_slots(total: usize, mut slots: Vec<SlotResult>) -> Self {
        slots.sort_by_key(SlotResult::index);
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for slot in slots {
            match slot {
                SlotResult::Success(s) => successes.push(s),
                SlotResult::Failure(f) => failures.push(f),
            }
        }
        Self {
            successes,
            failures,
            total,
        }
    }

    /// True when every index in `0..total` appears exactly once across both sides.
    pub fn covers_every_slot(&self) -> bool {
        let mut seen = vec![false; self.total];
        let indices = self
            .successes
            .iter()
            .map(|s| s.index)
            .chain(self.failures.iter().map(|f| f.index));
        for index in indices {
            match seen.get_mut(index) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
        seen.into_iter().all(|s| s)
    }
}

/// Fans a reference photo out to the upstream image API
pub struct Orchestrator {
    backend: Arc<dyn ImageBackend>,
    retry: RetryPolicy,
    sampling: Sampling,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn ImageBackend>, retry: RetryPolicy, sampling: Sampling) -> Self {
        Self {
            backend,
            retry,
            sampling,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn from_config(backend: Arc<dyn ImageBackend>, config: &GeminiConfig) -> Self {
        Self::new(
            backend,
            RetryPolicy::from_config(config),
            Sampling {
                temperature: config.temperature,
                top_p: config.top_p,
                top_k: config.top_k,
            },
        )
    }

    /// Interrupt backoff waits when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn backend(&self) -> &dyn ImageBackend {
        self.backend.as_ref()
    }

    /// Generate `request.count` studio variants of `request.image`.
    ///
    /// Returns `InvalidInput` before any call is made when the image is empty,
    /// the count is outside `1..=8`, or the credential is blank.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<AggregateResult> {
        if request.image.is_empty() {
            return Err(AppError::InvalidInput("No image data provided".to_string()));
        }
        if request.count < 1 || request.count > MAX_VARIATIONS {
            return Err(AppError::InvalidInput(format!(
                "Number of images must be between 1 and {}",
                MAX_VARIATIONS
            )));
        }
        if request.credential.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "An API credential is required".to_string(),
            ));
        }

        info!(
            backend = %self.backend.name(),
            count = request.count,
            image_bytes = request.image.len(),
            "Starting photoshoot generation"
        );

        let image_b64 = base64::encode(&request.image);
        let slots = select_variations(request.count)
            .iter()
            .enumerate()
            .map(|(index, variation)| {
                self.run_slot(
                    ShotPlan::new(index, variation),
                    &request.mime_type,
                    &image_b64,
                    &request.credential,
                )
            });
        let settled = join_all(slots).await;

        let result = AggregateResult::from_slots(request.count, settled);
        info!(
            succeeded = result.successes.len(),
            failed = result.failures.len(),
            total = result.total,
            "Generation complete"
        );
        Ok(result)
    }

    async fn run_slot(
        &self,
        plan: ShotPlan,
        mime_type: &str,
        image_b64: &str,
        credential: &str,
    ) -> SlotResult {
        let instruction = plan.instruction();
        let payload = self.build_request(&instruction, mime_type, image_b64);

        debug!(
            slot = plan.index,
            variation = plan.variation.name,
            lighting = plan.lighting,
            background = plan.background,
            "Generating slot"
        );

        let outcome = retry_with_backoff(self.retry, &self.shutdown, |attempt| {
            debug!(slot = plan.index, attempt, "Calling upstream");
            self.backend.generate_content(credential, &payload)
        })
        .await;

        let settled = match outcome {
            Ok(reply) => interpret_reply(reply),
            Err(RetryError::Exhausted { retries, last }) => Err((
                FailureKind::Transport,
                format!("Request failed after {} retries: {}", retries, last),
            )),
            Err(RetryError::Cancelled { attempts, last }) => Err((
                FailureKind::Cancelled,
                format!(
                    "Request cancelled during shutdown after {} attempt(s): {}",
                    attempts, last
                ),
            )),
        };

        match settled {
            Ok(image_url) => {
                debug!(slot = plan.index, variation = plan.variation.name, "Slot succeeded");
                SlotResult::Success(SlotSuccess {
                    index: plan.index,
                    variation_name: plan.variation.name.to_string(),
                    image_url,
                    prompt_used: instruction,
                })
            }
            Err((kind, error)) => {
                warn!(
                    slot = plan.index,
                    variation = plan.variation.name,
                    kind = ?kind,
                    error = %error,
                    "Slot failed"
                );
                SlotResult::Failure(SlotFailure {
                    index: plan.index,
                    variation_name: plan.variation.name.to_string(),
                    error,
                    kind,
                })
            }
        }
    }

    fn build_request(
        &self,
        instruction: &str,
        mime_type: &str,
        image_b64: &str,
    ) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part::text(instruction), Part::inline(mime_type, image_b64)],
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE".to_string()],
                temperature: self.sampling.temperature,
                top_p: self.sampling.top_p,
                top_k: self.sampling.top_k,
            },
        }
    }
}

/// Turn a reply that reached the API into an image data URI or a slot failure.
fn interpret_reply(reply: BackendReply) -> std::result::Result<String, (FailureKind, String)> {
    let response = match reply {
        BackendReply::Completed(response) => response,
        BackendReply::Rejected { status, error } => {
            let message = error
                .and_then(|e| e.describe())
                .unwrap_or_else(|| format!("API request failed with status {}", status));
            return Err((FailureKind::Rejected, message));
        }
        BackendReply::Malformed(reason) => return Err((FailureKind::Rejected, reason)),
    };

    let Some(candidate) = response.candidates.first() else {
        return Err((
            FailureKind::NoImage,
            "No candidates in response".to_string(),
        ));
    };

    let finish_reason = candidate.finish_reason.as_deref();
    match finish_reason {
        Some("SAFETY") => {
            return Err((
                FailureKind::Blocked,
                "Image generation blocked by safety filters".to_string(),
            ))
        }
        Some("RECITATION") => {
            return Err((
                FailureKind::Blocked,
                "Image generation blocked due to recitation concerns".to_string(),
            ))
        }
        Some("MAX_TOKENS") => {
            return Err((
                FailureKind::Blocked,
                "Generation stopped due to maximum token limit".to_string(),
            ))
        }
        _ => {}
    }

    if let Some(image) = candidate.image().filter(|i| !i.data.is_empty()) {
        let mime = image.mime_type.as_deref().unwrap_or(DEFAULT_OUTPUT_MIME);
        return Ok(format!("data:{};base64,{}", mime, image.data));
    }

    let message = match (finish_reason, candidate.text()) {
        (Some(reason), _) if reason != "STOP" => format!("Generation failed: {}", reason),
        (_, Some(text)) => format!(
            "API returned text instead of image: {}",
            text.chars().take(TEXT_PREVIEW_CHARS).collect::<String>()
        ),
        _ => "No image data in response".to_string(),
    };
    Err((FailureKind::NoImage, message))
}
