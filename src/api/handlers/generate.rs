//! `POST /api/generate`

use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::api::extract::ApiJson;
use crate::api::types::{GenerateRequest, GenerateResponse};
use crate::error::{AppError, Result};
use crate::gateway::{AggregateResult, GenerationRequest};
use crate::middleware::AuthenticatedUser;
use crate::store::{AspectRatio, FailedSlot, GenerationStatus, NewGeneration};
use crate::upload::decode_upload;
use crate::AppState;

pub async fn generate(
    State(state): State<Arc<AppState>>,
    user: Option<Extension<AuthenticatedUser>>,
    ApiJson(request): ApiJson<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    let user = user.map(|Extension(u)| u);
    let count = request.image_count()?;
    let upload = decode_upload(&request.image, state.settings.upload.max_file_size_bytes)?;
    let credential = resolve_credential(&state, user.as_ref(), &request).await?;

    let started = Instant::now();
    let results = state
        .orchestrator
        .generate(&GenerationRequest {
            image: upload.bytes,
            mime_type: upload.mime_type,
            count,
            credential,
        })
        .await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let generation_id = match &user {
        Some(user) => {
            let aspect_ratio = match request.aspect_ratio {
                Some(ratio) => ratio,
                None => preferred_aspect_ratio(&state, &user.user_id).await,
            };
            let record = history_record(
                &user.user_id,
                aspect_ratio,
                &results,
                elapsed_ms,
                state.orchestrator.backend().model(),
            );
            match state.store.create_generation(record).await {
                Ok(saved) => Some(saved.id),
                Err(e) => {
                    // History is best-effort once images exist.
                    warn!(error = %e, user_id = %user.user_id, "Failed to record generation");
                    None
                }
            }
        }
        None => None,
    };

    info!(
        succeeded = results.successes.len(),
        total = results.total,
        elapsed_ms,
        signed_in = user.is_some(),
        "Photoshoot request served"
    );
    Ok(Json(GenerateResponse::new(results, generation_id)))
}

/// Account key for opted-in signed-in callers, else the supplied key, each
/// falling back to the server key.
async fn resolve_credential(
    state: &AppState,
    user: Option<&AuthenticatedUser>,
    request: &GenerateRequest,
) -> Result<String> {
    let server_key = || {
        state
            .settings
            .gemini
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
    };

    let credential = match user {
        Some(user) if request.use_user_account => {
            stored_api_key(state, &user.user_id).await.or_else(server_key)
        }
        _ => request
            .api_key
            .as_ref()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(server_key),
    };

    credential.ok_or_else(|| {
        AppError::InvalidInput(
            "Gemini API key is required. Please set it in settings or sign in.".to_string(),
        )
    })
}

/// The user's decrypted key; unreadable keys are logged and treated as absent
async fn stored_api_key(state: &AppState, user_id: &str) -> Option<String> {
    let codec = state.codec.as_deref()?;
    let settings = match state.store.get_user_settings(user_id).await {
        Ok(settings) => settings?,
        Err(e) => {
            warn!(error = %e, user_id, "Failed to load user settings");
            return None;
        }
    };
    let secret = settings.api_key?;
    match codec.decrypt_secret(&secret) {
        Ok(key) => key,
        Err(e) => {
            warn!(error = %e, user_id, "Stored API key could not be decrypted");
            None
        }
    }
}

async fn preferred_aspect_ratio(state: &AppState, user_id: &str) -> AspectRatio {
    match state.store.get_user_settings(user_id).await {
        Ok(Some(settings)) => settings.aspect_ratio,
        _ => AspectRatio::default(),
    }
}

fn history_record(
    user_id: &str,
    aspect_ratio: AspectRatio,
    results: &AggregateResult,
    elapsed_ms: u64,
    model: &str,
) -> NewGeneration {
    let status = if results.successes.is_empty() {
        GenerationStatus::Failed
    } else {
        GenerationStatus::Completed
    };
    let error_message = results.successes.is_empty().then(|| {
        results
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.variation_name, f.error))
            .collect::<Vec<_>>()
            .join("; ")
    });

    NewGeneration {
        user_id: user_id.to_string(),
        image_count: results.total as u32,
        aspect_ratio,
        prompt: results.successes.first().map(|s| s.prompt_used.clone()),
        result_urls: results.successes.iter().map(|s| s.image_url.clone()).collect(),
        failed_slots: results
            .failures
            .iter()
            .map(|f| FailedSlot {
                variation_name: f.variation_name.clone(),
                error: f.error.clone(),
            })
            .collect(),
        status,
        error_message,
        processing_time_ms: Some(elapsed_ms),
        model_used: Some(model.to_string()),
    }
}
