//! `/api/user/*`: stored API key and preferences

use axum::{extract::State, Extension, Json};
use std::sync::Arc;
use tracing::info;

use crate::api::extract::ApiJson;
use crate::api::types::{
    ApiKeyStatusResponse, MessageResponse, SaveApiKeyRequest, SettingsResponse, SettingsView,
    UpdateSettingsRequest,
};
use crate::error::{AppError, Result};
use crate::middleware::AuthenticatedUser;
use crate::store::{User, UserSettings, UserSettingsPatch};
use crate::AppState;

/// GET /api/user/api-key
pub async fn api_key_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<ApiKeyStatusResponse>> {
    let has_api_key = state
        .store
        .get_user_settings(&user.user_id)
        .await?
        .is_some_and(|s| s.has_api_key());

    let message = if has_api_key {
        "API key is stored securely"
    } else {
        "No API key stored"
    };
    Ok(Json(ApiKeyStatusResponse {
        success: true,
        has_api_key,
        message: message.to_string(),
    }))
}

/// POST /api/user/api-key
pub async fn save_api_key(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(request): ApiJson<SaveApiKeyRequest>,
) -> Result<Json<MessageResponse>> {
    let key = request.validated_key()?;
    let sealed = state.codec()?.encrypt(key)?;

    state
        .store
        .upsert_user_settings(&user.user_id, UserSettingsPatch::api_key(sealed))
        .await?;

    info!(user_id = %user.user_id, "Stored API key");
    Ok(Json(MessageResponse::new("API key stored securely")))
}

/// DELETE /api/user/api-key
pub async fn delete_api_key(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<MessageResponse>> {
    let removed = state.store.clear_api_key(&user.user_id).await?;
    info!(user_id = %user.user_id, removed, "Cleared API key");
    Ok(Json(MessageResponse::new("API key removed successfully")))
}

/// GET /api/user/settings
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<SettingsResponse>> {
    let settings = match state.store.get_user_settings(&user.user_id).await? {
        Some(settings) => settings,
        None => UserSettings::defaults_for(&account(&state, &user).await?),
    };

    Ok(Json(SettingsResponse {
        success: true,
        settings: SettingsView::from(&settings),
    }))
}

/// PUT /api/user/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiJson(request): ApiJson<UpdateSettingsRequest>,
) -> Result<Json<SettingsResponse>> {
    let (mut patch, api_key) = request.into_patch()?;
    if let Some(key) = api_key {
        patch.api_key = Some(state.codec()?.encrypt(&key)?);
    }

    let settings = state
        .store
        .upsert_user_settings(&user.user_id, patch)
        .await?;

    Ok(Json(SettingsResponse {
        success: true,
        settings: SettingsView::from(&settings),
    }))
}

async fn account(state: &AppState, user: &AuthenticatedUser) -> Result<User> {
    state
        .store
        .find_user_by_email(&user.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}
