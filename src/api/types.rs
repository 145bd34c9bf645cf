//! Request and response bodies for the HTTP API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::gateway::AggregateResult;
use crate::prompt::MAX_VARIATIONS;
use crate::store::models::{
    BLUR_STRENGTH_RANGE, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
use crate::store::{
    AspectRatio, Generation, GenerationFilter, GenerationStatus, Page, PageRequest, SortBy,
    SortOrder, Theme, UserSettings, UserSettingsPatch,
};

fn default_number_of_images() -> i64 {
    1
}

/// `POST /api/generate`
#[derive(Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub image: String,
    #[serde(default = "default_number_of_images", alias = "numberOfImages")]
    pub number_of_images: i64,
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,
    #[serde(default, alias = "useUserAccount")]
    pub use_user_account: bool,
    #[serde(default, alias = "aspectRatio")]
    pub aspect_ratio: Option<AspectRatio>,
}

impl GenerateRequest {
    pub fn image_count(&self) -> Result<usize> {
        usize::try_from(self.number_of_images)
            .ok()
            .filter(|n| (1..=MAX_VARIATIONS).contains(n))
            .ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Number of images must be between 1 and {}",
                    MAX_VARIATIONS
                ))
            })
    }
}

#[derive(Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_id: Option<String>,
    pub results: AggregateResult,
    pub message: String,
}

impl GenerateResponse {
    pub fn new(results: AggregateResult, generation_id: Option<String>) -> Self {
        let message = format!(
            "Generated {} out of {} images successfully",
            results.successes.len(),
            results.total
        );
        Self {
            success: true,
            generation_id,
            results,
            message,
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `POST /api/user/api-key`
#[derive(Deserialize)]
pub struct SaveApiKeyRequest {
    #[serde(default, alias = "apiKey")]
    pub api_key: String,
}

pub const API_KEY_PREFIX: &str = "AIzaSy";
pub const API_KEY_MIN_LEN: usize = 39;

impl SaveApiKeyRequest {
    /// Trimmed key, if it looks like a Gemini key
    pub fn validated_key(&self) -> Result<&str> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(AppError::InvalidInput("API key is required".to_string()));
        }
        if !key.starts_with(API_KEY_PREFIX) || key.len() < API_KEY_MIN_LEN {
            return Err(AppError::InvalidInput(
                "Invalid Gemini API key format".to_string(),
            ));
        }
        Ok(key)
    }
}

#[derive(Serialize)]
pub struct ApiKeyStatusResponse {
    pub success: bool,
    pub has_api_key: bool,
    pub message: String,
}

/// `PUT /api/user/settings`; omitted fields stay as they are
#[derive(Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    #[serde(default, alias = "aspectRatio")]
    pub aspect_ratio: Option<AspectRatio>,
    #[serde(default, alias = "blurStrength")]
    pub blur_strength: Option<i64>,
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default, alias = "geminiApiKey")]
    pub gemini_api_key: Option<String>,
}

const DISPLAY_NAME_MAX: usize = 100;
const SETTINGS_KEY_MIN: usize = 20;
const SETTINGS_KEY_MAX: usize = 200;

impl UpdateSettingsRequest {
    /// Check ranges and build a patch. The API key, when present and
    /// non-empty, is returned separately so the caller can seal it.
    pub fn into_patch(self) -> Result<(UserSettingsPatch, Option<String>)> {
        if let Some(name) = &self.display_name {
            if name.chars().count() > DISPLAY_NAME_MAX {
                return Err(invalid_settings(format!(
                    "display_name must be at most {} characters",
                    DISPLAY_NAME_MAX
                )));
            }
        }

        let blur_strength = match self.blur_strength {
            Some(value) => Some(
                u8::try_from(value)
                    .ok()
                    .filter(|v| BLUR_STRENGTH_RANGE.contains(v))
                    .ok_or_else(|| {
                        invalid_settings(format!(
                            "blur_strength must be between {} and {}",
                            BLUR_STRENGTH_RANGE.start(),
                            BLUR_STRENGTH_RANGE.end()
                        ))
                    })?,
            ),
            None => None,
        };

        if let Some(language) = &self.language {
            if language.chars().count() != 2 {
                return Err(invalid_settings("language must be a 2-letter code"));
            }
        }

        let api_key = self
            .gemini_api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        if let Some(key) = &api_key {
            if key.len() < SETTINGS_KEY_MIN {
                return Err(invalid_settings("Gemini API key looks too short"));
            }
            if key.len() > SETTINGS_KEY_MAX {
                return Err(invalid_settings("Gemini API key looks too long"));
            }
        }

        let patch = UserSettingsPatch {
            display_name: self.display_name,
            aspect_ratio: self.aspect_ratio,
            blur_strength,
            theme: self.theme,
            language: self.language,
            api_key: None,
        };
        Ok((patch, api_key))
    }
}

fn invalid_settings(message: impl Into<String>) -> AppError {
    AppError::InvalidInput(format!("Invalid settings data: {}", message.into()))
}

/// Settings as returned to the client; the sealed key never leaves the server
#[derive(Serialize)]
pub struct SettingsView {
    pub display_name: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub blur_strength: u8,
    pub theme: Theme,
    pub language: String,
    pub has_api_key: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&UserSettings> for SettingsView {
    fn from(settings: &UserSettings) -> Self {
        Self {
            display_name: settings.display_name.clone(),
            aspect_ratio: settings.aspect_ratio,
            blur_strength: settings.blur_strength,
            theme: settings.theme,
            language: settings.language.clone(),
            has_api_key: settings.has_api_key(),
            updated_at: settings.updated_at,
        }
    }
}

#[derive(Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: SettingsView,
}

/// `GET /api/generations` query string
#[derive(Debug, Default, Deserialize)]
pub struct GenerationQuery {
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub status: Option<GenerationStatus>,
    #[serde(default)]
    pub favorite: Option<bool>,
    #[serde(default, alias = "startDate")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, alias = "sortBy")]
    pub sort_by: Option<SortBy>,
    #[serde(default, alias = "sortOrder")]
    pub sort_order: Option<SortOrder>,
}

impl GenerationQuery {
    pub fn into_parts(self) -> Result<(GenerationFilter, PageRequest)> {
        let page = match self.page {
            None => 1,
            Some(p) => u32::try_from(p)
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| {
                    AppError::InvalidInput("Invalid query parameters: page must be >= 1".into())
                })?,
        };
        let limit = match self.limit {
            None => DEFAULT_PAGE_LIMIT,
            Some(l) => u32::try_from(l)
                .ok()
                .filter(|l| (1..=MAX_PAGE_LIMIT).contains(l))
                .ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "Invalid query parameters: limit must be between 1 and {}",
                        MAX_PAGE_LIMIT
                    ))
                })?,
        };

        Ok((
            GenerationFilter {
                status: self.status,
                favorite: self.favorite,
                start_date: self.start_date,
                end_date: self.end_date,
            },
            PageRequest {
                page,
                limit,
                sort_by: self.sort_by.unwrap_or_default(),
                sort_order: self.sort_order.unwrap_or_default(),
            },
        ))
    }
}

#[derive(Serialize)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub pages: u64,
}

#[derive(Serialize)]
pub struct GenerationListResponse {
    pub success: bool,
    pub generations: Vec<Generation>,
    pub pagination: Pagination,
}

impl From<Page<Generation>> for GenerationListResponse {
    fn from(page: Page<Generation>) -> Self {
        let pagination = Pagination {
            total: page.total,
            page: page.page,
            limit: page.limit,
            pages: page.pages(),
        };
        Self {
            success: true,
            generations: page.items,
            pagination,
        }
    }
}

#[derive(Serialize)]
pub struct GenerationResponse {
    pub success: bool,
    pub generation: Generation,
}

/// `POST /api/generations/:id/favorite`
#[derive(Deserialize)]
pub struct FavoriteRequest {
    #[serde(alias = "isFavorite")]
    pub is_favorite: bool,
}

#[derive(Serialize)]
pub struct FavoriteResponse {
    pub success: bool,
    pub is_favorite: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub history: Vec<Generation>,
}

/// `DELETE /api/history?id=`
#[derive(Deserialize)]
pub struct HistoryDeleteQuery {
    #[serde(default)]
    pub id: Option<String>,
}
