//! Persisted records and query types

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::security::EncryptedSecret;

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!(
                        "invalid {} '{}'",
                        stringify!($name),
                        other
                    )),
                }
            }
        }
    };
}

/// Output framing of generated images
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Portrait,
    Square,
    Landscape,
}

string_enum!(AspectRatio {
    Portrait => "portrait",
    Square => "square",
    Landscape => "landscape",
});

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    #[default]
    Dark,
    Auto,
}

string_enum!(Theme {
    Light => "light",
    Dark => "dark",
    Auto => "auto",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

string_enum!(GenerationStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Failed => "failed",
    Cancelled => "cancelled",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_BLUR_STRENGTH: u8 = 24;
pub const BLUR_STRENGTH_RANGE: std::ops::RangeInclusive<u8> = 10..=50;
pub const DEFAULT_LANGUAGE: &str = "en";

/// Per-user preferences and the sealed upstream credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSettings {
    pub user_id: String,
    pub display_name: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub blur_strength: u8,
    pub theme: Theme,
    pub language: String,
    #[serde(skip)]
    pub api_key: Option<EncryptedSecret>,
    pub updated_at: DateTime<Utc>,
}

impl UserSettings {
    /// Settings a user has before saving anything
    pub fn defaults_for(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            display_name: user.name.clone(),
            aspect_ratio: AspectRatio::default(),
            blur_strength: DEFAULT_BLUR_STRENGTH,
            theme: Theme::default(),
            language: DEFAULT_LANGUAGE.to_string(),
            api_key: None,
            updated_at: stored_now(),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.encrypted.is_empty() && !k.iv.is_empty())
    }

    /// Overwrite every field the patch carries
    pub fn apply(&mut self, patch: UserSettingsPatch) {
        if let Some(display_name) = patch.display_name {
            self.display_name = Some(display_name);
        }
        if let Some(aspect_ratio) = patch.aspect_ratio {
            self.aspect_ratio = aspect_ratio;
        }
        if let Some(blur_strength) = patch.blur_strength {
            self.blur_strength = blur_strength;
        }
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        if let Some(language) = patch.language {
            self.language = language;
        }
        if let Some(api_key) = patch.api_key {
            self.api_key = Some(api_key);
        }
        self.updated_at = stored_now();
    }
}

/// Partial settings update; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSettingsPatch {
    pub display_name: Option<String>,
    pub aspect_ratio: Option<AspectRatio>,
    pub blur_strength: Option<u8>,
    pub theme: Option<Theme>,
    pub language: Option<String>,
    pub api_key: Option<EncryptedSecret>,
}

impl UserSettingsPatch {
    pub fn api_key(secret: EncryptedSecret) -> Self {
        Self {
            api_key: Some(secret),
            ..Self::default()
        }
    }
}

/// A slot that did not produce an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedSlot {
    pub variation_name: String,
    pub error: String,
}

/// One completed photoshoot run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generation {
    pub id: String,
    pub user_id: String,
    pub image_count: u32,
    pub aspect_ratio: AspectRatio,
    pub prompt: Option<String>,
    pub result_urls: Vec<String>,
    pub failed_slots: Vec<FailedSlot>,
    pub status: GenerationStatus,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<u64>,
    pub model_used: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGeneration {
    pub user_id: String,
    pub image_count: u32,
    pub aspect_ratio: AspectRatio,
    pub prompt: Option<String>,
    pub result_urls: Vec<String>,
    pub failed_slots: Vec<FailedSlot>,
    pub status: GenerationStatus,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<u64>,
    pub model_used: Option<String>,
}

impl NewGeneration {
    /// Stamp an id and timestamps onto the new record
    pub fn into_generation(self, id: String, now: DateTime<Utc>) -> Generation {
        let now = now.trunc_subsecs(6);
        let completed_at = matches!(
            self.status,
            GenerationStatus::Completed | GenerationStatus::Failed
        )
        .then_some(now);

        Generation {
            id,
            user_id: self.user_id,
            image_count: self.image_count,
            aspect_ratio: self.aspect_ratio,
            prompt: self.prompt,
            result_urls: self.result_urls,
            failed_slots: self.failed_slots,
            status: self.status,
            error_message: self.error_message,
            processing_time_ms: self.processing_time_ms,
            model_used: self.model_used,
            is_favorite: false,
            created_at: now,
            updated_at: now,
            completed_at,
        }
    }
}

/// Narrowing applied to a user's generations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationFilter {
    pub status: Option<GenerationStatus>,
    pub favorite: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl GenerationFilter {
    pub fn matches(&self, generation: &Generation) -> bool {
        self.status.map_or(true, |s| generation.status == s)
            && self.favorite.map_or(true, |f| generation.is_favorite == f)
            && self.start_date.map_or(true, |d| generation.created_at >= d)
            && self.end_date.map_or(true, |d| generation.created_at <= d)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    #[serde(alias = "createdAt")]
    CreatedAt,
    #[serde(alias = "updatedAt")]
    UpdatedAt,
}

impl SortBy {
    pub fn column(&self) -> &'static str {
        match self {
            SortBy::CreatedAt => "created_at",
            SortBy::UpdatedAt => "updated_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 1-based page selection plus ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
        }
    }
}

impl PageRequest {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    /// Order `items` in place by the requested key and direction
    pub fn sort(&self, items: &mut [Generation]) {
        items.sort_by(|a, b| {
            let ordering = match self.sort_by {
                SortBy::CreatedAt => a.created_at.cmp(&b.created_at),
                SortBy::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            match self.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
    }
}

/// One page of results and the unpaged total
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }
}

/// Current time at the precision timestamps are stored with
pub fn stored_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width UTC timestamp whose text order matches time order
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(text).map(|ts| ts.with_timezone(&Utc))
}
