//! Persistence gateway for users, settings and generation history

pub mod memory;
pub mod models;
pub mod sqlite;

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::StorageConfig;

pub use memory::MemoryStore;
pub use models::{
    AspectRatio, FailedSlot, Generation, GenerationFilter, GenerationStatus, NewGeneration, Page,
    PageRequest, SortBy, SortOrder, Theme, User, UserSettings, UserSettingsPatch,
};
pub use sqlite::SqliteStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store task failed: {0}")]
    Unexpected(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage operations, all scoped to a single user
#[async_trait]
pub trait StudioStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// Return the user with `email`, creating it when absent
    async fn ensure_user(&self, email: &str, name: Option<&str>) -> StoreResult<User>;

    async fn get_user_settings(&self, user_id: &str) -> StoreResult<Option<UserSettings>>;

    /// Apply `patch` on top of the stored settings, or on top of the defaults
    /// when the user has none yet
    async fn upsert_user_settings(
        &self,
        user_id: &str,
        patch: UserSettingsPatch,
    ) -> StoreResult<UserSettings>;

    /// Remove the stored credential; returns whether one was present
    async fn clear_api_key(&self, user_id: &str) -> StoreResult<bool>;

    async fn create_generation(&self, generation: NewGeneration) -> StoreResult<Generation>;

    async fn list_generations(
        &self,
        user_id: &str,
        filter: &GenerationFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Generation>>;

    /// `NotFound` unless the record exists and belongs to `user_id`
    async fn get_generation(&self, id: &str, user_id: &str) -> StoreResult<Generation>;

    async fn update_generation_favorite(
        &self,
        id: &str,
        user_id: &str,
        is_favorite: bool,
    ) -> StoreResult<Generation>;

    async fn delete_generation(&self, id: &str, user_id: &str) -> StoreResult<()>;
}

/// Build the configured backend
pub fn open(config: &StorageConfig) -> StoreResult<Arc<dyn StudioStore>> {
    match config.backend.as_str() {
        "memory" => {
            info!("Using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
        "sqlite" => {
            info!(path = %config.sqlite_path, "Using SQLite store");
            Ok(Arc::new(SqliteStore::open(&config.sqlite_path)?))
        }
        other => Err(StoreError::Unexpected(format!(
            "unknown storage backend '{}'",
            other
        ))),
    }
}
