//! In-memory store for tests and single-process demos

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::store::models::{
    stored_now, Generation, GenerationFilter, NewGeneration, Page, PageRequest, SortOrder,
    User, UserSettings, UserSettingsPatch,
};
use crate::store::{StoreError, StoreResult, StudioStore};

#[derive(Default)]
struct MemoryState {
    users: HashMap<String, User>,
    settings: HashMap<String, UserSettings>,
    /// Insertion order breaks timestamp ties when listing
    generations: Vec<Generation>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned<'a>(
    generations: &'a mut [Generation],
    id: &str,
    user_id: &str,
) -> StoreResult<&'a mut Generation> {
    generations
        .iter_mut()
        .find(|g| g.id == id && g.user_id == user_id)
        .ok_or_else(|| StoreError::NotFound("Generation".to_string()))
}

#[async_trait]
impl StudioStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.read();
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn ensure_user(&self, email: &str, name: Option<&str>) -> StoreResult<User> {
        let mut state = self.state.write();
        if let Some(user) = state.users.values().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            created_at: stored_now(),
        };
        state.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user_settings(&self, user_id: &str) -> StoreResult<Option<UserSettings>> {
        Ok(self.state.read().settings.get(user_id).cloned())
    }

    async fn upsert_user_settings(
        &self,
        user_id: &str,
        patch: UserSettingsPatch,
    ) -> StoreResult<UserSettings> {
        let mut state = self.state.write();
        let defaults = match state.users.get(user_id) {
            Some(user) => UserSettings::defaults_for(user),
            None => return Err(StoreError::NotFound("User".to_string())),
        };
        let settings = state
            .settings
            .entry(user_id.to_string())
            .or_insert(defaults);
        settings.apply(patch);
        Ok(settings.clone())
    }

    async fn clear_api_key(&self, user_id: &str) -> StoreResult<bool> {
        let mut state = self.state.write();
        Ok(match state.settings.get_mut(user_id) {
            Some(settings) => {
                let had_key = settings.api_key.take().is_some();
                settings.updated_at = stored_now();
                had_key
            }
            None => false,
        })
    }

    async fn create_generation(&self, generation: NewGeneration) -> StoreResult<Generation> {
        let mut state = self.state.write();
        if !state.users.contains_key(&generation.user_id) {
            return Err(StoreError::NotFound("User".to_string()));
        }
        let record = generation.into_generation(Uuid::new_v4().to_string(), stored_now());
        state.generations.push(record.clone());
        Ok(record)
    }

    async fn list_generations(
        &self,
        user_id: &str,
        filter: &GenerationFilter,
        page: &PageRequest,
    ) -> StoreResult<Page<Generation>> {
        let state = self.state.read();
        let mut matching: Vec<Generation> = state
            .generations
            .iter()
            .filter(|g| g.user_id == user_id && filter.matches(g))
            .cloned()
            .collect();
        if page.sort_order == SortOrder::Desc {
            matching.reverse();
        }
        page.sort(&mut matching);

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.limit as usize)
            .collect();

        Ok(Page {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    async fn get_generation(&self, id: &str, user_id: &str) -> StoreResult<Generation> {
        self.state
            .read()
            .generations
            .iter()
            .find(|g| g.id == id && g.user_id == user_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("Generation".to_string()))
    }

    async fn update_generation_favorite(
        &self,
        id: &str,
        user_id: &str,
        is_favorite: bool,
    ) -> StoreResult<Generation> {
        let mut state = self.state.write();
        let generation = owned(&mut state.generations, id, user_id)?;
        generation.is_favorite = is_favorite;
        generation.updated_at = stored_now();
        Ok(generation.clone())
    }

    async fn delete_generation(&self, id: &str, user_id: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        owned(&mut state.generations, id, user_id)?;
        state.generations.retain(|g| g.id != id);
        Ok(())
    }
}
