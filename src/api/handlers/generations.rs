//! `/api/generations` and `/api/history`

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use std::sync::Arc;

use crate::api::extract::{ApiJson, ApiQuery};
use crate::api::types::{
    FavoriteRequest, FavoriteResponse, GenerationListResponse, GenerationQuery,
    GenerationResponse, HistoryDeleteQuery, HistoryResponse, MessageResponse,
};
use crate::error::{AppError, Result};
use crate::middleware::AuthenticatedUser;
use crate::store::{GenerationFilter, PageRequest, SortOrder};
use crate::AppState;

/// GET /api/generations
pub async fn list_generations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<GenerationQuery>,
) -> Result<Json<GenerationListResponse>> {
    let (filter, page) = query.into_parts()?;
    let page = state
        .store
        .list_generations(&user.user_id, &filter, &page)
        .await?;
    Ok(Json(page.into()))
}

/// GET /api/generations/:id
pub async fn get_generation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<GenerationResponse>> {
    let generation = state.store.get_generation(&id, &user.user_id).await?;
    Ok(Json(GenerationResponse {
        success: true,
        generation,
    }))
}

/// DELETE /api/generations/:id
pub async fn delete_generation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.store.delete_generation(&id, &user.user_id).await?;
    Ok(Json(MessageResponse::new("Generation deleted successfully")))
}

/// POST /api/generations/:id/favorite
pub async fn set_favorite(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<FavoriteRequest>,
) -> Result<Json<FavoriteResponse>> {
    let updated = state
        .store
        .update_generation_favorite(&id, &user.user_id, request.is_favorite)
        .await?;
    Ok(Json(FavoriteResponse {
        success: true,
        is_favorite: updated.is_favorite,
    }))
}

/// GET /api/history
pub async fn list_history(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<HistoryResponse>> {
    let mut history = Vec::new();
    let mut request = PageRequest {
        page: 1,
        limit: crate::store::models::MAX_PAGE_LIMIT,
        sort_order: SortOrder::Desc,
        ..PageRequest::default()
    };
    loop {
        let page = state
            .store
            .list_generations(&user.user_id, &GenerationFilter::default(), &request)
            .await?;
        let last = u64::from(request.page) >= page.pages();
        history.extend(page.items);
        if last {
            break;
        }
        request.page += 1;
    }

    Ok(Json(HistoryResponse {
        success: true,
        history,
    }))
}

/// DELETE /api/history?id=
pub async fn delete_history_entry(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    ApiQuery(query): ApiQuery<HistoryDeleteQuery>,
) -> Result<Json<MessageResponse>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Generation ID is required".to_string()))?;

    state.store.delete_generation(&id, &user.user_id).await?;
    Ok(Json(MessageResponse::new(
        "Generation record deleted successfully",
    )))
}
