//! Route table and middleware stack

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, MethodRouter},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::handlers::{self, generate, generations, user};
use crate::config::RateLimitRule;
use crate::middleware::{AuthLayer, RateLimitLayer};
use crate::AppState;

type Route = MethodRouter<Arc<AppState>>;

/// Base64 inflates uploads by a third; leave room for the JSON envelope too.
fn body_limit(max_file_size: usize) -> usize {
    max_file_size.saturating_mul(2).max(1024 * 1024)
}

/// Build the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let rules = &state.settings.rate_limit;
    let limit = |route: Route, class: &'static str, rule: RateLimitRule| -> Route {
        if rules.enabled {
            route.layer(RateLimitLayer::new(
                state.rate_limiter.clone(),
                class,
                rule,
            ))
        } else {
            route
        }
    };

    let generate_routes = Router::new()
        .route(
            "/api/generate",
            limit(post(generate::generate), "generation", rules.generation),
        )
        .layer(AuthLayer::optional(state.sessions.clone()));

    let account_routes = Router::new()
        .route(
            "/api/user/api-key",
            limit(
                get(user::api_key_status).delete(user::delete_api_key),
                "general",
                rules.general,
            )
            .merge(limit(post(user::save_api_key), "api_key", rules.api_key)),
        )
        .route(
            "/api/user/settings",
            limit(
                get(user::get_settings).put(user::update_settings),
                "general",
                rules.general,
            ),
        )
        .route(
            "/api/generations",
            limit(get(generations::list_generations), "general", rules.general),
        )
        .route(
            "/api/generations/:id",
            limit(
                get(generations::get_generation).delete(generations::delete_generation),
                "general",
                rules.general,
            ),
        )
        .route(
            "/api/generations/:id/favorite",
            limit(post(generations::set_favorite), "general", rules.general),
        )
        .route(
            "/api/history",
            limit(
                get(generations::list_history).delete(generations::delete_history_entry),
                "general",
                rules.general,
            ),
        )
        .layer(AuthLayer::required(state.sessions.clone()));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(generate_routes)
        .merge(account_routes)
        .layer(DefaultBodyLimit::max(body_limit(
            state.settings.upload.max_file_size_bytes,
        )))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
