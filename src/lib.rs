//! Muse Studio
//!
//! Turns one reference photo into a set of professional studio shots by
//! fanning out to the Gemini image API, and keeps a per-user history of the
//! results.

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod gateway;
pub mod middleware;
pub mod prompt;
pub mod security;
pub mod store;
pub mod upload;

pub use error::{AppError, Result};

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use backend::ImageBackend;
use gateway::Orchestrator;
use middleware::{AuthenticatedUser, RateLimiter};
use security::SecretCodec;
use store::StudioStore;

/// Application state shared across all handlers
pub struct AppState {
    pub settings: Arc<config::Settings>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn StudioStore>,
    /// Present only when an encryption key is configured
    pub codec: Option<Arc<SecretCodec>>,
    pub rate_limiter: Arc<RateLimiter>,
    /// Bearer token -> signed-in user
    pub sessions: Arc<HashMap<String, AuthenticatedUser>>,
}

impl AppState {
    /// Wire the state together and seed configured session users into the store.
    pub async fn build(
        settings: config::Settings,
        backend: Arc<dyn ImageBackend>,
        store: Arc<dyn StudioStore>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let codec = settings
            .security
            .encryption_key
            .as_deref()
            .map(SecretCodec::from_hex_key)
            .transpose()?
            .map(Arc::new);

        let orchestrator =
            Orchestrator::from_config(backend, &settings.gemini).with_shutdown(shutdown);

        let mut sessions = HashMap::with_capacity(settings.auth.sessions.len());
        for session in &settings.auth.sessions {
            let user = store
                .ensure_user(&session.email, session.name.as_deref())
                .await?;
            sessions.insert(
                session.token.clone(),
                AuthenticatedUser {
                    user_id: user.id,
                    email: user.email,
                    name: user.name,
                },
            );
        }
        info!(sessions = sessions.len(), "Seeded session users");

        Ok(Self {
            settings: Arc::new(settings),
            orchestrator: Arc::new(orchestrator),
            store,
            codec,
            rate_limiter: Arc::new(RateLimiter::default()),
            sessions: Arc::new(sessions),
        })
    }

    /// The codec, or a fatal configuration error when key storage is not set up
    pub fn codec(&self) -> Result<&SecretCodec> {
        self.codec.as_deref().ok_or_else(|| {
            AppError::ConfigurationFatal(
                "security.encryption_key is not configured".to_string(),
            )
        })
    }
}
