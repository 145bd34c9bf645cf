//! Session authentication middleware

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, Request},
    response::{IntoResponse, Response},
};
use futures::future::BoxFuture;
use std::{
    collections::HashMap,
    sync::Arc,
    task::{Context, Poll},
};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::AppError;

/// Signed-in caller, inserted as a request extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: String,
    pub name: Option<String>,
}

/// Whether a route group rejects anonymous callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Required,
    Optional,
}

/// Authentication layer
#[derive(Clone)]
pub struct AuthLayer {
    sessions: Arc<HashMap<String, AuthenticatedUser>>,
    mode: AuthMode,
}

impl AuthLayer {
    pub fn new(sessions: Arc<HashMap<String, AuthenticatedUser>>, mode: AuthMode) -> Self {
        Self { sessions, mode }
    }

    pub fn required(sessions: Arc<HashMap<String, AuthenticatedUser>>) -> Self {
        Self::new(sessions, AuthMode::Required)
    }

    pub fn optional(sessions: Arc<HashMap<String, AuthenticatedUser>>) -> Self {
        Self::new(sessions, AuthMode::Optional)
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            sessions: self.sessions.clone(),
            mode: self.mode,
        }
    }
}

/// Authentication middleware service
#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    sessions: Arc<HashMap<String, AuthenticatedUser>>,
    mode: AuthMode,
}

impl<S> Service<Request<Body>> for AuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response> + Send + Clone + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h).trim().to_string())
            .filter(|t| !t.is_empty());

        let user = token.as_ref().and_then(|t| self.sessions.get(t)).cloned();

        match (user, self.mode) {
            (Some(user), _) => {
                request.extensions_mut().insert(user);
                Box::pin(self.inner.call(request))
            }
            (None, AuthMode::Optional) => Box::pin(self.inner.call(request)),
            (None, AuthMode::Required) => {
                if token.is_some() {
                    warn!(path = %request.uri().path(), "Unknown session token");
                }
                Box::pin(async move { Ok(unauthorized_response()) })
            }
        }
    }
}

fn unauthorized_response() -> Response {
    AppError::Unauthorized("Unauthorized".to_string()).into_response()
}
