//! Fixed-window rate limiting, keyed by client and endpoint class

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::Rng;
use serde::Serialize;
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tower::{Layer, Service};
use tracing::{debug, warn};

use crate::config::RateLimitRule;
use crate::middleware::auth::AuthenticatedUser;

const SWEEP_PROBABILITY: f64 = 0.01;

/// Counter for one identifier within its current window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub reset_at: Instant,
}

/// Backing table for the limiter.
///
/// `record` must be atomic per key: concurrent callers for the same key
/// observe distinct counts.
pub trait RateLimitStore: Send + Sync {
    /// Count one request against `key`, opening a new window when the previous
    /// one has passed. Returns the entry after the update.
    fn record(&self, key: &str, window: Duration, now: Instant) -> RateLimitEntry;

    fn get(&self, key: &str) -> Option<RateLimitEntry>;

    fn remove(&self, key: &str);

    /// Drop entries whose window ended before `now`. Returns how many went.
    fn sweep(&self, now: Instant) -> usize;
}

/// Process-local store on a sharded concurrent map
#[derive(Default)]
pub struct InMemoryRateLimitStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn record(&self, key: &str, window: Duration, now: Instant) -> RateLimitEntry {
        let mut entry = self.entries.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            reset_at: now,
        });
        if entry.count == 0 || now > entry.reset_at {
            *entry = RateLimitEntry {
                count: 1,
                reset_at: now + window,
            };
        } else {
            entry.count = entry.count.saturating_add(1);
        }
        *entry
    }

    fn get(&self, key: &str) -> Option<RateLimitEntry> {
        self.entries.get(key).map(|e| *e)
    }

    fn remove(&self, key: &str) {
        self.entries.remove(key);
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_at);
        before.saturating_sub(self.entries.len())
    }
}

/// Outcome of one limiter check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_in: Duration,
    pub limit: u32,
}

impl RateLimitDecision {
    /// Seconds until the window resets, rounded up
    pub fn reset_in_secs(&self) -> u64 {
        let secs = self.reset_in.as_secs();
        if self.reset_in.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

/// Shared fixed-window limiter
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryRateLimitStore::new()))
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    pub fn check(&self, identifier: &str, rule: RateLimitRule) -> RateLimitDecision {
        if rand::thread_rng().gen_bool(SWEEP_PROBABILITY) {
            let purged = self.store.sweep(Instant::now());
            if purged > 0 {
                debug!(purged, "Swept expired rate limit entries");
            }
        }
        self.check_at(identifier, rule, Instant::now())
    }

    /// Same as `check` with an explicit clock and no sweep
    pub fn check_at(&self, identifier: &str, rule: RateLimitRule, now: Instant) -> RateLimitDecision {
        let window = rule.window();
        let entry = self.store.record(identifier, window, now);
        let limit = rule.max_requests;

        RateLimitDecision {
            allowed: entry.count <= limit,
            remaining: limit.saturating_sub(entry.count),
            reset_in: entry.reset_at.saturating_duration_since(now),
            limit,
        }
    }

    pub fn reset(&self, identifier: &str) {
        self.store.remove(identifier);
    }

    pub fn store(&self) -> &dyn RateLimitStore {
        self.store.as_ref()
    }
}

/// Signed-in user id, else the first forwarded hop, else the real IP
pub fn client_identifier(headers: &HeaderMap, user: Option<&AuthenticatedUser>) -> String {
    if let Some(user) = user {
        return user.user_id.clone();
    }

    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    forwarded.or(real_ip).unwrap_or("unknown").to_string()
}

#[derive(Serialize)]
struct RateLimitExceededBody {
    error: &'static str,
    reset_in: u64,
}

/// Rate limiting layer for one endpoint class
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter>,
    class: &'static str,
    rule: RateLimitRule,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<RateLimiter>, class: &'static str, rule: RateLimitRule) -> Self {
        Self {
            limiter,
            class,
            rule,
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitMiddleware {
            inner,
            limiter: self.limiter.clone(),
            class: self.class,
            rule: self.rule,
        }
    }
}

/// Rate limiting middleware service
#[derive(Clone)]
pub struct RateLimitMiddleware<S> {
    inner: S,
    limiter: Arc<RateLimiter>,
    class: &'static str,
    rule: RateLimitRule,
}

impl<S> Service<Request<Body>> for RateLimitMiddleware<S>
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

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        if request.uri().path() == "/health" {
            return Box::pin(self.inner.call(request));
        }

        let client = client_identifier(
            request.headers(),
            request.extensions().get::<AuthenticatedUser>(),
        );
        let key = format!("{}-{}", self.class, client);
        let decision = self.limiter.check(&key, self.rule);

        if decision.allowed {
            return Box::pin(self.inner.call(request));
        }

        warn!(class = self.class, client = %client, "Rate limit exceeded");
        Box::pin(async move { Ok(rate_limit_exceeded_response(&decision)) })
    }
}

fn rate_limit_exceeded_response(decision: &RateLimitDecision) -> Response {
    let body = RateLimitExceededBody {
        error: "Rate limit exceeded",
        reset_in: decision.reset_in_secs(),
    };
    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();

    let reset_at = chrono::Utc::now()
        + chrono::Duration::from_std(decision.reset_in).unwrap_or_else(|_| chrono::Duration::zero());
    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(decision.limit));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(decision.remaining));
    if let Ok(value) = HeaderValue::from_str(&reset_at.to_rfc3339()) {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}
