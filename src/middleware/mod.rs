//! Middleware module - Session authentication and rate limiting

pub mod auth;
pub mod rate_limit;

pub use auth::{AuthLayer, AuthMode, AuthenticatedUser};
pub use rate_limit::{
    client_identifier, InMemoryRateLimitStore, RateLimitDecision, RateLimitLayer, RateLimitStore,
    RateLimiter,
};
