//! HTTP API module - Router, handlers and wire types

pub mod extract;
pub mod handlers;
pub mod routes;
pub mod types;

pub use routes::create_router;
