//! Backend module - Upstream wire types, backend trait and the Gemini client

pub mod http_backend;
pub mod traits;

pub use http_backend::GeminiBackend;
pub use traits::{BackendReply, ImageBackend, TransportError};
