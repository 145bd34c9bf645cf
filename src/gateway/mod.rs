//! Gateway module - Generation fan-out and upstream retry

pub mod orchestrator;
pub mod retry;

pub use orchestrator::{
    AggregateResult, FailureKind, GenerationRequest, Orchestrator, Sampling, SlotFailure,
    SlotResult, SlotSuccess,
};
pub use retry::RetryPolicy;
