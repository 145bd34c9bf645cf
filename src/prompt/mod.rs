//! Prompt module - Variation catalog and instruction composition

pub mod catalog;
pub mod composer;

pub use catalog::{VariationDescriptor, MAX_VARIATIONS};
pub use composer::{compose_instruction, ShotPlan};
