// Core moderation module - the per-upload decision pipeline.
// Following the same pattern as the notices module.

pub mod moderation_models;
pub mod moderation_service;

pub use moderation_models::*;
pub use moderation_service::*;
