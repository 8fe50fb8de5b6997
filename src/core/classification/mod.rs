// Core classification module - safety verdict rules over the external
// image classifier. Following the same pattern as the moderation module.

pub mod classification_models;
pub mod classification_service;

pub use classification_models::*;
pub use classification_service::*;
