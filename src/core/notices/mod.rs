// Core notices module - infraction ledger and ban escalation.

pub mod notice_models;
pub mod notice_service;

pub use notice_models::*;
pub use notice_service::*;
