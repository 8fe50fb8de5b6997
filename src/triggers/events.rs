// Event payloads delivered by the trigger source.
//
// Delivery is at-least-once: handlers must tolerate replays, and a failed
// invocation is redelivered per the source's own retry policy.

use crate::core::moderation::User;
use serde::Deserialize;

/// An object finished uploading into the bucket.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageObjectEvent {
    pub bucket: String,
    /// Full object path within the bucket.
    pub name: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A user document changed, with before/after snapshots.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdateEvent {
    pub user_id: String,
    #[serde(default)]
    pub before: Option<User>,
    pub after: User,
}
