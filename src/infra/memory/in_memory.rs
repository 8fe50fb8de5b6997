// In-memory implementations of the core store traits.
//
// DashMap keeps them safe across concurrent tasks, and the map entry's
// exclusive guard is what makes `append_processed_image` atomic here. The
// service tests run against these instead of hand-rolled mocks.

use crate::core::moderation::{
    apply_processed_image, ProcessedImage, Review, ReviewPatch, ReviewStore, StoreError, User,
    UserPatch, UserStore,
};
use crate::core::notices::{BannedIp, IpBanStore, Notice, NoticeStore};
use crate::core::storage::{ObjectStore, ObjectStoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct InMemoryReviewStore {
    reviews: Arc<DashMap<String, Review>>,
}

impl InMemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, review: Review) {
        self.reviews.insert(review.id.clone(), review);
    }

    pub fn get(&self, review_id: &str) -> Option<Review> {
        self.reviews.get(review_id).map(|entry| entry.clone())
    }
}

#[async_trait]
impl ReviewStore for InMemoryReviewStore {
    async fn get_review(&self, review_id: &str) -> Result<Option<Review>, StoreError> {
        Ok(self.get(review_id))
    }

    async fn merge_review(&self, review_id: &str, patch: ReviewPatch) -> Result<(), StoreError> {
        let mut entry = self
            .reviews
            .get_mut(review_id)
            .ok_or_else(|| StoreError::NotFound(review_id.to_string()))?;
        patch.apply(entry.value_mut());
        Ok(())
    }

    async fn append_processed_image(
        &self,
        review_id: &str,
        image: ProcessedImage,
    ) -> Result<Review, StoreError> {
        let mut entry = self
            .reviews
            .get_mut(review_id)
            .ok_or_else(|| StoreError::NotFound(review_id.to_string()))?;
        if let Some(patch) = apply_processed_image(entry.value(), image) {
            patch.apply(entry.value_mut());
        }
        Ok(entry.clone())
    }

    async fn reviews_by_user(&self, user_id: &str) -> Result<Vec<Review>, StoreError> {
        Ok(self
            .reviews
            .iter()
            .filter(|entry| entry.user_id.as_deref() == Some(user_id))
            .map(|entry| entry.clone())
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    users: Arc<DashMap<String, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user: User) {
        self.users.insert(user.id.clone(), user);
    }

    pub fn get(&self, user_id: &str) -> Option<User> {
        self.users.get(user_id).map(|entry| entry.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.get(user_id))
    }

    async fn merge_user(&self, user_id: &str, patch: UserPatch) -> Result<(), StoreError> {
        let mut entry = self.users.entry(user_id.to_string()).or_insert_with(|| User {
            id: user_id.to_string(),
            ..User::default()
        });
        patch.apply(entry.value_mut());
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryNoticeStore {
    notices: Arc<DashMap<String, Notice>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryNoticeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notice> {
        self.notices.iter().map(|entry| entry.clone()).collect()
    }
}

#[async_trait]
impl NoticeStore for InMemoryNoticeStore {
    async fn add_notice(&self, notice: &Notice) -> Result<String, StoreError> {
        let id = format!("aviso-{}", self.sequence.fetch_add(1, Ordering::SeqCst) + 1);
        self.notices.insert(id.clone(), notice.clone());
        Ok(id)
    }

    async fn count_active_notices(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self
            .notices
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.is_active(now))
            .count())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryIpBanStore {
    records: Arc<DashMap<String, BannedIp>>,
}

impl InMemoryIpBanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, doc_id: &str) -> bool {
        self.records.contains_key(doc_id)
    }
}

#[async_trait]
impl IpBanStore for InMemoryIpBanStore {
    async fn upsert_banned_ip(&self, doc_id: &str, record: &BannedIp) -> Result<(), StoreError> {
        self.records.insert(doc_id.to_string(), record.clone());
        Ok(())
    }
}

/// Object store that only remembers which paths were deleted.
#[derive(Clone)]
pub struct InMemoryObjectStore {
    bucket: String,
    deleted: Arc<DashMap<String, ()>>,
}

impl InMemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            deleted: Arc::new(DashMap::new()),
        }
    }

    pub fn deleted_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.deleted.iter().map(|entry| entry.key().clone()).collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn delete(&self, path: &str, _ignore_missing: bool) -> Result<(), ObjectStoreError> {
        self.deleted.insert(path.to_string(), ());
        Ok(())
    }
}
