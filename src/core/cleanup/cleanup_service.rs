// Ban cleanup sweep - reacts to a user turning banned.
//
// Hides every review the user owns, deletes the stored images behind them
// (best-effort, per path), and records one ban notice. Only the initial
// review query is allowed to fail the whole invocation; everything after it
// degrades per item.

use crate::core::moderation::{
    Review, ReviewPatch, ReviewStore, StoreError, User, BANNED_ACCOUNT_MESSAGE,
};
use crate::core::notices::{Notice, NoticeStore};
use crate::core::storage::{ObjectStore, REVIEW_IMAGE_NAMESPACE};
use chrono::Utc;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one user-update invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The update was not a falsy-to-true ban transition; nothing done.
    NotNewlyBanned,
    Swept {
        reviews: usize,
        deleted: usize,
        failed_deletes: usize,
    },
}

/// Did this document update flip the user into banned state?
pub fn is_newly_banned(before: Option<&User>, after: &User) -> bool {
    after.banned && !before.map(|user| user.banned).unwrap_or(false)
}

/// Union of storage paths associated with a review, across the three
/// formats that have existed over time: the processed-images sequence, the
/// legacy pending-paths list, and raw paths that leaked into the flat
/// `imagenes` list before it became a pure URL projection.
pub fn review_storage_paths(review: &Review) -> BTreeSet<String> {
    let marker = format!("{REVIEW_IMAGE_NAMESPACE}/");
    let mut paths = BTreeSet::new();

    for image in &review.processed_images {
        if !image.path.is_empty() {
            paths.insert(image.path.clone());
        }
    }
    for path in &review.pending_image_paths {
        if !path.is_empty() {
            paths.insert(path.clone());
        }
    }
    for entry in &review.image_urls {
        if !entry.starts_with("http") && entry.contains(&marker) {
            paths.insert(entry.clone());
        }
    }

    paths
}

pub struct BanCleanupService<R: ReviewStore, O: ObjectStore, N: NoticeStore> {
    reviews: R,
    objects: O,
    notices: N,
}

impl<R: ReviewStore, O: ObjectStore, N: NoticeStore> BanCleanupService<R, O, N> {
    pub fn new(reviews: R, objects: O, notices: N) -> Self {
        Self {
            reviews,
            objects,
            notices,
        }
    }

    /// React to a user-document update carrying before/after snapshots.
    pub async fn handle_user_update(
        &self,
        user_id: &str,
        before: Option<&User>,
        after: &User,
    ) -> Result<CleanupOutcome, CleanupError> {
        if !is_newly_banned(before, after) {
            return Ok(CleanupOutcome::NotNewlyBanned);
        }

        let now = Utc::now();

        // Fatal on failure: without the listing there is no sweep, and the
        // trigger source should redeliver.
        let reviews = self.reviews.reviews_by_user(user_id).await?;

        let mut paths: BTreeSet<String> = BTreeSet::new();
        for review in &reviews {
            paths.extend(review_storage_paths(review));
            let patch = ReviewPatch::rejection(BANNED_ACCOUNT_MESSAGE, now);
            if let Err(err) = self.reviews.merge_review(&review.id, patch).await {
                tracing::warn!(
                    review_id = %review.id,
                    "Could not hide a review during ban cleanup: {err}"
                );
            }
        }

        let mut deleted = 0usize;
        let mut failed_deletes = 0usize;
        for path in &paths {
            match self.objects.delete(path, true).await {
                Ok(()) => deleted += 1,
                Err(err) => {
                    failed_deletes += 1;
                    tracing::warn!(path = %path, "Could not delete a stored image during ban cleanup: {err}");
                }
            }
        }

        self.notices
            .add_notice(&Notice::user_ban(user_id, after.ban_reason.as_deref(), now))
            .await?;

        tracing::info!(
            user_id,
            reviews = reviews.len(),
            deleted,
            failed_deletes,
            "Ban cleanup finished"
        );

        Ok(CleanupOutcome::Swept {
            reviews: reviews.len(),
            deleted,
            failed_deletes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{ProcessedImage, ReviewStatus};
    use crate::core::notices::{NoticeKind, DEFAULT_BAN_REASON};
    use crate::core::storage::ObjectStoreError;
    use crate::infra::memory::{InMemoryNoticeStore, InMemoryObjectStore, InMemoryReviewStore};
    use async_trait::async_trait;

    fn banned_user(reason: Option<&str>) -> User {
        User {
            id: "u1".to_string(),
            banned: true,
            banned_since: Some(Utc::now()),
            ban_reason: reason.map(str::to_string),
        }
    }

    fn processed(path: &str) -> ProcessedImage {
        ProcessedImage {
            url: format!("https://storage.googleapis.com/b/{path}"),
            path: path.to_string(),
            moderation_detail: None,
            processed_at: Utc::now(),
        }
    }

    /// Three reviews, five distinct paths spread over the legacy formats,
    /// with one path duplicated across two sources.
    fn seed_reviews(store: &InMemoryReviewStore) {
        store.insert(Review {
            id: "r1".to_string(),
            user_id: Some("u1".to_string()),
            processed_images: vec![processed("resenas/r1/a.jpg"), processed("resenas/r1/b.jpg")],
            image_urls: vec![
                "https://storage.googleapis.com/b/resenas/r1/a.jpg".to_string(),
                "resenas/r1/b.jpg".to_string(),
            ],
            ..Review::default()
        });
        store.insert(Review {
            id: "r2".to_string(),
            user_id: Some("u1".to_string()),
            pending_image_paths: vec![
                "resenas/r2/c.jpg".to_string(),
                "resenas/r2/d.jpg".to_string(),
            ],
            ..Review::default()
        });
        store.insert(Review {
            id: "r3".to_string(),
            user_id: Some("u1".to_string()),
            image_urls: vec!["resenas/r3/e.jpg".to_string()],
            ..Review::default()
        });
    }

    #[test]
    fn newly_banned_requires_a_falsy_to_true_transition() {
        let banned = banned_user(None);
        let clean = User::default();

        assert!(is_newly_banned(None, &banned));
        assert!(is_newly_banned(Some(&clean), &banned));
        assert!(!is_newly_banned(Some(&banned), &banned));
        assert!(!is_newly_banned(Some(&clean), &clean));
    }

    #[test]
    fn path_union_spans_all_legacy_sources() {
        let review = Review {
            id: "r1".to_string(),
            processed_images: vec![processed("resenas/r1/a.jpg")],
            pending_image_paths: vec!["resenas/r1/a.jpg".to_string(), "resenas/r1/b.jpg".to_string()],
            image_urls: vec![
                "https://storage.googleapis.com/b/resenas/r1/a.jpg".to_string(),
                "resenas/r1/c.jpg".to_string(),
                "ajena/otra.jpg".to_string(),
            ],
            ..Review::default()
        };

        let paths = review_storage_paths(&review);
        assert_eq!(
            paths.into_iter().collect::<Vec<_>>(),
            vec!["resenas/r1/a.jpg", "resenas/r1/b.jpg", "resenas/r1/c.jpg"]
        );
    }

    #[tokio::test]
    async fn sweep_hides_reviews_deletes_paths_and_records_one_notice() {
        let reviews = InMemoryReviewStore::new();
        let objects = InMemoryObjectStore::new("b");
        let notices = InMemoryNoticeStore::new();
        seed_reviews(&reviews);

        let service = BanCleanupService::new(reviews.clone(), objects.clone(), notices.clone());
        let outcome = service
            .handle_user_update("u1", Some(&User::default()), &banned_user(Some("abuso")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CleanupOutcome::Swept {
                reviews: 3,
                deleted: 5,
                failed_deletes: 0,
            }
        );

        for id in ["r1", "r2", "r3"] {
            let stored = reviews.get(id).unwrap();
            assert_eq!(stored.status, ReviewStatus::Rejected);
            assert_eq!(stored.visible_to_author, Some(false));
            assert_eq!(
                stored.rejection_reason.as_deref(),
                Some(BANNED_ACCOUNT_MESSAGE)
            );
        }

        assert_eq!(objects.deleted_paths().len(), 5);

        let recorded = notices.all();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].kind, NoticeKind::UserBanned);
        assert_eq!(recorded[0].reason, "abuso");
    }

    #[tokio::test]
    async fn already_banned_user_produces_zero_effects() {
        let reviews = InMemoryReviewStore::new();
        let objects = InMemoryObjectStore::new("b");
        let notices = InMemoryNoticeStore::new();
        seed_reviews(&reviews);

        let service = BanCleanupService::new(reviews.clone(), objects.clone(), notices.clone());
        let outcome = service
            .handle_user_update("u1", Some(&banned_user(None)), &banned_user(None))
            .await
            .unwrap();

        assert_eq!(outcome, CleanupOutcome::NotNewlyBanned);
        assert!(objects.deleted_paths().is_empty());
        assert!(notices.all().is_empty());
        assert_eq!(reviews.get("r1").unwrap().status, ReviewStatus::PendingReview);
    }

    #[tokio::test]
    async fn failed_deletions_do_not_abort_the_sweep() {
        #[derive(Clone)]
        struct FlakyObjectStore {
            inner: InMemoryObjectStore,
            poison: String,
        }

        #[async_trait]
        impl ObjectStore for FlakyObjectStore {
            fn bucket(&self) -> &str {
                self.inner.bucket()
            }

            async fn delete(
                &self,
                path: &str,
                ignore_missing: bool,
            ) -> Result<(), ObjectStoreError> {
                if path == self.poison {
                    return Err(ObjectStoreError::Backend("permission denied".into()));
                }
                self.inner.delete(path, ignore_missing).await
            }
        }

        let reviews = InMemoryReviewStore::new();
        let notices = InMemoryNoticeStore::new();
        seed_reviews(&reviews);
        let objects = FlakyObjectStore {
            inner: InMemoryObjectStore::new("b"),
            poison: "resenas/r2/c.jpg".to_string(),
        };

        let service = BanCleanupService::new(reviews, objects.clone(), notices.clone());
        let outcome = service
            .handle_user_update("u1", None, &banned_user(None))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            CleanupOutcome::Swept {
                reviews: 3,
                deleted: 4,
                failed_deletes: 1,
            }
        );
        // the notice still lands, with the default reason
        let recorded = notices.all();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].reason, DEFAULT_BAN_REASON);
    }

    #[tokio::test]
    async fn failed_review_listing_is_fatal() {
        #[derive(Clone)]
        struct BrokenReviewStore;

        #[async_trait]
        impl ReviewStore for BrokenReviewStore {
            async fn get_review(&self, _: &str) -> Result<Option<Review>, StoreError> {
                Err(StoreError::Backend("resenas unavailable".into()))
            }

            async fn merge_review(&self, _: &str, _: ReviewPatch) -> Result<(), StoreError> {
                Err(StoreError::Backend("resenas unavailable".into()))
            }

            async fn append_processed_image(
                &self,
                _: &str,
                _: ProcessedImage,
            ) -> Result<Review, StoreError> {
                Err(StoreError::Backend("resenas unavailable".into()))
            }

            async fn reviews_by_user(&self, _: &str) -> Result<Vec<Review>, StoreError> {
                Err(StoreError::Backend("resenas unavailable".into()))
            }
        }

        let service = BanCleanupService::new(
            BrokenReviewStore,
            InMemoryObjectStore::new("b"),
            InMemoryNoticeStore::new(),
        );
        let result = service
            .handle_user_update("u1", None, &banned_user(None))
            .await;
        assert!(result.is_err());
    }
}
