// Review moderation pipeline - core business logic for upload handling.
//
// One invocation per finalized upload, running the strict decision order:
// namespace check, review existence, author ban check, classification,
// then either rejection bookkeeping or the aggregation append.
//
// NO HTTP or Google API types here - just ports and rules.

use super::moderation_models::{
    ProcessedImage, Review, ReviewPatch, ReviewStatus, User, UserPatch, BANNED_ACCOUNT_MESSAGE,
    INAPPROPRIATE_IMAGE_REASON,
};
use crate::core::classification::{ClassificationService, ImageClassifier};
use crate::core::notices::{InfractionOutcome, IpBanStore, NoticeError, NoticeLedger, NoticeStore};
use crate::core::storage::{
    public_object_url, review_id_from_path, ObjectRef, ObjectStore, ObjectStoreError,
    REVIEW_IMAGE_NAMESPACE,
};
use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced by the document-store ports.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document store error: {0}")]
    Backend(String),

    #[error("document not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Objects(#[from] ObjectStoreError),

    #[error(transparent)]
    Ledger(#[from] NoticeError),
}

// ============================================================================
// STORAGE TRAITS (PORTS)
// ============================================================================

/// Port for the review documents.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn get_review(&self, review_id: &str) -> Result<Option<Review>, StoreError>;

    /// Merge-apply a partial update; fields absent from the patch are left
    /// untouched.
    async fn merge_review(&self, review_id: &str, patch: ReviewPatch) -> Result<(), StoreError>;

    /// Record one approved image via `apply_processed_image`, returning the
    /// review as committed.
    ///
    /// Implementations must run the read-modify-write atomically (a
    /// transaction or compare-and-swap retry loop), so that concurrent
    /// uploads for the same review cannot drop each other's entries.
    async fn append_processed_image(
        &self,
        review_id: &str,
        image: ProcessedImage,
    ) -> Result<Review, StoreError>;

    /// Every review owned by the user, for the ban cleanup sweep.
    async fn reviews_by_user(&self, user_id: &str) -> Result<Vec<Review>, StoreError>;
}

/// Port for the user documents.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    /// Merge-apply a partial update, creating the document when absent.
    async fn merge_user(&self, user_id: &str, patch: UserPatch) -> Result<(), StoreError>;
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Terminal state of one upload run through the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Not a review image - nothing touched.
    Ignored,
    /// No review to attach the image to; the object was deleted.
    OrphanDeleted { review_id: String },
    /// Author is banned; review rejected and hidden, object deleted. The
    /// infraction ledger is deliberately not involved here.
    RejectedBannedAuthor { review_id: String },
    /// Classifier turned the image down; rejection plus ledger bookkeeping.
    RejectedContent { review_id: String, details: String },
    /// Image accepted and appended; `approved` once enough images landed.
    Accepted {
        review_id: String,
        processed: usize,
        expected: usize,
        approved: bool,
    },
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Per-upload moderation pipeline over injected store and classifier ports.
pub struct ModerationPipeline<R, U, O, C, N, I>
where
    R: ReviewStore,
    U: UserStore,
    O: ObjectStore,
    C: ImageClassifier,
    N: NoticeStore,
    I: IpBanStore,
{
    reviews: R,
    users: U,
    objects: O,
    classification: ClassificationService<C>,
    ledger: NoticeLedger<N, U, I>,
}

impl<R, U, O, C, N, I> ModerationPipeline<R, U, O, C, N, I>
where
    R: ReviewStore,
    U: UserStore,
    O: ObjectStore,
    C: ImageClassifier,
    N: NoticeStore,
    I: IpBanStore,
{
    pub fn new(
        reviews: R,
        users: U,
        objects: O,
        classification: ClassificationService<C>,
        ledger: NoticeLedger<N, U, I>,
    ) -> Self {
        Self {
            reviews,
            users,
            objects,
            classification,
            ledger,
        }
    }

    /// Run one finalized upload through the moderation state machine.
    pub async fn process_upload(
        &self,
        object: &ObjectRef,
    ) -> Result<UploadOutcome, ModerationError> {
        // 1. Only review images are this pipeline's concern.
        let review_id = match review_id_from_path(&object.path) {
            Some(id) => id.to_string(),
            None => {
                if object.path.starts_with(&format!("{REVIEW_IMAGE_NAMESPACE}/")) {
                    tracing::warn!(
                        path = %object.path,
                        "Could not determine the review for an uploaded image"
                    );
                }
                return Ok(UploadOutcome::Ignored);
            }
        };

        // 2. Orphaned upload: nothing to attach it to.
        let Some(review) = self.reviews.get_review(&review_id).await? else {
            tracing::warn!(
                path = %object.path,
                review_id = %review_id,
                "Review missing for uploaded image, deleting file"
            );
            self.objects.delete(&object.path, true).await?;
            return Ok(UploadOutcome::OrphanDeleted { review_id });
        };

        // 3. Banned authors publish nothing. A failed lookup is logged and
        // treated as not-banned; classification still gates the content.
        if self.author_is_banned(&review).await {
            tracing::warn!(
                review_id = %review_id,
                user_id = review.user_id.as_deref().unwrap_or(""),
                "Image blocked for a banned account"
            );
            self.objects.delete(&object.path, true).await?;
            self.reviews
                .merge_review(
                    &review_id,
                    ReviewPatch::rejection(BANNED_ACCOUNT_MESSAGE, Utc::now()),
                )
                .await?;
            return Ok(UploadOutcome::RejectedBannedAuthor { review_id });
        }

        // 4. Ask the classifier.
        let verdict = self.classification.moderate(object).await;

        // 5. Rejection: drop the object, hide the review, feed the ledger.
        if !verdict.approved {
            self.objects.delete(&object.path, true).await?;
            self.reviews
                .merge_review(
                    &review_id,
                    ReviewPatch::rejection(INAPPROPRIATE_IMAGE_REASON, Utc::now()),
                )
                .await?;

            let infraction = self
                .ledger
                .record_image_infraction(review.user_id.as_deref(), &review_id)
                .await?;
            if let InfractionOutcome::AutoBanned { active } = infraction {
                tracing::warn!(
                    review_id = %review_id,
                    active,
                    "Rejection pushed the author over the ban threshold"
                );
            }
            self.ledger
                .record_ip_infraction(review.creation_ip.as_deref())
                .await?;

            return Ok(UploadOutcome::RejectedContent {
                review_id,
                details: verdict.details,
            });
        }

        // 6. Approval: append atomically and recompute the review state.
        let image = ProcessedImage {
            url: public_object_url(&object.bucket, &object.path),
            path: object.path.clone(),
            moderation_detail: Some(verdict.details),
            processed_at: Utc::now(),
        };
        let review = self
            .reviews
            .append_processed_image(&review_id, image)
            .await?;

        let processed = review.processed_images.len();
        let expected = review.expected_images();
        let approved = review.status == ReviewStatus::Approved;
        if approved {
            tracing::info!(
                review_id = %review_id,
                "Review approved automatically after moderation"
            );
        }

        Ok(UploadOutcome::Accepted {
            review_id,
            processed,
            expected,
            approved,
        })
    }

    async fn author_is_banned(&self, review: &Review) -> bool {
        let Some(user_id) = review.user_id.as_deref().filter(|id| !id.is_empty()) else {
            return false;
        };
        match self.users.get_user(user_id).await {
            Ok(user) => user.map(|u| u.banned).unwrap_or(false),
            Err(err) => {
                tracing::error!(user_id, "Could not verify the author's ban state: {err}");
                false
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
