// Moderation domain models.
//
// These mirror the documents the review app already stores, so every field
// serde-renames to the existing (Spanish) wire name. Mutations go through
// explicit patch types applied with merge semantics - nothing here ever
// overwrites a whole document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rejection text for reviews owned by a banned account.
pub const BANNED_ACCOUNT_MESSAGE: &str = "Cuenta baneada. Esta reseña no se publicará.";

/// Rejection reason code for images the classifier turned down.
pub const INAPPROPRIATE_IMAGE_REASON: &str = "imagen_inapropiada";

/// Review lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReviewStatus {
    #[default]
    #[serde(rename = "pendiente_revision")]
    PendingReview,
    #[serde(rename = "aprobada")]
    Approved,
    #[serde(rename = "rechazada")]
    Rejected,
}

/// One image that made it through moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedImage {
    pub url: String,
    pub path: String,
    #[serde(rename = "moderacion")]
    pub moderation_detail: Option<String>,
    #[serde(rename = "procesadaEn")]
    pub processed_at: DateTime<Utc>,
}

/// A user-submitted review with its moderation state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
    pub id: String,
    #[serde(rename = "usuarioId")]
    pub user_id: Option<String>,
    #[serde(rename = "estado")]
    pub status: ReviewStatus,
    #[serde(rename = "motivoRechazo")]
    pub rejection_reason: Option<String>,
    #[serde(rename = "visibleParaAutor")]
    pub visible_to_author: Option<bool>,
    #[serde(rename = "imagenesProcesadas")]
    pub processed_images: Vec<ProcessedImage>,
    /// Flat URL projection of `processed_images`, kept for the front end.
    /// Older documents may still carry raw storage paths in here.
    #[serde(rename = "imagenes")]
    pub image_urls: Vec<String>,
    /// Legacy list of raw storage paths written before moderation ran.
    #[serde(rename = "imagenesPendientes")]
    pub pending_image_paths: Vec<String>,
    #[serde(rename = "numImagenes")]
    pub num_images: Option<u32>,
    #[serde(rename = "totalImagenes")]
    pub total_images: Option<u32>,
    #[serde(rename = "ipCreacion")]
    pub creation_ip: Option<String>,
}

impl Review {
    /// How many images this review is waiting for. `numImagenes` wins over
    /// the legacy `totalImagenes`; zero and absent both mean one.
    pub fn expected_images(&self) -> usize {
        self.num_images
            .filter(|n| *n > 0)
            .or(self.total_images.filter(|n| *n > 0))
            .unwrap_or(1) as usize
    }
}

/// Partial update for a review document. `None` fields are left untouched
/// by the store adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPatch {
    pub status: Option<ReviewStatus>,
    pub rejection_reason: Option<String>,
    pub visible_to_author: Option<bool>,
    pub processed_images: Option<Vec<ProcessedImage>>,
    pub image_urls: Option<Vec<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReviewPatch {
    /// Patch that rejects a review and hides it from its author.
    pub fn rejection(reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(ReviewStatus::Rejected),
            rejection_reason: Some(reason.into()),
            visible_to_author: Some(false),
            updated_at: Some(now),
            ..Self::default()
        }
    }

    /// Apply this patch to an owned review, field by field.
    pub fn apply(&self, review: &mut Review) {
        if let Some(status) = self.status {
            review.status = status;
        }
        if let Some(reason) = &self.rejection_reason {
            review.rejection_reason = Some(reason.clone());
        }
        if let Some(visible) = self.visible_to_author {
            review.visible_to_author = Some(visible);
        }
        if let Some(images) = &self.processed_images {
            review.processed_images = images.clone();
        }
        if let Some(urls) = &self.image_urls {
            review.image_urls = urls.clone();
        }
    }
}

/// Compute the patch that records one approved image.
///
/// Returns `None` when the path was already appended - redelivered upload
/// events must not duplicate entries. The recompute keeps arrival order,
/// flips the review to approved once enough images landed, and refreshes
/// the flat URL projection. An already-approved review never regresses to
/// pending.
pub fn apply_processed_image(review: &Review, image: ProcessedImage) -> Option<ReviewPatch> {
    if review
        .processed_images
        .iter()
        .any(|existing| existing.path == image.path)
    {
        return None;
    }

    let mut processed = review.processed_images.clone();
    processed.push(image);

    let status = if review.status == ReviewStatus::Approved
        || processed.len() >= review.expected_images()
    {
        ReviewStatus::Approved
    } else {
        ReviewStatus::PendingReview
    };
    let image_urls: Vec<String> = processed.iter().map(|img| img.url.clone()).collect();

    Some(ReviewPatch {
        status: Some(status),
        processed_images: Some(processed),
        image_urls: Some(image_urls),
        ..ReviewPatch::default()
    })
}

/// A user account as seen by moderation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    pub id: String,
    #[serde(rename = "baneado")]
    pub banned: bool,
    #[serde(rename = "baneadoDesde")]
    pub banned_since: Option<DateTime<Utc>>,
    #[serde(rename = "motivoBaneo")]
    pub ban_reason: Option<String>,
}

/// Partial update for a user document. The ban flag is monotonic: nothing
/// in this subsystem ever writes `banned = false`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserPatch {
    pub banned: Option<bool>,
    pub banned_since: Option<DateTime<Utc>>,
}

impl UserPatch {
    pub fn ban(now: DateTime<Utc>) -> Self {
        Self {
            banned: Some(true),
            banned_since: Some(now),
        }
    }

    pub fn apply(&self, user: &mut User) {
        if let Some(banned) = self.banned {
            user.banned = banned;
        }
        if let Some(since) = self.banned_since {
            user.banned_since = Some(since);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(path: &str) -> ProcessedImage {
        ProcessedImage {
            url: format!("https://storage.googleapis.com/b/{path}"),
            path: path.to_string(),
            moderation_detail: None,
            processed_at: Utc::now(),
        }
    }

    #[test]
    fn expected_images_defaults_to_one() {
        assert_eq!(Review::default().expected_images(), 1);
        let zero = Review {
            num_images: Some(0),
            ..Review::default()
        };
        assert_eq!(zero.expected_images(), 1);
    }

    #[test]
    fn expected_images_prefers_num_over_legacy_total() {
        let review = Review {
            num_images: Some(3),
            total_images: Some(7),
            ..Review::default()
        };
        assert_eq!(review.expected_images(), 3);
        let legacy = Review {
            total_images: Some(2),
            ..Review::default()
        };
        assert_eq!(legacy.expected_images(), 2);
    }

    #[test]
    fn first_of_two_images_stays_pending() {
        let review = Review {
            num_images: Some(2),
            ..Review::default()
        };
        let patch = apply_processed_image(&review, image("resenas/r1/a.jpg")).unwrap();
        assert_eq!(patch.status, Some(ReviewStatus::PendingReview));
        assert_eq!(patch.processed_images.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn final_image_approves_and_projects_urls() {
        let mut review = Review {
            num_images: Some(2),
            ..Review::default()
        };
        let first = apply_processed_image(&review, image("resenas/r1/a.jpg")).unwrap();
        first.apply(&mut review);

        let second = apply_processed_image(&review, image("resenas/r1/b.jpg")).unwrap();
        assert_eq!(second.status, Some(ReviewStatus::Approved));
        let urls = second.image_urls.unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls[0].ends_with("a.jpg"));
        assert!(urls[1].ends_with("b.jpg"));
    }

    #[test]
    fn duplicate_path_is_not_appended_twice() {
        let mut review = Review::default();
        let patch = apply_processed_image(&review, image("resenas/r1/a.jpg")).unwrap();
        patch.apply(&mut review);
        assert!(apply_processed_image(&review, image("resenas/r1/a.jpg")).is_none());
    }

    #[test]
    fn rejection_patch_hides_the_review() {
        let mut review = Review {
            visible_to_author: Some(true),
            user_id: Some("u1".to_string()),
            ..Review::default()
        };
        ReviewPatch::rejection(BANNED_ACCOUNT_MESSAGE, Utc::now()).apply(&mut review);
        assert_eq!(review.status, ReviewStatus::Rejected);
        assert_eq!(review.visible_to_author, Some(false));
        assert_eq!(
            review.rejection_reason.as_deref(),
            Some(BANNED_ACCOUNT_MESSAGE)
        );
        // merge semantics: unrelated fields survive
        assert_eq!(review.user_id.as_deref(), Some("u1"));
    }
}
