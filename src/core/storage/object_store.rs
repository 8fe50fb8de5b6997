// Object storage port and path conventions for uploaded review images.
//
// Review images are uploaded under `resenas/<reviewId>/...`; everything else
// in the bucket is none of this subsystem's business.

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;

/// Storage path prefix that marks an object as a review image.
pub const REVIEW_IMAGE_NAMESPACE: &str = "resenas";

/// Characters left bare when building public URLs, one path segment at a
/// time. Mirrors what `encodeURIComponent` leaves untouched so URLs stay
/// byte-identical to the ones the front end already links.
const SEGMENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'!')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("object storage error: {0}")]
    Backend(String),
}

/// A reference to one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub path: String,
}

impl ObjectRef {
    pub fn new(bucket: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            path: path.into(),
        }
    }

    /// `gs://bucket/path` form, as consumed by the Vision API.
    pub fn gs_uri(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.path)
    }
}

/// Port to the object store holding uploaded review images.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store operates on.
    fn bucket(&self) -> &str;

    /// Delete one object. With `ignore_missing`, an already-gone object is
    /// not an error (uploads race their own cleanup often enough).
    async fn delete(&self, path: &str, ignore_missing: bool) -> Result<(), ObjectStoreError>;
}

/// Extract the owning review id from an upload path.
///
/// Returns `None` for anything outside the review-image namespace or with an
/// empty id segment.
pub fn review_id_from_path(path: &str) -> Option<&str> {
    let rest = path.strip_prefix(REVIEW_IMAGE_NAMESPACE)?.strip_prefix('/')?;
    let id = rest.split('/').next().unwrap_or("");
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}

/// Public download URL for an object, with each path segment percent-encoded.
pub fn public_object_url(bucket: &str, path: &str) -> String {
    let encoded: Vec<String> = path
        .split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT_SET).to_string())
        .collect();
    format!(
        "https://storage.googleapis.com/{}/{}",
        bucket,
        encoded.join("/")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_review_id_from_namespace_path() {
        assert_eq!(
            review_id_from_path("resenas/abc123/foto.jpg"),
            Some("abc123")
        );
        assert_eq!(review_id_from_path("resenas/abc123"), Some("abc123"));
    }

    #[test]
    fn rejects_paths_outside_namespace() {
        assert_eq!(review_id_from_path("avatares/abc123/foto.jpg"), None);
        assert_eq!(review_id_from_path("resenas"), None);
        assert_eq!(review_id_from_path("resenas/"), None);
        assert_eq!(review_id_from_path("resenasx/abc/foto.jpg"), None);
    }

    #[test]
    fn public_url_encodes_each_segment() {
        let url = public_object_url("mi-bucket", "resenas/abc 123/foto maña.jpg");
        assert_eq!(
            url,
            "https://storage.googleapis.com/mi-bucket/resenas/abc%20123/foto%20ma%C3%B1a.jpg"
        );
    }

    #[test]
    fn public_url_keeps_unreserved_characters() {
        let url = public_object_url("b", "resenas/a-b_c.d~e/f(1)!.jpg");
        assert_eq!(
            url,
            "https://storage.googleapis.com/b/resenas/a-b_c.d~e/f(1)!.jpg"
        );
    }

    #[test]
    fn gs_uri_form() {
        let object = ObjectRef::new("bucket", "resenas/r1/img.png");
        assert_eq!(object.gs_uri(), "gs://bucket/resenas/r1/img.png");
    }
}
