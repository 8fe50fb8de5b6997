// Firestore implementations of the core store traits.
//
// Collection and field names match the documents the review app already
// stores; the mapping to and from `FsValue` is kept in pure helpers so it
// can be tested without a network.

use super::document::{Document, Fields, FsValue};
use super::firestore_client::{FirestoreClient, FirestoreError};
use crate::core::moderation::{
    apply_processed_image, ProcessedImage, Review, ReviewPatch, ReviewStatus, ReviewStore,
    StoreError, User, UserPatch, UserStore,
};
use crate::core::notices::{BannedIp, IpBanStore, Notice, NoticeKind, NoticeStore};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::json;

const REVIEWS: &str = "resenas";
const USERS: &str = "usuarios";
const NOTICES: &str = "avisos";
const BANNED_IPS: &str = "ipsBaneadas";

/// Attempts before giving up on the guarded append.
const APPEND_MAX_ATTEMPTS: u32 = 5;

fn store_err(err: FirestoreError) -> StoreError {
    StoreError::Backend(err.to_string())
}

// ============================================================================
// FIELD MAPPING
// ============================================================================

fn status_str(status: ReviewStatus) -> &'static str {
    match status {
        ReviewStatus::PendingReview => "pendiente_revision",
        ReviewStatus::Approved => "aprobada",
        ReviewStatus::Rejected => "rechazada",
    }
}

fn parse_status(raw: &str) -> ReviewStatus {
    match raw {
        "aprobada" => ReviewStatus::Approved,
        "rechazada" => ReviewStatus::Rejected,
        _ => ReviewStatus::PendingReview,
    }
}

fn kind_str(kind: NoticeKind) -> &'static str {
    match kind {
        NoticeKind::InappropriateImage => "imagen_inadecuada",
        NoticeKind::UserBanned => "baneo_usuario",
    }
}

fn opt_string(fields: &Fields, name: &str) -> Option<String> {
    fields
        .get(name)
        .and_then(FsValue::as_str)
        .map(str::to_string)
}

fn string_list(fields: &Fields, name: &str) -> Vec<String> {
    fields
        .get(name)
        .map(|value| {
            value
                .as_array()
                .iter()
                .filter_map(|entry| entry.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn encode_processed_image(image: &ProcessedImage) -> FsValue {
    let mut fields = Fields::new();
    fields.insert("url".to_string(), FsValue::string(&image.url));
    fields.insert("path".to_string(), FsValue::string(&image.path));
    fields.insert(
        "moderacion".to_string(),
        match &image.moderation_detail {
            Some(detail) => FsValue::string(detail),
            None => FsValue::null(),
        },
    );
    fields.insert(
        "procesadaEn".to_string(),
        FsValue::timestamp(image.processed_at),
    );
    FsValue::map(fields)
}

fn decode_processed_image(value: &FsValue) -> Option<ProcessedImage> {
    let fields = value.as_map()?;
    Some(ProcessedImage {
        url: opt_string(fields, "url").unwrap_or_default(),
        path: opt_string(fields, "path").unwrap_or_default(),
        moderation_detail: opt_string(fields, "moderacion"),
        processed_at: fields
            .get("procesadaEn")
            .and_then(FsValue::as_timestamp)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
    })
}

fn decode_review(document: &Document) -> Review {
    let fields = &document.fields;
    Review {
        id: document.id().to_string(),
        user_id: opt_string(fields, "usuarioId"),
        status: fields
            .get("estado")
            .and_then(FsValue::as_str)
            .map(parse_status)
            .unwrap_or_default(),
        rejection_reason: opt_string(fields, "motivoRechazo"),
        visible_to_author: fields.get("visibleParaAutor").and_then(FsValue::as_bool),
        processed_images: fields
            .get("imagenesProcesadas")
            .map(|value| {
                value
                    .as_array()
                    .iter()
                    .filter_map(decode_processed_image)
                    .collect()
            })
            .unwrap_or_default(),
        image_urls: string_list(fields, "imagenes"),
        pending_image_paths: string_list(fields, "imagenesPendientes"),
        num_images: fields
            .get("numImagenes")
            .and_then(FsValue::as_i64)
            .map(|n| n.max(0) as u32),
        total_images: fields
            .get("totalImagenes")
            .and_then(FsValue::as_i64)
            .map(|n| n.max(0) as u32),
        creation_ip: opt_string(fields, "ipCreacion"),
    }
}

fn encode_review_patch(patch: &ReviewPatch) -> (Fields, Vec<String>) {
    let mut fields = Fields::new();
    let mut mask = Vec::new();

    if let Some(status) = patch.status {
        fields.insert("estado".to_string(), FsValue::string(status_str(status)));
        mask.push("estado".to_string());
    }
    if let Some(reason) = &patch.rejection_reason {
        fields.insert("motivoRechazo".to_string(), FsValue::string(reason));
        mask.push("motivoRechazo".to_string());
    }
    if let Some(visible) = patch.visible_to_author {
        fields.insert("visibleParaAutor".to_string(), FsValue::boolean(visible));
        mask.push("visibleParaAutor".to_string());
    }
    if let Some(images) = &patch.processed_images {
        fields.insert(
            "imagenesProcesadas".to_string(),
            FsValue::array(images.iter().map(encode_processed_image).collect()),
        );
        mask.push("imagenesProcesadas".to_string());
    }
    if let Some(urls) = &patch.image_urls {
        fields.insert(
            "imagenes".to_string(),
            FsValue::array(urls.iter().map(FsValue::string).collect()),
        );
        mask.push("imagenes".to_string());
    }
    if let Some(stamp) = patch.updated_at {
        fields.insert("actualizado".to_string(), FsValue::timestamp(stamp));
        mask.push("actualizado".to_string());
    }

    (fields, mask)
}

fn decode_user(document: &Document) -> User {
    let fields = &document.fields;
    User {
        id: document.id().to_string(),
        banned: fields
            .get("baneado")
            .and_then(FsValue::as_bool)
            .unwrap_or(false),
        banned_since: fields.get("baneadoDesde").and_then(FsValue::as_timestamp),
        ban_reason: opt_string(fields, "motivoBaneo"),
    }
}

fn encode_user_patch(patch: &UserPatch) -> (Fields, Vec<String>) {
    let mut fields = Fields::new();
    let mut mask = Vec::new();

    if let Some(banned) = patch.banned {
        fields.insert("baneado".to_string(), FsValue::boolean(banned));
        mask.push("baneado".to_string());
    }
    if let Some(since) = patch.banned_since {
        fields.insert("baneadoDesde".to_string(), FsValue::timestamp(since));
        mask.push("baneadoDesde".to_string());
    }

    (fields, mask)
}

fn encode_notice(notice: &Notice) -> Fields {
    let mut fields = Fields::new();
    fields.insert("usuarioId".to_string(), FsValue::string(&notice.user_id));
    fields.insert("tipo".to_string(), FsValue::string(kind_str(notice.kind)));
    fields.insert("motivo".to_string(), FsValue::string(&notice.reason));
    fields.insert(
        "resenaId".to_string(),
        match &notice.review_id {
            Some(review_id) => FsValue::string(review_id),
            None => FsValue::null(),
        },
    );
    fields.insert("fecha".to_string(), FsValue::timestamp(notice.created_at));
    fields.insert(
        "expiraEn".to_string(),
        FsValue::timestamp(notice.expires_at),
    );
    fields.insert("estado".to_string(), FsValue::string(&notice.state));
    fields
}

fn encode_banned_ip(record: &BannedIp) -> Fields {
    let mut fields = Fields::new();
    fields.insert("ip".to_string(), FsValue::string(&record.ip));
    fields.insert(
        "baneadaDesde".to_string(),
        FsValue::timestamp(record.banned_since),
    );
    fields
}

fn rfc3339(stamp: DateTime<Utc>) -> String {
    stamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ============================================================================
// STORES
// ============================================================================

#[derive(Clone)]
pub struct FirestoreReviewStore {
    client: FirestoreClient,
}

impl FirestoreReviewStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReviewStore for FirestoreReviewStore {
    async fn get_review(&self, review_id: &str) -> Result<Option<Review>, StoreError> {
        let document = self
            .client
            .get_document(REVIEWS, review_id)
            .await
            .map_err(store_err)?;
        Ok(document.as_ref().map(decode_review))
    }

    async fn merge_review(&self, review_id: &str, patch: ReviewPatch) -> Result<(), StoreError> {
        let (fields, mask) = encode_review_patch(&patch);
        if mask.is_empty() {
            return Ok(());
        }
        self.client
            .patch_merge(REVIEWS, review_id, fields, &mask)
            .await
            .map(|_| ())
            .map_err(store_err)
    }

    async fn append_processed_image(
        &self,
        review_id: &str,
        image: ProcessedImage,
    ) -> Result<Review, StoreError> {
        // Compare-and-swap loop: reread, recompute, commit against the
        // document's update time. Losing the race just means another image
        // for the same review landed first.
        for attempt in 0..APPEND_MAX_ATTEMPTS {
            let document = self
                .client
                .get_document(REVIEWS, review_id)
                .await
                .map_err(store_err)?
                .ok_or_else(|| StoreError::NotFound(format!("{REVIEWS}/{review_id}")))?;
            let review = decode_review(&document);

            let Some(patch) = apply_processed_image(&review, image.clone()) else {
                return Ok(review);
            };
            let (fields, mask) = encode_review_patch(&patch);

            let write = match document.update_time.as_deref() {
                Some(stamp) => {
                    self.client
                        .patch_guarded(REVIEWS, review_id, fields, &mask, stamp)
                        .await
                }
                None => self.client.patch_merge(REVIEWS, review_id, fields, &mask).await,
            };

            match write {
                Ok(_) => {
                    let mut committed = review;
                    patch.apply(&mut committed);
                    return Ok(committed);
                }
                Err(FirestoreError::Conflict) => {
                    tracing::debug!(review_id, attempt, "Lost the review append race, retrying");
                    continue;
                }
                Err(err) => return Err(store_err(err)),
            }
        }

        Err(StoreError::Backend(format!(
            "append to {REVIEWS}/{review_id} kept losing the update race"
        )))
    }

    async fn reviews_by_user(&self, user_id: &str) -> Result<Vec<Review>, StoreError> {
        let documents = self
            .client
            .run_query(json!({
                "from": [{"collectionId": REVIEWS}],
                "where": {
                    "fieldFilter": {
                        "field": {"fieldPath": "usuarioId"},
                        "op": "EQUAL",
                        "value": {"stringValue": user_id}
                    }
                }
            }))
            .await
            .map_err(store_err)?;
        Ok(documents.iter().map(decode_review).collect())
    }
}

#[derive(Clone)]
pub struct FirestoreUserStore {
    client: FirestoreClient,
}

impl FirestoreUserStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let document = self
            .client
            .get_document(USERS, user_id)
            .await
            .map_err(store_err)?;
        Ok(document.as_ref().map(decode_user))
    }

    async fn merge_user(&self, user_id: &str, patch: UserPatch) -> Result<(), StoreError> {
        let (fields, mask) = encode_user_patch(&patch);
        if mask.is_empty() {
            return Ok(());
        }
        self.client
            .patch_merge(USERS, user_id, fields, &mask)
            .await
            .map(|_| ())
            .map_err(store_err)
    }
}

#[derive(Clone)]
pub struct FirestoreNoticeStore {
    client: FirestoreClient,
}

impl FirestoreNoticeStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NoticeStore for FirestoreNoticeStore {
    async fn add_notice(&self, notice: &Notice) -> Result<String, StoreError> {
        let document = self
            .client
            .create_document(NOTICES, encode_notice(notice))
            .await
            .map_err(store_err)?;
        Ok(document.id().to_string())
    }

    async fn count_active_notices(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let documents = self
            .client
            .run_query(json!({
                "from": [{"collectionId": NOTICES}],
                "where": {
                    "compositeFilter": {
                        "op": "AND",
                        "filters": [
                            {
                                "fieldFilter": {
                                    "field": {"fieldPath": "usuarioId"},
                                    "op": "EQUAL",
                                    "value": {"stringValue": user_id}
                                }
                            },
                            {
                                "fieldFilter": {
                                    "field": {"fieldPath": "expiraEn"},
                                    "op": "GREATER_THAN",
                                    "value": {"timestampValue": rfc3339(now)}
                                }
                            }
                        ]
                    }
                }
            }))
            .await
            .map_err(store_err)?;
        Ok(documents.len())
    }
}

#[derive(Clone)]
pub struct FirestoreIpBanStore {
    client: FirestoreClient,
}

impl FirestoreIpBanStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IpBanStore for FirestoreIpBanStore {
    async fn upsert_banned_ip(&self, doc_id: &str, record: &BannedIp) -> Result<(), StoreError> {
        let mask = vec!["ip".to_string(), "baneadaDesde".to_string()];
        self.client
            .patch_merge(BANNED_IPS, doc_id, encode_banned_ip(record), &mask)
            .await
            .map(|_| ())
            .map_err(store_err)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn review_document() -> Document {
        serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/resenas/r1",
            "fields": {
                "usuarioId": {"stringValue": "u1"},
                "estado": {"stringValue": "pendiente_revision"},
                "numImagenes": {"integerValue": "2"},
                "ipCreacion": {"stringValue": "10.0.0.7"},
                "imagenesPendientes": {"arrayValue": {"values": [
                    {"stringValue": "resenas/r1/pend.jpg"}
                ]}},
                "imagenesProcesadas": {"arrayValue": {"values": [
                    {"mapValue": {"fields": {
                        "url": {"stringValue": "https://storage.googleapis.com/b/resenas/r1/a.jpg"},
                        "path": {"stringValue": "resenas/r1/a.jpg"},
                        "moderacion": {"nullValue": null},
                        "procesadaEn": {"timestampValue": "2024-05-01T10:00:00Z"}
                    }}}
                ]}}
            },
            "updateTime": "2024-05-01T10:00:01.000000Z"
        }))
        .unwrap()
    }

    #[test]
    fn decodes_a_review_document() {
        let review = decode_review(&review_document());
        assert_eq!(review.id, "r1");
        assert_eq!(review.user_id.as_deref(), Some("u1"));
        assert_eq!(review.status, ReviewStatus::PendingReview);
        assert_eq!(review.expected_images(), 2);
        assert_eq!(review.creation_ip.as_deref(), Some("10.0.0.7"));
        assert_eq!(review.pending_image_paths, vec!["resenas/r1/pend.jpg"]);
        assert_eq!(review.processed_images.len(), 1);
        assert_eq!(review.processed_images[0].path, "resenas/r1/a.jpg");
        assert_eq!(review.processed_images[0].moderation_detail, None);
    }

    #[test]
    fn rejection_patch_masks_exactly_its_fields() {
        let patch = ReviewPatch::rejection("imagen_inapropiada", Utc::now());
        let (fields, mask) = encode_review_patch(&patch);

        assert_eq!(
            mask,
            vec!["estado", "motivoRechazo", "visibleParaAutor", "actualizado"]
        );
        assert_eq!(
            fields.get("estado").and_then(FsValue::as_str),
            Some("rechazada")
        );
        assert_eq!(
            fields.get("visibleParaAutor").and_then(FsValue::as_bool),
            Some(false)
        );
        assert!(!fields.contains_key("imagenesProcesadas"));
    }

    #[test]
    fn append_patch_roundtrips_through_the_wire_encoding() {
        let review = decode_review(&review_document());
        let image = ProcessedImage {
            url: "https://storage.googleapis.com/b/resenas/r1/b.jpg".to_string(),
            path: "resenas/r1/b.jpg".to_string(),
            moderation_detail: Some("Imagen verificada por SafeSearch".to_string()),
            processed_at: Utc::now(),
        };

        let patch = apply_processed_image(&review, image).unwrap();
        let (fields, mask) = encode_review_patch(&patch);

        assert!(mask.contains(&"imagenesProcesadas".to_string()));
        assert!(mask.contains(&"imagenes".to_string()));
        assert_eq!(
            fields.get("estado").and_then(FsValue::as_str),
            Some("aprobada")
        );
        let encoded = fields.get("imagenesProcesadas").unwrap().as_array();
        assert_eq!(encoded.len(), 2);
        let reparsed = decode_processed_image(&encoded[1]).unwrap();
        assert_eq!(reparsed.path, "resenas/r1/b.jpg");
    }

    #[test]
    fn notice_without_review_writes_an_explicit_null() {
        let notice = Notice::user_ban("u1", None, Utc::now());
        let fields = encode_notice(&notice);

        assert_eq!(
            fields.get("tipo").and_then(FsValue::as_str),
            Some("baneo_usuario")
        );
        assert!(fields.get("resenaId").unwrap().null_value.is_some());
        assert_eq!(
            fields.get("estado").and_then(FsValue::as_str),
            Some("activo")
        );
    }

    #[test]
    fn user_ban_patch_covers_only_the_ban_fields() {
        let (fields, mask) = encode_user_patch(&UserPatch::ban(Utc::now()));
        assert_eq!(mask, vec!["baneado", "baneadoDesde"]);
        assert_eq!(
            fields.get("baneado").and_then(FsValue::as_bool),
            Some(true)
        );
    }
}
