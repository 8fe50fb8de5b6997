// HTTP ingress for the push-delivered events.
//
// A 2xx acknowledges the event; a 5xx asks the at-least-once source to
// redeliver. Outcomes themselves are only logged - every observable effect
// of an invocation lives in the document and object stores.

use super::events::{StorageObjectEvent, UserUpdateEvent};
use crate::core::cleanup::BanCleanupService;
use crate::core::moderation::ModerationPipeline;
use crate::core::storage::ObjectRef;
use crate::infra::firestore::{
    FirestoreIpBanStore, FirestoreNoticeStore, FirestoreReviewStore, FirestoreUserStore,
};
use crate::infra::storage::GcsObjectStore;
use crate::infra::vision::SafeSearchClient;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::Arc;

pub type Pipeline = ModerationPipeline<
    FirestoreReviewStore,
    FirestoreUserStore,
    GcsObjectStore,
    SafeSearchClient,
    FirestoreNoticeStore,
    FirestoreIpBanStore,
>;

pub type Cleanup = BanCleanupService<FirestoreReviewStore, GcsObjectStore, FirestoreNoticeStore>;

/// Shared handler state, wired together in main.
pub struct TriggerContext {
    pub pipeline: Arc<Pipeline>,
    pub cleanup: Arc<Cleanup>,
}

pub fn router(context: Arc<TriggerContext>) -> Router {
    Router::new()
        .route("/hooks/storage/finalized", post(storage_object_finalized))
        .route("/hooks/users/updated", post(user_document_updated))
        .with_state(context)
}

async fn storage_object_finalized(
    State(context): State<Arc<TriggerContext>>,
    Json(event): Json<StorageObjectEvent>,
) -> StatusCode {
    let object = ObjectRef::new(event.bucket, event.name);
    match context.pipeline.process_upload(&object).await {
        Ok(outcome) => {
            tracing::info!(path = %object.path, outcome = ?outcome, "Upload processed");
            StatusCode::NO_CONTENT
        }
        Err(err) => {
            tracing::error!(path = %object.path, "Upload processing failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn user_document_updated(
    State(context): State<Arc<TriggerContext>>,
    Json(event): Json<UserUpdateEvent>,
) -> StatusCode {
    match context
        .cleanup
        .handle_user_update(&event.user_id, event.before.as_ref(), &event.after)
        .await
    {
        Ok(outcome) => {
            tracing::info!(user_id = %event.user_id, outcome = ?outcome, "User update processed");
            StatusCode::NO_CONTENT
        }
        Err(err) => {
            tracing::error!(user_id = %event.user_id, "Ban cleanup failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
