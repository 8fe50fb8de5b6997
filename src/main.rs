// This is the entry point of the review moderation service.
//
// **Architecture Overview:**
// - `core/` = Business logic (store- and provider-agnostic)
// - `infra/` = Implementations of core traits (Google REST APIs, in-memory)
// - `triggers/` = Event ingress calling into the core services
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Serve the trigger endpoints

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "triggers/trigger_layer.rs"]
mod triggers;

use crate::core::classification::{ClassificationService, FailurePolicy};
use crate::core::cleanup::BanCleanupService;
use crate::core::moderation::ModerationPipeline;
use crate::core::notices::NoticeLedger;
use crate::infra::firestore::{
    FirestoreClient, FirestoreIpBanStore, FirestoreNoticeStore, FirestoreReviewStore,
    FirestoreUserStore,
};
use crate::infra::google::{ServiceAccountAuth, CLOUD_PLATFORM_SCOPE};
use crate::infra::storage::GcsObjectStore;
use crate::infra::vision::SafeSearchClient;
use crate::triggers::http::{router, TriggerContext};
use anyhow::Context;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let project_id = std::env::var("FIRESTORE_PROJECT_ID")
        .expect("Missing FIRESTORE_PROJECT_ID environment variable!");
    let bucket =
        std::env::var("STORAGE_BUCKET").expect("Missing STORAGE_BUCKET environment variable!");
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(8080);

    // Fail-closed unless explicitly configured otherwise.
    let fail_policy = match std::env::var("MODERATION_FAIL_POLICY").as_deref() {
        Ok("open") => FailurePolicy::FailOpen,
        _ => FailurePolicy::FailClosed,
    };

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let auth = ServiceAccountAuth::from_env(CLOUD_PLATFORM_SCOPE)
        .await
        .map_err(|err| anyhow::anyhow!("Failed to load Google service account credentials: {err}"))?;
    let firestore = FirestoreClient::new(auth.clone(), project_id);

    let reviews = FirestoreReviewStore::new(firestore.clone());
    let users = FirestoreUserStore::new(firestore.clone());
    let notices = FirestoreNoticeStore::new(firestore.clone());
    let ip_bans = FirestoreIpBanStore::new(firestore);
    let objects = GcsObjectStore::new(auth.clone(), bucket);

    let classification = ClassificationService::new(SafeSearchClient::new(auth), fail_policy);
    let ledger = NoticeLedger::new(notices.clone(), users.clone(), ip_bans);

    let pipeline = Arc::new(ModerationPipeline::new(
        reviews.clone(),
        users,
        objects.clone(),
        classification,
        ledger,
    ));
    let cleanup = Arc::new(BanCleanupService::new(reviews, objects, notices));

    let context = Arc::new(TriggerContext { pipeline, cleanup });

    // ========================================================================
    // TRIGGER SERVER
    // ========================================================================

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind the trigger listener")?;
    tracing::info!(%addr, policy = ?fail_policy, "Review moderation service listening");

    axum::serve(listener, router(context))
        .await
        .context("Trigger server error")?;

    Ok(())
}
