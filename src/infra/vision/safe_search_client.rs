// =============================================================================
// VISION SAFESEARCH CLIENT - Google Cloud Vision API Integration
// =============================================================================
//
// Implements the `ImageClassifier` port against Vision's `images:annotate`
// endpoint with a SAFE_SEARCH_DETECTION feature. The image never leaves the
// bucket: the request references it by `gs://` URI.
//
// Response shape (the part we care about):
//   { "responses": [ { "safeSearchAnnotation": { "adult": "LIKELY", ... } } ] }
//
// A per-request error object or a missing annotation is surfaced as a
// classifier error; the caller's failure policy decides what that means.

use crate::core::classification::{ClassifierError, ImageClassifier, SafeSearchScores};
use crate::core::storage::ObjectRef;
use crate::infra::google::ServiceAccountAuth;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const VISION_ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnnotateResponse {
    responses: Vec<AnnotateResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AnnotateResult {
    safe_search_annotation: Option<SafeSearchScores>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiStatus {
    code: i32,
    message: String,
}

pub struct SafeSearchClient {
    http: Client,
    auth: ServiceAccountAuth,
}

impl SafeSearchClient {
    pub fn new(auth: ServiceAccountAuth) -> Self {
        Self {
            http: Client::new(),
            auth,
        }
    }
}

#[async_trait]
impl ImageClassifier for SafeSearchClient {
    async fn classify(&self, object: &ObjectRef) -> Result<SafeSearchScores, ClassifierError> {
        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|err| ClassifierError::Transport(err.to_string()))?;

        let payload = json!({
            "requests": [{
                "image": {"source": {"imageUri": object.gs_uri()}},
                "features": [{"type": "SAFE_SEARCH_DETECTION"}]
            }]
        });

        let response = self
            .http
            .post(VISION_ANNOTATE_URL)
            .bearer_auth(token)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ClassifierError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Transport(format!(
                "Vision API error ({status}): {body}"
            )));
        }

        let decoded: AnnotateResponse = response
            .json()
            .await
            .map_err(|err| ClassifierError::MalformedResponse(err.to_string()))?;

        let result = decoded.responses.into_iter().next().ok_or_else(|| {
            ClassifierError::MalformedResponse("empty responses array".to_string())
        })?;

        if let Some(error) = result.error {
            return Err(ClassifierError::Transport(format!(
                "Vision API error {}: {}",
                error.code, error.message
            )));
        }

        result.safe_search_annotation.ok_or_else(|| {
            ClassifierError::MalformedResponse("missing safeSearchAnnotation".to_string())
        })
    }
}
