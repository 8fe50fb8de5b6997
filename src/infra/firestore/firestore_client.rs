// Minimal Firestore REST v1 client.
//
// Exactly the document operations this service needs: get-by-id, merge
// writes via PATCH with an update mask (which also creates missing
// documents), add-with-generated-id, structured queries, and a guarded
// PATCH variant that turns a lost compare-and-swap into a typed conflict.

use super::document::{Document, Fields};
use crate::infra::google::ServiceAccountAuth;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const FIRESTORE_BASE: &str = "https://firestore.googleapis.com/v1";

#[derive(Debug, Error)]
pub enum FirestoreError {
    #[error("firestore auth error: {0}")]
    Auth(String),

    #[error("firestore transport error: {0}")]
    Transport(String),

    #[error("firestore api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A guarded write lost the race against a concurrent writer.
    #[error("firestore write precondition failed")]
    Conflict,

    #[error("firestore response could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone)]
pub struct FirestoreClient {
    http: Client,
    auth: ServiceAccountAuth,
    project_id: String,
}

impl FirestoreClient {
    pub fn new(auth: ServiceAccountAuth, project_id: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth,
            project_id: project_id.into(),
        }
    }

    fn documents_root(&self) -> String {
        format!(
            "{FIRESTORE_BASE}/projects/{}/databases/(default)/documents",
            self.project_id
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    async fn bearer(&self) -> Result<String, FirestoreError> {
        self.auth
            .get_access_token()
            .await
            .map_err(|err| FirestoreError::Auth(err.to_string()))
    }

    /// Fetch one document; a missing document is `None`, not an error.
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, FirestoreError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .get(self.document_url(collection, id))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| FirestoreError::Transport(err.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        let document = response
            .json()
            .await
            .map_err(|err| FirestoreError::Decode(err.to_string()))?;
        Ok(Some(document))
    }

    /// Merge-write the given fields. Fields outside the mask are left
    /// untouched; the document is created when it does not exist yet.
    pub async fn patch_merge(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mask: &[String],
    ) -> Result<Document, FirestoreError> {
        self.patch(collection, id, fields, mask, None).await
    }

    /// Like `patch_merge`, but only commits if the document's update time
    /// still matches `update_time`. A concurrent writer surfaces as
    /// `FirestoreError::Conflict`.
    pub async fn patch_guarded(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mask: &[String],
        update_time: &str,
    ) -> Result<Document, FirestoreError> {
        self.patch(collection, id, fields, mask, Some(update_time))
            .await
    }

    async fn patch(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        mask: &[String],
        guard: Option<&str>,
    ) -> Result<Document, FirestoreError> {
        let token = self.bearer().await?;

        let mut query: Vec<(&str, String)> = mask
            .iter()
            .map(|path| ("updateMask.fieldPaths", path.clone()))
            .collect();
        if let Some(stamp) = guard {
            query.push(("currentDocument.updateTime", stamp.to_string()));
        }

        let response = self
            .http
            .patch(self.document_url(collection, id))
            .query(&query)
            .bearer_auth(token)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(|err| FirestoreError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if guard.is_some()
                && (status == StatusCode::CONFLICT || message.contains("FAILED_PRECONDITION"))
            {
                return Err(FirestoreError::Conflict);
            }
            return Err(FirestoreError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json()
            .await
            .map_err(|err| FirestoreError::Decode(err.to_string()))
    }

    /// Add a document with a server-generated id.
    pub async fn create_document(
        &self,
        collection: &str,
        fields: Fields,
    ) -> Result<Document, FirestoreError> {
        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{}/{}", self.documents_root(), collection))
            .bearer_auth(token)
            .json(&json!({ "fields": fields }))
            .send()
            .await
            .map_err(|err| FirestoreError::Transport(err.to_string()))?;

        let response = Self::check(response).await?;
        response
            .json()
            .await
            .map_err(|err| FirestoreError::Decode(err.to_string()))
    }

    /// Run a structured query over the root documents.
    pub async fn run_query(
        &self,
        structured_query: serde_json::Value,
    ) -> Result<Vec<Document>, FirestoreError> {
        #[derive(Debug, Default, Deserialize)]
        #[serde(default)]
        struct QueryRow {
            document: Option<Document>,
        }

        let token = self.bearer().await?;
        let response = self
            .http
            .post(format!("{}:runQuery", self.documents_root()))
            .bearer_auth(token)
            .json(&json!({ "structuredQuery": structured_query }))
            .send()
            .await
            .map_err(|err| FirestoreError::Transport(err.to_string()))?;

        let response = Self::check(response).await?;
        let rows: Vec<QueryRow> = response
            .json()
            .await
            .map_err(|err| FirestoreError::Decode(err.to_string()))?;
        Ok(rows.into_iter().filter_map(|row| row.document).collect())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, FirestoreError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(FirestoreError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}
