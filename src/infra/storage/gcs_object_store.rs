// Cloud Storage implementation of the ObjectStore port.
//
// Deletes go through the JSON API, where the whole object path travels as
// one URL component - '/' gets encoded too, unlike in public URLs.

use crate::core::storage::{ObjectStore, ObjectStoreError};
use crate::infra::google::ServiceAccountAuth;
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};

const OBJECT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_object_path(path: &str) -> String {
    utf8_percent_encode(path, OBJECT_SET).to_string()
}

#[derive(Clone)]
pub struct GcsObjectStore {
    http: Client,
    auth: ServiceAccountAuth,
    bucket: String,
}

impl GcsObjectStore {
    pub fn new(auth: ServiceAccountAuth, bucket: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            auth,
            bucket: bucket.into(),
        }
    }

    fn object_url(&self, path: &str) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
            self.bucket,
            encode_object_path(path)
        )
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn delete(&self, path: &str, ignore_missing: bool) -> Result<(), ObjectStoreError> {
        let token = self
            .auth
            .get_access_token()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;

        let response = self
            .http
            .delete(self.object_url(path))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| ObjectStoreError::Backend(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND && ignore_missing {
            tracing::debug!(path, "Object already gone, nothing to delete");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(ObjectStoreError::Backend(format!(
            "delete of {path} failed ({status}): {body}"
        )))
    }
}
