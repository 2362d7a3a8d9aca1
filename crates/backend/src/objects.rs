//! Object storage API: buckets, uploads, public URLs.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use murmur_common::AppResult;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::client::Backend;
use crate::rest::{deserialize_ok, expect_ok};

/// Object storage operations consumed by the upload helper.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Names of all buckets visible to this client.
    async fn list_buckets(&self) -> AppResult<Vec<String>>;

    /// Whether a bucket with this name exists.
    async fn bucket_exists(&self, name: &str) -> AppResult<bool>;

    /// Create a bucket.
    ///
    /// Returns `Conflict` when the bucket already exists (possibly created by
    /// a concurrent caller between an existence check and this call).
    async fn create_bucket(&self, name: &str, public: bool, size_limit: u64) -> AppResult<()>;

    /// Upload an object.
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<()>;

    /// Public URL for an object path; pure derivation, no request.
    fn public_url(&self, bucket: &str, path: &str) -> String;

    /// Remove objects. Removing an already-absent object is success.
    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()>;
}

/// Shared object store handle.
pub type ObjectRepository = Arc<dyn ObjectStore>;

/// Wire shape of a bucket record.
#[derive(Debug, Deserialize)]
struct BucketRecord {
    name: String,
}

/// Creation payload for a bucket.
#[derive(Debug, Serialize)]
struct CreateBucket<'a> {
    id: &'a str,
    name: &'a str,
    public: bool,
    file_size_limit: u64,
}

/// HTTP implementation of [`ObjectStore`] over the backend's storage
/// endpoints.
#[derive(Clone)]
pub struct HttpObjectStore {
    backend: Backend,
}

impl Backend {
    /// Handle to the storage endpoints.
    #[must_use]
    pub fn objects(&self) -> HttpObjectStore {
        HttpObjectStore {
            backend: self.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list_buckets(&self) -> AppResult<Vec<String>> {
        let url = self.backend.endpoint("storage/v1/bucket")?;
        let response = self
            .backend
            .authed(self.backend.inner.http.get(url))
            .await
            .send()
            .await?;

        let records: Vec<BucketRecord> = deserialize_ok(response).await?;
        Ok(records.into_iter().map(|b| b.name).collect())
    }

    async fn bucket_exists(&self, name: &str) -> AppResult<bool> {
        let url = self
            .backend
            .endpoint(&format!("storage/v1/bucket/{name}"))?;
        let response = self
            .backend
            .authed(self.backend.inner.http.get(url))
            .await
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Ok(false);
        }
        let record: BucketRecord = deserialize_ok(response).await?;
        Ok(record.name == name)
    }

    async fn create_bucket(&self, name: &str, public: bool, size_limit: u64) -> AppResult<()> {
        let url = self.backend.endpoint("storage/v1/bucket")?;
        let payload = CreateBucket {
            id: name,
            name,
            public,
            file_size_limit: size_limit,
        };
        let response = self
            .backend
            .authed(self.backend.inner.http.post(url))
            .await
            .json(&payload)
            .send()
            .await?;

        expect_ok(response).await
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        content_type: &str,
    ) -> AppResult<()> {
        let url = self
            .backend
            .endpoint(&format!("storage/v1/object/{bucket}/{path}"))?;
        let response = self
            .backend
            .authed(self.backend.inner.http.post(url))
            .await
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await?;

        expect_ok(response).await
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}storage/v1/object/public/{bucket}/{path}",
            self.backend.inner.base_url
        )
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        let url = self
            .backend
            .endpoint(&format!("storage/v1/object/{bucket}"))?;
        let response = self
            .backend
            .authed(self.backend.inner.http.delete(url))
            .await
            .json(&json!({ "prefixes": paths }))
            .send()
            .await?;

        match expect_ok(response).await {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error),
        }
    }
}
