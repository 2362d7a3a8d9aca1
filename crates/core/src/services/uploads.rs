//! File storage helper: idempotent bucket provisioning, owner-scoped
//! uploads, lazy URL resolution and idempotent deletion.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use murmur_backend::ObjectRepository;
use murmur_common::{AppError, AppResult, IdGenerator, config::StorageConfig};

/// One file handed to the uploader.
#[derive(Debug, Clone)]
pub struct UploadSource {
    /// Original file name; only the extension survives into the storage key.
    pub name: String,
    /// MIME content type.
    pub content_type: String,
    /// File contents.
    pub data: Bytes,
}

/// Per-file result of a batch upload; one file failing does not abort the
/// rest of the batch.
#[derive(Debug)]
pub struct UploadOutcome {
    /// Original file name.
    pub name: String,
    /// The stored path, or why this file failed.
    pub result: AppResult<String>,
}

/// Upload service over the backend's object storage.
pub struct UploadService {
    objects: ObjectRepository,
    settings: StorageConfig,
    id_gen: IdGenerator,
    /// Buckets already confirmed to exist this process; re-checking them
    /// would only burn round trips.
    ready_buckets: Mutex<HashSet<String>>,
}

impl UploadService {
    /// Create a new upload service.
    #[must_use]
    pub fn new(objects: ObjectRepository, settings: StorageConfig) -> Self {
        Self {
            objects,
            settings,
            id_gen: IdGenerator::new(),
            ready_buckets: Mutex::new(HashSet::new()),
        }
    }

    fn ready(&self) -> MutexGuard<'_, HashSet<String>> {
        self.ready_buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Idempotent bucket provisioning.
    ///
    /// Checks existence first and creates the bucket (public read, the
    /// configured size ceiling) when absent. A `Conflict` from creation means
    /// a concurrent caller won the race between the check and the create;
    /// that bucket exists, so it is success.
    pub async fn ensure_bucket(&self, name: &str) -> AppResult<()> {
        if self.ready().contains(name) {
            return Ok(());
        }

        if !self.objects.bucket_exists(name).await? {
            match self
                .objects
                .create_bucket(name, true, self.settings.max_upload_bytes)
                .await
            {
                Ok(()) => {
                    tracing::info!(bucket = %name, "Created storage bucket");
                }
                Err(error) if error.is_conflict() => {
                    tracing::debug!(bucket = %name, "Bucket created concurrently");
                }
                Err(error) => return Err(error),
            }
        }

        self.ready().insert(name.to_string());
        Ok(())
    }

    /// Upload a file under the owner's path prefix and return the bare
    /// storage path; URLs are resolved lazily via [`Self::file_url`].
    ///
    /// Fails fast with `Validation` — before any network call — on an empty
    /// owner id or an oversized payload.
    pub async fn upload(
        &self,
        source: &UploadSource,
        bucket: &str,
        owner_id: &str,
    ) -> AppResult<String> {
        if owner_id.trim().is_empty() {
            return Err(AppError::Validation(
                "uploads require a non-empty owner id".to_string(),
            ));
        }
        if source.data.len() as u64 > self.settings.max_upload_bytes {
            return Err(AppError::Validation(format!(
                "{} exceeds the {} byte upload limit",
                source.name, self.settings.max_upload_bytes
            )));
        }

        self.ensure_bucket(bucket).await?;

        let path = self.object_key(owner_id, &source.name);
        self.objects
            .upload(bucket, &path, source.data.clone(), &source.content_type)
            .await?;

        tracing::debug!(bucket = %bucket, path = %path, "Uploaded file");
        Ok(path)
    }

    /// Upload a batch with per-file outcomes; a failure is reported for the
    /// file it hit, not as one aggregate error.
    pub async fn upload_many(
        &self,
        sources: &[UploadSource],
        bucket: &str,
        owner_id: &str,
    ) -> Vec<UploadOutcome> {
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            let result = self
                .upload(source, bucket, owner_id)
                .await
                .map_err(|error| {
                    tracing::warn!(name = %source.name, error = %error, "File upload failed");
                    AppError::Upload {
                        name: source.name.clone(),
                        reason: error.to_string(),
                    }
                });
            outcomes.push(UploadOutcome {
                name: source.name.clone(),
                result,
            });
        }
        outcomes
    }

    /// Resolve a stored path to a renderable URL. Pure; never fails.
    ///
    /// Absolute and data URLs pass through unchanged. Transient local
    /// preview handles do not survive the in-memory session that minted
    /// them, so they resolve to the placeholder rather than leak through.
    #[must_use]
    pub fn file_url(&self, path: &str, bucket: &str) -> String {
        if path.is_empty() || path.starts_with("blob:") {
            return self.settings.placeholder.clone();
        }
        if path.starts_with("http://") || path.starts_with("https://") || path.starts_with("data:")
        {
            return path.to_string();
        }
        self.objects.public_url(bucket, path)
    }

    /// Delete a stored object. Idempotent: empty paths, placeholders,
    /// transient handles, foreign absolute URLs and already-absent objects
    /// are all no-op successes.
    pub async fn delete(&self, path: &str, bucket: &str) -> AppResult<()> {
        if path.is_empty()
            || path == self.settings.placeholder
            || path.starts_with("blob:")
            || path.starts_with("data:")
            || path.starts_with("http://")
            || path.starts_with("https://")
        {
            return Ok(());
        }

        match self.objects.remove(bucket, &[path.to_string()]).await {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error),
        }
    }

    /// Collision-resistant storage key namespaced under the owner id,
    /// preserving a sane extension from the original name.
    fn object_key(&self, owner_id: &str, original_name: &str) -> String {
        let extension = original_name
            .rfind('.')
            .filter(|&pos| pos > 0 && pos < original_name.len() - 1)
            .map(|pos| &original_name[pos + 1..])
            .filter(|ext| ext.len() <= 10 && !ext.is_empty())
            .unwrap_or("bin");

        format!("{owner_id}/{}.{extension}", self.id_gen.generate_uuid_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_backend::test_support::MemoryBackend;
    use std::sync::Arc;

    fn service(backend: &Arc<MemoryBackend>) -> UploadService {
        UploadService::new(backend.clone(), StorageConfig::default())
    }

    fn png(name: &str) -> UploadSource {
        UploadSource {
            name: name.to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from_static(b"png-bytes"),
        }
    }

    #[tokio::test]
    async fn test_upload_with_empty_owner_fails_without_network() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        let error = uploads
            .upload(&png("a.png"), "images", "")
            .await
            .expect_err("empty owner must be rejected");

        assert!(matches!(error, AppError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_fails_without_network() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        let source = UploadSource {
            name: "big.png".to_string(),
            content_type: "image/png".to_string(),
            data: Bytes::from(vec![0_u8; (10 * 1024 * 1024 + 1) as usize]),
        };
        let error = uploads
            .upload(&source, "images", "u1")
            .await
            .expect_err("oversized payload must be rejected");

        assert!(matches!(error, AppError::Validation(_)));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_ensure_bucket_twice_never_errors() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        uploads
            .ensure_bucket("images")
            .await
            .unwrap_or_else(|e| panic!("first ensure: {e}"));
        uploads
            .ensure_bucket("images")
            .await
            .unwrap_or_else(|e| panic!("second ensure: {e}"));

        // The second call hit the memoized set, not the backend.
        assert_eq!(backend.call_count("objects.bucket_exists"), 1);
        assert_eq!(backend.call_count("objects.create_bucket"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_bucket_creation_conflict_is_success() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        // A concurrent caller creates the bucket between this caller's
        // existence check and its create: the check reports absent, the
        // create conflicts, and the whole operation must still succeed.
        backend.seed_bucket("images", 10 * 1024 * 1024);
        backend.hide_bucket_once("images");

        uploads
            .ensure_bucket("images")
            .await
            .unwrap_or_else(|e| panic!("racy ensure must succeed: {e}"));
        assert_eq!(backend.call_count("objects.create_bucket"), 1);

        // And the bucket is now usable.
        let path = uploads
            .upload(&png("a.png"), "images", "u1")
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));
        assert_eq!(backend.object_paths("images"), vec![path]);
    }

    #[tokio::test]
    async fn test_upload_stores_under_owner_prefix_and_returns_bare_path() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        let path = uploads
            .upload(&png("photo.JPG"), "images", "u1")
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));

        assert!(path.starts_with("u1/"));
        assert!(path.ends_with(".JPG"));
        assert!(!path.starts_with("http"));
        assert_eq!(backend.object_paths("images"), vec![path.clone()]);

        // Two uploads of the same file never collide.
        let second = uploads
            .upload(&png("photo.JPG"), "images", "u1")
            .await
            .unwrap_or_else(|e| panic!("upload: {e}"));
        assert_ne!(path, second);
    }

    #[tokio::test]
    async fn test_upload_many_reports_per_file_outcomes() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        backend.seed_bucket("images", 10 * 1024 * 1024);
        let sources = vec![png("a.png"), png("b.png"), png("c.png")];

        // Warm the bucket memo, then arm a failure for the next upload: the
        // first file of the batch fails, the second still succeeds.
        let first = uploads.upload(&sources[0], "images", "u1").await;
        assert!(first.is_ok());
        backend.fail_once("objects.upload");
        let outcomes = uploads
            .upload_many(&sources[1..], "images", "u1")
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
        assert_eq!(backend.object_paths("images").len(), 2);
    }

    #[tokio::test]
    async fn test_file_url_passthrough_and_placeholder() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        assert_eq!(
            uploads.file_url("https://cdn.test/x.png", "images"),
            "https://cdn.test/x.png"
        );
        assert_eq!(
            uploads.file_url("data:image/png;base64,AAAA", "images"),
            "data:image/png;base64,AAAA"
        );
        assert_eq!(
            uploads.file_url("blob:preview-handle", "images"),
            "/placeholder.svg"
        );
        assert_eq!(uploads.file_url("", "images"), "/placeholder.svg");
        assert_eq!(
            uploads.file_url("u1/photo.png", "images"),
            "memory://images/u1/photo.png"
        );
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_for_unstored_paths() {
        let backend = MemoryBackend::shared();
        let uploads = service(&backend);

        for path in ["", "blob:handle", "/placeholder.svg", "https://cdn.test/x.png"] {
            uploads
                .delete(path, "images")
                .await
                .unwrap_or_else(|e| panic!("delete {path}: {e}"));
        }
        assert!(backend.calls().is_empty());

        // Removing an absent stored path is also a no-op success.
        backend.seed_bucket("images", 10 * 1024 * 1024);
        uploads
            .delete("u1/gone.png", "images")
            .await
            .unwrap_or_else(|e| panic!("delete absent: {e}"));
    }
}
