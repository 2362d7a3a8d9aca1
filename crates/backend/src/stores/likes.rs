//! HTTP like store.

use async_trait::async_trait;
use murmur_common::AppResult;
use serde::Deserialize;
use serde_json::json;

use crate::client::Backend;
use crate::stores::LikeStore;

const TABLE: &str = "post_likes";

#[derive(Debug, Deserialize)]
struct LikedPostId {
    post_id: String,
}

/// [`LikeStore`] over the backend's REST endpoint.
#[derive(Clone)]
pub struct HttpLikeStore {
    backend: Backend,
}

impl HttpLikeStore {
    /// Create a like store over the given backend handle.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl LikeStore for HttpLikeStore {
    async fn exists(&self, post_id: &str, user_id: &str) -> AppResult<bool> {
        let row: Option<serde_json::Value> = self
            .backend
            .table(TABLE)
            .select("post_id")
            .eq("post_id", post_id)
            .eq("user_id", user_id)
            .maybe_single()
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .insert_only(&json!({ "post_id": post_id, "user_id": user_id }))
            .await
    }

    async fn delete(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .delete()
            .eq("post_id", post_id)
            .eq("user_id", user_id)
            .execute()
            .await?;
        Ok(())
    }

    async fn count_for_post(&self, post_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .select("post_id")
            .eq("post_id", post_id)
            .count()
            .await
    }

    async fn post_ids_liked_by(&self, user_id: &str) -> AppResult<Vec<String>> {
        let rows: Vec<LikedPostId> = self
            .backend
            .table(TABLE)
            .select("post_id")
            .eq("user_id", user_id)
            .fetch()
            .await?;
        Ok(rows.into_iter().map(|r| r.post_id).collect())
    }
}
