//! HTTP follow-relationship store.

use async_trait::async_trait;
use murmur_common::AppResult;
use serde::Deserialize;
use serde_json::json;

use crate::client::Backend;
use crate::stores::RelationshipStore;

const TABLE: &str = "user_relationships";

#[derive(Debug, Deserialize)]
struct FollowingId {
    following_id: String,
}

/// [`RelationshipStore`] over the backend's REST endpoint.
#[derive(Clone)]
pub struct HttpRelationshipStore {
    backend: Backend,
}

impl HttpRelationshipStore {
    /// Create a relationship store over the given backend handle.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl RelationshipStore for HttpRelationshipStore {
    async fn exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        let row: Option<serde_json::Value> = self
            .backend
            .table(TABLE)
            .select("follower_id")
            .eq("follower_id", follower_id)
            .eq("following_id", following_id)
            .maybe_single()
            .await?;
        Ok(row.is_some())
    }

    async fn insert(&self, follower_id: &str, following_id: &str) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .insert_only(&json!({
                "follower_id": follower_id,
                "following_id": following_id,
            }))
            .await
    }

    async fn delete(&self, follower_id: &str, following_id: &str) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .delete()
            .eq("follower_id", follower_id)
            .eq("following_id", following_id)
            .execute()
            .await?;
        Ok(())
    }

    async fn count_followers(&self, user_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .select("follower_id")
            .eq("following_id", user_id)
            .count()
            .await
    }

    async fn count_following(&self, user_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .select("following_id")
            .eq("follower_id", user_id)
            .count()
            .await
    }

    async fn following_ids(&self, follower_id: &str) -> AppResult<Vec<String>> {
        let rows: Vec<FollowingId> = self
            .backend
            .table(TABLE)
            .select("following_id")
            .eq("follower_id", follower_id)
            .fetch()
            .await?;
        Ok(rows.into_iter().map(|r| r.following_id).collect())
    }
}
