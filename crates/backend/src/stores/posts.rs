//! HTTP post store.

use async_trait::async_trait;
use murmur_common::AppResult;
use serde_json::json;

use crate::client::Backend;
use crate::records::{NewPost, PageCursor, Post};
use crate::rest::{Order, SelectBuilder};
use crate::stores::PostStore;

const TABLE: &str = "posts";

/// Column projection embedding the owner profile join.
const WITH_PROFILE: &str = "*, profile:profiles(*)";

/// [`PostStore`] over the backend's REST endpoint.
#[derive(Clone)]
pub struct HttpPostStore {
    backend: Backend,
}

impl HttpPostStore {
    /// Create a post store over the given backend handle.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }

    fn page(&self, limit: u64, before: Option<&PageCursor>) -> SelectBuilder {
        let mut query = self.backend.table(TABLE).select(WITH_PROFILE);
        if let Some(cursor) = before {
            query = query.older_than(cursor);
        }
        query
            .order("created_at", Order::Desc)
            .order("id", Order::Desc)
            .limit(limit)
    }
}

#[async_trait]
impl PostStore for HttpPostStore {
    async fn feed_page(&self, limit: u64, before: Option<&PageCursor>) -> AppResult<Vec<Post>> {
        self.page(limit, before).fetch().await
    }

    async fn by_user(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
    ) -> AppResult<Vec<Post>> {
        self.page(limit, before).eq("user_id", user_id).fetch().await
    }

    async fn media_by_user(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
    ) -> AppResult<Vec<Post>> {
        self.page(limit, before)
            .eq("user_id", user_id)
            .or_any(&[
                "images.neq.{}".to_string(),
                "video.not.is.null".to_string(),
            ])
            .fetch()
            .await
    }

    async fn by_ids(&self, ids: &[String]) -> AppResult<Vec<Post>> {
        if ids.is_empty() {
            // A membership filter over nothing matches nothing; skip the
            // round trip.
            return Ok(Vec::new());
        }
        self.backend
            .table(TABLE)
            .select(WITH_PROFILE)
            .in_("id", ids)
            .order("created_at", Order::Desc)
            .order("id", Order::Desc)
            .fetch()
            .await
    }

    async fn get(&self, id: &str) -> AppResult<Option<Post>> {
        self.backend
            .table(TABLE)
            .select(WITH_PROFILE)
            .eq("id", id)
            .maybe_single()
            .await
    }

    async fn insert(&self, row: &NewPost) -> AppResult<Post> {
        self.backend.table(TABLE).insert(row).await
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .delete()
            .eq("id", id)
            .execute()
            .await?;
        Ok(())
    }

    async fn set_like_count(&self, id: &str, likes: i64) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .update(&json!({ "likes": likes }))?
            .eq("id", id)
            .execute()
            .await?;
        Ok(())
    }

    async fn set_comment_count(&self, id: &str, comments: i64) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .update(&json!({ "comments": comments }))?
            .eq("id", id)
            .execute()
            .await?;
        Ok(())
    }

    async fn count_by_user(&self, user_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .select("id")
            .eq("user_id", user_id)
            .count()
            .await
    }

    async fn search_text(&self, needle: &str, limit: u64) -> AppResult<Vec<Post>> {
        self.backend
            .table(TABLE)
            .select(WITH_PROFILE)
            .ilike("text", needle)
            .order("created_at", Order::Desc)
            .limit(limit)
            .fetch()
            .await
    }
}
