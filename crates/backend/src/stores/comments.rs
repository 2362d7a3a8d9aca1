//! HTTP comment store.

use async_trait::async_trait;
use murmur_common::AppResult;

use crate::client::Backend;
use crate::records::{Comment, NewComment};
use crate::rest::Order;
use crate::stores::CommentStore;

const TABLE: &str = "comments";

/// [`CommentStore`] over the backend's REST endpoint.
#[derive(Clone)]
pub struct HttpCommentStore {
    backend: Backend,
}

impl HttpCommentStore {
    /// Create a comment store over the given backend handle.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl CommentStore for HttpCommentStore {
    async fn for_post(&self, post_id: &str, limit: u64) -> AppResult<Vec<Comment>> {
        self.backend
            .table(TABLE)
            .select("*, profile:profiles(*)")
            .eq("post_id", post_id)
            .order("created_at", Order::Asc)
            .limit(limit)
            .fetch()
            .await
    }

    async fn insert(&self, row: &NewComment) -> AppResult<Comment> {
        self.backend.table(TABLE).insert(row).await
    }

    async fn count_for_post(&self, post_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .select("id")
            .eq("post_id", post_id)
            .count()
            .await
    }
}
