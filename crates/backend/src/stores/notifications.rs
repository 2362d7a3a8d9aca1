//! HTTP notification store.

use async_trait::async_trait;
use murmur_common::AppResult;
use serde_json::json;

use crate::client::Backend;
use crate::records::{NewNotification, Notification, PageCursor};
use crate::rest::Order;
use crate::stores::NotificationStore;

const TABLE: &str = "notifications";

/// [`NotificationStore`] over the backend's REST endpoint.
#[derive(Clone)]
pub struct HttpNotificationStore {
    backend: Backend,
}

impl HttpNotificationStore {
    /// Create a notification store over the given backend handle.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl NotificationStore for HttpNotificationStore {
    async fn insert(&self, row: &NewNotification) -> AppResult<Notification> {
        self.backend.table(TABLE).insert(row).await
    }

    async fn list(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>> {
        let mut query = self
            .backend
            .table(TABLE)
            .select("*")
            .eq("user_id", user_id);
        if unread_only {
            query = query.eq("is_read", "false");
        }
        if let Some(cursor) = before {
            query = query.older_than(cursor);
        }
        query
            .order("created_at", Order::Desc)
            .order("id", Order::Desc)
            .limit(limit)
            .fetch()
            .await
    }

    async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .update(&json!({ "is_read": true }))?
            .eq("user_id", user_id)
            .eq("is_read", "false")
            .execute()
            .await
    }

    async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        self.backend
            .table(TABLE)
            .select("id")
            .eq("user_id", user_id)
            .eq("is_read", "false")
            .count()
            .await
    }
}
