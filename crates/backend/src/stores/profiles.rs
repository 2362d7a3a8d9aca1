//! HTTP profile store.

use async_trait::async_trait;
use murmur_common::AppResult;

use crate::client::Backend;
use crate::records::{Profile, ProfileChanges, ProfileCounters};
use crate::rest::{Order, sanitize_pattern};
use crate::stores::ProfileStore;

const TABLE: &str = "profiles";

/// [`ProfileStore`] over the backend's REST endpoint.
#[derive(Clone)]
pub struct HttpProfileStore {
    backend: Backend,
}

impl HttpProfileStore {
    /// Create a profile store over the given backend handle.
    #[must_use]
    pub const fn new(backend: Backend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn by_id(&self, id: &str) -> AppResult<Option<Profile>> {
        self.backend
            .table(TABLE)
            .select("*")
            .eq("id", id)
            .maybe_single()
            .await
    }

    async fn by_username(&self, username: &str) -> AppResult<Option<Profile>> {
        self.backend
            .table(TABLE)
            .select("*")
            .eq("username", username)
            .maybe_single()
            .await
    }

    async fn update(&self, id: &str, changes: &ProfileChanges) -> AppResult<()> {
        self.backend
            .table(TABLE)
            .update(changes)?
            .eq("id", id)
            .execute()
            .await?;
        Ok(())
    }

    async fn set_counters(&self, id: &str, counters: &ProfileCounters) -> AppResult<()> {
        if counters.is_empty() {
            return Ok(());
        }
        self.backend
            .table(TABLE)
            .update(counters)?
            .eq("id", id)
            .execute()
            .await?;
        Ok(())
    }

    async fn search(&self, needle: &str, limit: u64) -> AppResult<Vec<Profile>> {
        let needle = sanitize_pattern(needle);
        self.backend
            .table(TABLE)
            .select("*")
            .or_any(&[
                format!("username.ilike.*{needle}*"),
                format!("full_name.ilike.*{needle}*"),
            ])
            .order("username", Order::Asc)
            .limit(limit)
            .fetch()
            .await
    }

    async fn recent(&self, limit: u64) -> AppResult<Vec<Profile>> {
        self.backend
            .table(TABLE)
            .select("*")
            .order("created_at", Order::Desc)
            .limit(limit)
            .fetch()
            .await
    }
}
