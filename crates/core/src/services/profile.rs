//! Profile resolution, counter recomputation and suggestions.

use std::collections::HashSet;

use murmur_backend::{
    PostRepository, Profile, ProfileCounters, ProfileRepository, RelationshipRepository,
};
use murmur_common::AppResult;

/// Profile fetching and derived queries.
pub struct ProfileService {
    profiles: ProfileRepository,
    relationships: RelationshipRepository,
    posts: PostRepository,
}

impl ProfileService {
    /// Create a new profile service.
    #[must_use]
    pub const fn new(
        profiles: ProfileRepository,
        relationships: RelationshipRepository,
        posts: PostRepository,
    ) -> Self {
        Self {
            profiles,
            relationships,
            posts,
        }
    }

    /// Resolve a profile by its unique username.
    ///
    /// `Ok(None)` is the distinct not-found state a profile view renders;
    /// only remote failures are errors.
    pub async fn by_username(&self, username: &str) -> AppResult<Option<Profile>> {
        self.profiles.by_username(username).await
    }

    /// Resolve a profile by id.
    pub async fn by_id(&self, id: &str) -> AppResult<Option<Profile>> {
        self.profiles.by_id(id).await
    }

    /// Recompute a profile's denormalized counters from the authoritative
    /// rows and write them back. Returns the recomputed values.
    pub async fn refresh_counters(&self, user_id: &str) -> AppResult<ProfileCounters> {
        let counters = ProfileCounters {
            followers: Some(self.relationships.count_followers(user_id).await? as i64),
            following: Some(self.relationships.count_following(user_id).await? as i64),
            posts: Some(self.posts.count_by_user(user_id).await? as i64),
        };
        self.profiles.set_counters(user_id, &counters).await?;
        Ok(counters)
    }

    /// Recently created profiles the actor does not already follow,
    /// excluding the actor.
    pub async fn recommended(&self, actor_id: &str, limit: u64) -> AppResult<Vec<Profile>> {
        let following: HashSet<String> = self
            .relationships
            .following_ids(actor_id)
            .await?
            .into_iter()
            .collect();

        // Over-fetch so the exclusions still leave a full list.
        let fetch = limit + following.len() as u64 + 1;
        let mut recent = self.profiles.recent(fetch).await?;
        recent.retain(|p| p.id != actor_id && !following.contains(&p.id));
        recent.truncate(limit as usize);
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_backend::test_support::MemoryBackend;
    use std::sync::Arc;

    fn service(backend: &Arc<MemoryBackend>) -> ProfileService {
        ProfileService::new(backend.clone(), backend.clone(), backend.clone())
    }

    #[tokio::test]
    async fn test_unknown_username_is_not_found_not_error() {
        let backend = MemoryBackend::shared();
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));

        let resolved = service(&backend)
            .by_username("nobody")
            .await
            .unwrap_or_else(|e| panic!("lookup: {e}"));
        assert!(resolved.is_none());

        let resolved = service(&backend)
            .by_username("jane")
            .await
            .unwrap_or_else(|e| panic!("lookup: {e}"));
        assert_eq!(
            resolved.unwrap_or_else(|| panic!("profile")).id,
            "u1"
        );
    }

    #[tokio::test]
    async fn test_refresh_counters_recomputes_from_rows() {
        let backend = MemoryBackend::shared();
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));
        backend.seed_relationship("u2", "u1");
        backend.seed_relationship("u3", "u1");
        backend.seed_relationship("u1", "u2");
        backend.seed_post("p1", "u1", "hello", 60);

        let counters = service(&backend)
            .refresh_counters("u1")
            .await
            .unwrap_or_else(|e| panic!("refresh: {e}"));

        assert_eq!(counters.followers, Some(2));
        assert_eq!(counters.following, Some(1));
        assert_eq!(counters.posts, Some(1));

        let row = backend.profile_row("u1").unwrap_or_else(|| panic!("row"));
        assert_eq!(row.followers, 2);
        assert_eq!(row.following, 1);
        assert_eq!(row.posts, 1);
    }

    #[tokio::test]
    async fn test_recommended_excludes_self_and_followed() {
        let backend = MemoryBackend::shared();
        for (id, name) in [("u1", "jane"), ("u2", "marco"), ("u3", "ada"), ("u4", "sam")] {
            backend.seed_profile(MemoryBackend::profile(id, name));
        }
        backend.seed_relationship("u1", "u2");

        let recommended = service(&backend)
            .recommended("u1", 10)
            .await
            .unwrap_or_else(|e| panic!("recommended: {e}"));

        let ids: HashSet<&str> = recommended.iter().map(|p| p.id.as_str()).collect();
        assert!(ids.contains("u3"));
        assert!(ids.contains("u4"));
        assert!(!ids.contains("u1"));
        assert!(!ids.contains("u2"));
    }
}
