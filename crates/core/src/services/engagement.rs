//! Optimistic like/follow reconciliation.
//!
//! Each (actor, target) pair moves through an explicit state machine. The
//! visible state flips optimistically before the mutation resolves, rolls
//! back when the backend rejects it, and treats a uniqueness violation on
//! insert as "already in the desired state" rather than a failure — the
//! unique tuple constraint on the backend is the real enforcement point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use murmur_backend::{
    LikeRepository, Post, PostRepository, ProfileCounters, ProfileRepository,
    RelationshipRepository,
};
use murmur_common::{AppError, AppResult};

use crate::services::notifications::NotificationService;

/// Which relationship table a pair lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// `post_likes`: actor likes a post.
    Like,
    /// `user_relationships`: actor follows a user.
    Follow,
}

/// Observed state of one (actor, target) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    /// Never observed; a query is needed before the state is known.
    Unknown,
    /// Queried; no relationship row exists.
    CheckedAbsent,
    /// Queried; the relationship row exists.
    CheckedPresent,
    /// A toggle is in flight; the visible state is the optimistic flip of
    /// `prior`.
    PendingToggle {
        /// Presence before the toggle started, for rollback.
        prior: bool,
    },
}

impl RelationState {
    /// The presence a viewer should render right now, if known.
    #[must_use]
    pub const fn visible_presence(self) -> Option<bool> {
        match self {
            Self::Unknown => None,
            Self::CheckedAbsent => Some(false),
            Self::CheckedPresent => Some(true),
            Self::PendingToggle { prior } => Some(!prior),
        }
    }

    const fn checked(present: bool) -> Self {
        if present {
            Self::CheckedPresent
        } else {
            Self::CheckedAbsent
        }
    }
}

type RelationKey = (RelationKind, String, String);

/// Like/follow toggling with optimistic local state and best-effort
/// reconciliation of counters and notifications.
pub struct EngagementService {
    likes: LikeRepository,
    relationships: RelationshipRepository,
    posts: PostRepository,
    profiles: ProfileRepository,
    notifications: Arc<NotificationService>,
    cache: Mutex<HashMap<RelationKey, RelationState>>,
}

/// How the backend settled an optimistic insert.
enum MutationOutcome {
    /// The row was written (or removed) as requested.
    Applied,
    /// Insert conflicted: the row already existed, likely from a rapid
    /// double-toggle or another device.
    AlreadySatisfied,
}

impl EngagementService {
    /// Create a new engagement service.
    #[must_use]
    pub fn new(
        likes: LikeRepository,
        relationships: RelationshipRepository,
        posts: PostRepository,
        profiles: ProfileRepository,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            likes,
            relationships,
            posts,
            profiles,
            notifications,
            cache: Mutex::new(HashMap::new()),
        }
    }

    fn cache(&self) -> MutexGuard<'_, HashMap<RelationKey, RelationState>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(kind: RelationKind, actor_id: &str, target_id: &str) -> RelationKey {
        (kind, actor_id.to_string(), target_id.to_string())
    }

    /// Cached state of a pair without querying.
    #[must_use]
    pub fn relation_state(
        &self,
        kind: RelationKind,
        actor_id: &str,
        target_id: &str,
    ) -> RelationState {
        self.cache()
            .get(&Self::key(kind, actor_id, target_id))
            .copied()
            .unwrap_or(RelationState::Unknown)
    }

    /// Whether the actor has liked the post, querying once and caching.
    pub async fn liked(&self, actor_id: &str, post_id: &str) -> AppResult<bool> {
        self.observed(RelationKind::Like, actor_id, post_id).await
    }

    /// Whether the actor follows the user, querying once and caching.
    pub async fn following(&self, actor_id: &str, target_id: &str) -> AppResult<bool> {
        self.observed(RelationKind::Follow, actor_id, target_id)
            .await
    }

    async fn observed(
        &self,
        kind: RelationKind,
        actor_id: &str,
        target_id: &str,
    ) -> AppResult<bool> {
        let key = Self::key(kind, actor_id, target_id);
        if let Some(present) = self.cache().get(&key).copied().and_then(RelationState::visible_presence) {
            return Ok(present);
        }

        let present = match kind {
            RelationKind::Like => self.likes.exists(target_id, actor_id).await?,
            RelationKind::Follow => self.relationships.exists(actor_id, target_id).await?,
        };
        self.cache().insert(key, RelationState::checked(present));
        Ok(present)
    }

    /// Toggle the actor's like on a post. Returns the settled presence.
    ///
    /// On a settled like, the post's denormalized counter is recomputed from
    /// the relationship rows and the owner is notified (unless the actor owns
    /// the post). Counter and notification failures are logged, never
    /// surfaced as toggle failures.
    pub async fn toggle_like(&self, actor_id: Option<&str>, post: &Post) -> AppResult<bool> {
        let actor_id = actor_id.ok_or(AppError::AuthRequired)?;

        let (present, outcome) = self
            .toggle(RelationKind::Like, actor_id, &post.id)
            .await?;

        if let Err(error) = self.refresh_like_counter(&post.id).await {
            tracing::warn!(post_id = %post.id, error = %error, "Like counter refresh failed");
        }

        if present && matches!(outcome, MutationOutcome::Applied) {
            if let Err(error) = self
                .notifications
                .notify_like(&post.user_id, actor_id, &post.id)
                .await
            {
                tracing::warn!(post_id = %post.id, error = %error, "Like notification failed");
            }
        }

        Ok(present)
    }

    /// Toggle the actor's follow edge to a user. Returns the settled
    /// presence.
    ///
    /// Self-follow prevention is the backend's job; the client only skips
    /// the self-notification.
    pub async fn toggle_follow(
        &self,
        actor_id: Option<&str>,
        target_id: &str,
    ) -> AppResult<bool> {
        let actor_id = actor_id.ok_or(AppError::AuthRequired)?;

        let (present, outcome) = self
            .toggle(RelationKind::Follow, actor_id, target_id)
            .await?;

        if let Err(error) = self.refresh_follow_counters(actor_id, target_id).await {
            tracing::warn!(
                target_id = %target_id,
                error = %error,
                "Follow counter refresh failed"
            );
        }

        if present && matches!(outcome, MutationOutcome::Applied) {
            if let Err(error) = self
                .notifications
                .notify_follow(target_id, actor_id)
                .await
            {
                tracing::warn!(target_id = %target_id, error = %error, "Follow notification failed");
            }
        }

        Ok(present)
    }

    /// Core toggle: optimistic flip, mutation, settle or roll back.
    async fn toggle(
        &self,
        kind: RelationKind,
        actor_id: &str,
        target_id: &str,
    ) -> AppResult<(bool, MutationOutcome)> {
        let prior = self.observed(kind, actor_id, target_id).await?;
        let key = Self::key(kind, actor_id, target_id);

        {
            let mut cache = self.cache();
            if matches!(cache.get(&key), Some(RelationState::PendingToggle { .. })) {
                return Err(AppError::Conflict(
                    "a toggle for this target is already in flight".to_string(),
                ));
            }
            // The optimistic flip: visible state changes before the network
            // call resolves.
            cache.insert(key.clone(), RelationState::PendingToggle { prior });
        }

        let desired = !prior;
        let mutation = if desired {
            match kind {
                RelationKind::Like => self.likes.insert(target_id, actor_id).await,
                RelationKind::Follow => self.relationships.insert(actor_id, target_id).await,
            }
        } else {
            match kind {
                RelationKind::Like => self.likes.delete(target_id, actor_id).await,
                RelationKind::Follow => self.relationships.delete(actor_id, target_id).await,
            }
        };

        match mutation {
            Ok(()) => {
                self.cache().insert(key, RelationState::checked(desired));
                Ok((desired, MutationOutcome::Applied))
            }
            Err(error) if desired && error.is_conflict() => {
                // Another writer got there first; the desired state holds.
                self.cache().insert(key, RelationState::checked(true));
                Ok((true, MutationOutcome::AlreadySatisfied))
            }
            Err(error) => {
                // Roll back the optimistic flip and surface the failure.
                self.cache().insert(key, RelationState::checked(prior));
                Err(error)
            }
        }
    }

    /// Recompute the post's like counter from the relationship rows rather
    /// than incrementing the cached integer, so drift self-heals.
    async fn refresh_like_counter(&self, post_id: &str) -> AppResult<()> {
        let count = self.likes.count_for_post(post_id).await?;
        self.posts.set_like_count(post_id, count as i64).await
    }

    /// Recompute both profiles' follower/following counters from the
    /// relationship rows.
    async fn refresh_follow_counters(&self, actor_id: &str, target_id: &str) -> AppResult<()> {
        let target_followers = self.relationships.count_followers(target_id).await?;
        self.profiles
            .set_counters(
                target_id,
                &ProfileCounters {
                    followers: Some(target_followers as i64),
                    ..ProfileCounters::default()
                },
            )
            .await?;

        let actor_following = self.relationships.count_following(actor_id).await?;
        self.profiles
            .set_counters(
                actor_id,
                &ProfileCounters {
                    following: Some(actor_following as i64),
                    ..ProfileCounters::default()
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_backend::test_support::MemoryBackend;

    fn service(backend: &Arc<MemoryBackend>) -> EngagementService {
        EngagementService::new(
            backend.clone(),
            backend.clone(),
            backend.clone(),
            backend.clone(),
            Arc::new(NotificationService::new(backend.clone())),
        )
    }

    fn seed_users(backend: &MemoryBackend) {
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));
        backend.seed_profile(MemoryBackend::profile("u2", "marco"));
    }

    #[tokio::test]
    async fn test_toggle_like_requires_authenticated_actor() {
        let backend = MemoryBackend::shared();
        let engagement = service(&backend);
        let post = backend.seed_post("p1", "u2", "hello", 60);

        let error = engagement
            .toggle_like(None, &post)
            .await
            .expect_err("anonymous toggle must fail");

        assert!(matches!(error, AppError::AuthRequired));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_double_toggle_returns_to_original_state() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);
        let post = backend.seed_post("p1", "u2", "hello", 60);

        let liked = engagement
            .toggle_like(Some("u1"), &post)
            .await
            .unwrap_or_else(|e| panic!("first toggle: {e}"));
        assert!(liked);
        assert_eq!(backend.like_rows(), vec![("p1".to_string(), "u1".to_string())]);

        let liked = engagement
            .toggle_like(Some("u1"), &post)
            .await
            .unwrap_or_else(|e| panic!("second toggle: {e}"));
        assert!(!liked);
        assert!(backend.like_rows().is_empty());

        // Counter settled back to the true row count.
        let row = backend.post_row("p1").unwrap_or_else(|| panic!("post row"));
        assert_eq!(row.likes, 0);
    }

    #[tokio::test]
    async fn test_like_recomputes_counter_from_rows() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);
        let post = backend.seed_post("p1", "u2", "hello", 60);

        // Another user's like already exists; the recount folds it in where
        // an increment would have drifted.
        backend.seed_like("p1", "u9");

        engagement
            .toggle_like(Some("u1"), &post)
            .await
            .unwrap_or_else(|e| panic!("toggle: {e}"));

        let row = backend.post_row("p1").unwrap_or_else(|| panic!("post row"));
        assert_eq!(row.likes, 2);
    }

    #[tokio::test]
    async fn test_like_notifies_owner_once_and_skips_self() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);
        let post = backend.seed_post("p1", "u2", "hello", 60);

        engagement
            .toggle_like(Some("u1"), &post)
            .await
            .unwrap_or_else(|e| panic!("toggle: {e}"));

        let notifications = backend.notification_rows();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, "u2");
        assert_eq!(notifications[0].initiator_id, "u1");

        // Owner liking their own post creates no notification.
        let own = backend.seed_post("p2", "u1", "mine", 30);
        engagement
            .toggle_like(Some("u1"), &own)
            .await
            .unwrap_or_else(|e| panic!("own toggle: {e}"));
        assert_eq!(backend.notification_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_mutation_rolls_back_optimistic_state() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);
        let post = backend.seed_post("p1", "u2", "hello", 60);

        backend.fail_once("likes.insert");
        let error = engagement
            .toggle_like(Some("u1"), &post)
            .await
            .expect_err("rejected insert must surface");
        assert!(matches!(error, AppError::RemoteRejected { .. }));

        // Rolled back: the cached state is the prior absence, no row exists,
        // and no notification was created.
        assert_eq!(
            engagement.relation_state(RelationKind::Like, "u1", "p1"),
            RelationState::CheckedAbsent
        );
        assert!(backend.like_rows().is_empty());
        assert!(backend.notification_rows().is_empty());

        // The next toggle starts from the rolled-back state and succeeds.
        let liked = engagement
            .toggle_like(Some("u1"), &post)
            .await
            .unwrap_or_else(|e| panic!("retry: {e}"));
        assert!(liked);
    }

    #[tokio::test]
    async fn test_insert_conflict_is_already_satisfied_without_notification() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);

        // Cache the absence, then the edge appears behind the client's back
        // (another device); the insert conflicts.
        assert!(!engagement
            .following("u1", "u2")
            .await
            .unwrap_or_else(|e| panic!("observe: {e}")));
        backend.seed_relationship("u1", "u2");

        let following = engagement
            .toggle_follow(Some("u1"), "u2")
            .await
            .unwrap_or_else(|e| panic!("toggle: {e}"));

        assert!(following);
        assert_eq!(
            engagement.relation_state(RelationKind::Follow, "u1", "u2"),
            RelationState::CheckedPresent
        );
        // Exactly one row, and no notification for an edge that already
        // existed.
        assert_eq!(backend.relationship_rows().len(), 1);
        assert!(backend.notification_rows().is_empty());
    }

    #[tokio::test]
    async fn test_follow_creates_notification_and_recounts_profiles() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);

        let following = engagement
            .toggle_follow(Some("u1"), "u2")
            .await
            .unwrap_or_else(|e| panic!("toggle: {e}"));
        assert!(following);

        let target = backend.profile_row("u2").unwrap_or_else(|| panic!("target"));
        let actor = backend.profile_row("u1").unwrap_or_else(|| panic!("actor"));
        assert_eq!(target.followers, 1);
        assert_eq!(actor.following, 1);

        let notifications = backend.notification_rows();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, "u2");

        // Unfollow settles the counters back down.
        engagement
            .toggle_follow(Some("u1"), "u2")
            .await
            .unwrap_or_else(|e| panic!("untoggle: {e}"));
        let target = backend.profile_row("u2").unwrap_or_else(|| panic!("target"));
        assert_eq!(target.followers, 0);
        assert_eq!(backend.notification_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_observation_queries_once_then_caches() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);

        assert_eq!(
            engagement.relation_state(RelationKind::Follow, "u1", "u2"),
            RelationState::Unknown
        );

        for _ in 0..3 {
            engagement
                .following("u1", "u2")
                .await
                .unwrap_or_else(|e| panic!("observe: {e}"));
        }
        assert_eq!(backend.call_count("relationships.exists"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_toggle_rejects_reentrant_toggle() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = Arc::new(service(&backend));
        let post = backend.seed_post("p1", "u2", "hello", 60);

        // Warm the cache, then make the insert hang in flight.
        assert!(!engagement
            .liked("u1", "p1")
            .await
            .unwrap_or_else(|e| panic!("observe: {e}")));
        backend.delay("likes.insert", std::time::Duration::from_millis(100));

        let first = tokio::spawn({
            let engagement = engagement.clone();
            let post = post.clone();
            async move { engagement.toggle_like(Some("u1"), &post).await }
        });
        tokio::task::yield_now().await;

        // While the first toggle is pending, its optimistic flip is visible
        // and a second toggle for the same pair is rejected.
        assert_eq!(
            engagement.relation_state(RelationKind::Like, "u1", "p1"),
            RelationState::PendingToggle { prior: false }
        );
        let error = engagement
            .toggle_like(Some("u1"), &post)
            .await
            .expect_err("re-entrant toggle must be rejected");
        assert!(matches!(error, AppError::Conflict(_)));

        tokio::time::advance(std::time::Duration::from_millis(150)).await;
        let liked = first
            .await
            .unwrap_or_else(|e| panic!("join: {e}"))
            .unwrap_or_else(|e| panic!("first toggle: {e}"));
        assert!(liked);
        assert_eq!(backend.like_rows().len(), 1);
    }

    #[tokio::test]
    async fn test_counter_refresh_failure_does_not_fail_the_toggle() {
        let backend = MemoryBackend::shared();
        seed_users(&backend);
        let engagement = service(&backend);
        let post = backend.seed_post("p1", "u2", "hello", 60);

        backend.fail_once("likes.count_for_post");
        let liked = engagement
            .toggle_like(Some("u1"), &post)
            .await
            .unwrap_or_else(|e| panic!("toggle must succeed: {e}"));

        assert!(liked);
        assert_eq!(backend.like_rows().len(), 1);
        // The notification still went out.
        assert_eq!(backend.notification_rows().len(), 1);
    }
}
