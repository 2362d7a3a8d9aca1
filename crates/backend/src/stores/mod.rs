//! Per-table store traits and their HTTP implementations.
//!
//! Services hold `Arc<dyn …>` handles so the in-memory backend from
//! `test_support` can stand in for the remote service in tests. Every
//! mutation targets a single row by primary key or unique relationship
//! tuple; the backend's constraints are the enforcement point for
//! uniqueness, and implementations surface violations as `Conflict`.

pub mod comments;
pub mod likes;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod relationships;

use std::sync::Arc;

use async_trait::async_trait;
use murmur_common::AppResult;

use crate::records::{
    Comment, NewComment, NewNotification, NewPost, Notification, PageCursor, Post, Profile,
    ProfileChanges, ProfileCounters,
};

pub use comments::HttpCommentStore;
pub use likes::HttpLikeStore;
pub use notifications::HttpNotificationStore;
pub use posts::HttpPostStore;
pub use profiles::HttpProfileStore;
pub use relationships::HttpRelationshipStore;

/// Reads and targeted writes on the `profiles` table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn by_id(&self, id: &str) -> AppResult<Option<Profile>>;

    /// Resolve by unique username; `None` is the distinct not-found state.
    async fn by_username(&self, username: &str) -> AppResult<Option<Profile>>;

    /// Merge the set fields into the row; callers re-fetch the canonical row
    /// afterwards rather than trusting the merge.
    async fn update(&self, id: &str, changes: &ProfileChanges) -> AppResult<()>;

    /// Write recomputed denormalized counters.
    async fn set_counters(&self, id: &str, counters: &ProfileCounters) -> AppResult<()>;

    /// Case-insensitive substring match on username or full name.
    async fn search(&self, needle: &str, limit: u64) -> AppResult<Vec<Profile>>;

    /// Most recently created profiles.
    async fn recent(&self, limit: u64) -> AppResult<Vec<Profile>>;
}

/// Reads and targeted writes on the `posts` table.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Newest-first page of posts with joined owner profiles.
    async fn feed_page(&self, limit: u64, before: Option<&PageCursor>) -> AppResult<Vec<Post>>;

    /// Newest-first page of one user's posts.
    async fn by_user(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
    ) -> AppResult<Vec<Post>>;

    /// Newest-first page of one user's posts carrying media.
    async fn media_by_user(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
    ) -> AppResult<Vec<Post>>;

    /// Posts by id set; callers must short-circuit empty id sets.
    async fn by_ids(&self, ids: &[String]) -> AppResult<Vec<Post>>;

    async fn get(&self, id: &str) -> AppResult<Option<Post>>;

    async fn insert(&self, row: &NewPost) -> AppResult<Post>;

    /// Delete by id; owner checks happen in the service layer and the
    /// backend's row policies are the real enforcement.
    async fn delete(&self, id: &str) -> AppResult<()>;

    /// Write a recomputed like counter.
    async fn set_like_count(&self, id: &str, likes: i64) -> AppResult<()>;

    /// Write a recomputed comment counter.
    async fn set_comment_count(&self, id: &str, comments: i64) -> AppResult<()>;

    async fn count_by_user(&self, user_id: &str) -> AppResult<u64>;

    /// Case-insensitive substring match on post text.
    async fn search_text(&self, needle: &str, limit: u64) -> AppResult<Vec<Post>>;
}

/// The `post_likes` relationship table; at most one row per
/// `(post_id, user_id)`.
#[async_trait]
pub trait LikeStore: Send + Sync {
    async fn exists(&self, post_id: &str, user_id: &str) -> AppResult<bool>;

    /// Insert the relationship row; a duplicate insert is a `Conflict`.
    async fn insert(&self, post_id: &str, user_id: &str) -> AppResult<()>;

    /// Delete the relationship row; deleting an absent row is a no-op.
    async fn delete(&self, post_id: &str, user_id: &str) -> AppResult<()>;

    /// True relationship count for a post.
    async fn count_for_post(&self, post_id: &str) -> AppResult<u64>;

    /// Ids of all posts the user has liked.
    async fn post_ids_liked_by(&self, user_id: &str) -> AppResult<Vec<String>>;
}

/// The `user_relationships` follow table; at most one row per ordered
/// `(follower_id, following_id)` pair. Self-follow prevention is
/// server-side.
#[async_trait]
pub trait RelationshipStore: Send + Sync {
    async fn exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool>;

    /// Insert the follow edge; a duplicate insert is a `Conflict`.
    async fn insert(&self, follower_id: &str, following_id: &str) -> AppResult<()>;

    /// Delete the follow edge; deleting an absent edge is a no-op.
    async fn delete(&self, follower_id: &str, following_id: &str) -> AppResult<()>;

    async fn count_followers(&self, user_id: &str) -> AppResult<u64>;

    async fn count_following(&self, user_id: &str) -> AppResult<u64>;

    /// Ids of all users this user follows.
    async fn following_ids(&self, follower_id: &str) -> AppResult<Vec<String>>;
}

/// The `notifications` table.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, row: &NewNotification) -> AppResult<Notification>;

    /// Newest-first page of a recipient's notifications.
    async fn list(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>>;

    /// Bulk-mark all of a recipient's notifications read; returns how many
    /// rows changed.
    async fn mark_all_read(&self, user_id: &str) -> AppResult<u64>;

    async fn count_unread(&self, user_id: &str) -> AppResult<u64>;
}

/// The `comments` table.
#[async_trait]
pub trait CommentStore: Send + Sync {
    /// Oldest-first comments for a post with joined author profiles.
    async fn for_post(&self, post_id: &str, limit: u64) -> AppResult<Vec<Comment>>;

    async fn insert(&self, row: &NewComment) -> AppResult<Comment>;

    async fn count_for_post(&self, post_id: &str) -> AppResult<u64>;
}

/// Shared store handles held by services.
pub type ProfileRepository = Arc<dyn ProfileStore>;
pub type PostRepository = Arc<dyn PostStore>;
pub type LikeRepository = Arc<dyn LikeStore>;
pub type RelationshipRepository = Arc<dyn RelationshipStore>;
pub type NotificationRepository = Arc<dyn NotificationStore>;
pub type CommentRepository = Arc<dyn CommentStore>;
