//! In-memory backend for service tests.
//!
//! Implements every store trait plus [`AuthApi`] over in-memory tables with
//! the same uniqueness invariants as the remote service (duplicate
//! like/relationship inserts and bucket creations are conflicts). Every
//! operation is recorded so tests can assert that a path performed no remote
//! call, and named operations can be made to fail to exercise error
//! handling.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use murmur_common::{AppError, AppResult, IdGenerator};
use tokio::sync::broadcast;

use crate::auth::{AuthApi, AuthEvent, AuthUser, Session, SignUpMetadata};
use crate::objects::ObjectStore;
use crate::records::{
    Comment, NewComment, NewNotification, NewPost, Notification, PageCursor, Post, Profile,
    ProfileChanges, ProfileCounters,
};
use crate::stores::{
    CommentStore, LikeStore, NotificationStore, PostStore, ProfileStore, RelationshipStore,
};

#[derive(Debug, Clone)]
struct BucketSpec {
    #[allow(dead_code)]
    public: bool,
    size_limit: u64,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthUser,
}

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<String, Profile>,
    posts: Vec<Post>,
    likes: BTreeSet<(String, String)>,
    relationships: BTreeSet<(String, String)>,
    notifications: Vec<Notification>,
    comments: Vec<Comment>,
    buckets: HashMap<String, BucketSpec>,
    objects: HashMap<(String, String), usize>,
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    calls: Vec<String>,
    failures: HashMap<String, u32>,
    delays: HashMap<String, std::time::Duration>,
    hidden_bucket_checks: HashMap<String, u32>,
}

/// In-memory stand-in for the remote service.
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
    events: broadcast::Sender<AuthEvent>,
    id_gen: IdGenerator,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MemoryState::default()),
            events,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create an empty backend behind an `Arc`, ready to be handed to
    /// services as any of its store traits.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn record(&self, op: &str) -> AppResult<()> {
        let delay = {
            let mut state = self.state();
            state.calls.push(op.to_string());
            if let Some(remaining) = state.failures.get_mut(op) {
                *remaining -= 1;
                if *remaining == 0 {
                    state.failures.remove(op);
                }
                return Err(AppError::RemoteRejected {
                    status: 500,
                    message: format!("injected failure for {op}"),
                });
            }
            state.delays.get(op).copied()
        };
        if let Some(duration) = delay {
            tokio::time::sleep(duration).await;
        }
        Ok(())
    }

    // === test hooks ===

    /// Make the next `count` calls of the named operation fail.
    pub fn fail(&self, op: &str, count: u32) {
        if count > 0 {
            self.state().failures.insert(op.to_string(), count);
        }
    }

    /// Suspend every call of the named operation for the given duration, so
    /// tests can observe in-flight state.
    pub fn delay(&self, op: &str, duration: std::time::Duration) {
        self.state().delays.insert(op.to_string(), duration);
    }

    /// Make the next existence check for a bucket report it absent even when
    /// it exists, simulating a concurrent creator winning the
    /// check-then-create race.
    pub fn hide_bucket_once(&self, name: &str) {
        self.state()
            .hidden_bucket_checks
            .insert(name.to_string(), 1);
    }

    /// Make the next call of the named operation fail.
    pub fn fail_once(&self, op: &str) {
        self.fail(op, 1);
    }

    /// All recorded operation names, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// How many times the named operation was called.
    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.state().calls.iter().filter(|c| *c == op).count()
    }

    /// Seed a profile row.
    pub fn seed_profile(&self, profile: Profile) {
        self.state().profiles.insert(profile.id.clone(), profile);
    }

    /// Convenience profile with zeroed counters.
    #[must_use]
    pub fn profile(id: &str, username: &str) -> Profile {
        Profile {
            id: id.to_string(),
            username: username.to_string(),
            full_name: username.to_string(),
            avatar: None,
            bio: None,
            is_private: false,
            followers: 0,
            following: 0,
            posts: 0,
            created_at: Utc::now(),
        }
    }

    /// Seed a post row with an explicit age so ordering is deterministic.
    pub fn seed_post(&self, id: &str, user_id: &str, text: &str, age_secs: i64) -> Post {
        let post = Post {
            id: id.to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            images: Vec::new(),
            video: None,
            created_at: Utc::now() - Duration::seconds(age_secs),
            is_private: false,
            likes: 0,
            comments: 0,
            shares: 0,
            profile: None,
        };
        self.state().posts.push(post.clone());
        post
    }

    /// Seed a post row carrying media.
    pub fn seed_media_post(
        &self,
        id: &str,
        user_id: &str,
        images: &[&str],
        video: Option<&str>,
        age_secs: i64,
    ) -> Post {
        let mut post = self.seed_post(id, user_id, "", age_secs);
        {
            let mut state = self.state();
            if let Some(row) = state.posts.iter_mut().find(|p| p.id == id) {
                row.images = images.iter().map(ToString::to_string).collect();
                row.video = video.map(ToString::to_string);
                post = row.clone();
            }
        }
        post
    }

    /// Seed a like row directly, bypassing the client path.
    pub fn seed_like(&self, post_id: &str, user_id: &str) {
        self.state()
            .likes
            .insert((post_id.to_string(), user_id.to_string()));
    }

    /// Seed a follow edge directly, bypassing the client path.
    pub fn seed_relationship(&self, follower_id: &str, following_id: &str) {
        self.state()
            .relationships
            .insert((follower_id.to_string(), following_id.to_string()));
    }

    /// Seed a bucket.
    pub fn seed_bucket(&self, name: &str, size_limit: u64) {
        self.state().buckets.insert(
            name.to_string(),
            BucketSpec {
                public: true,
                size_limit,
            },
        );
    }

    /// Current like rows.
    #[must_use]
    pub fn like_rows(&self) -> Vec<(String, String)> {
        self.state().likes.iter().cloned().collect()
    }

    /// Current follow edges.
    #[must_use]
    pub fn relationship_rows(&self) -> Vec<(String, String)> {
        self.state().relationships.iter().cloned().collect()
    }

    /// Current notification rows.
    #[must_use]
    pub fn notification_rows(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    /// Stored object paths for a bucket.
    #[must_use]
    pub fn object_paths(&self, bucket: &str) -> Vec<String> {
        self.state()
            .objects
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Stored post row by id.
    #[must_use]
    pub fn post_row(&self, id: &str) -> Option<Post> {
        self.state().posts.iter().find(|p| p.id == id).cloned()
    }

    /// Stored profile row by id.
    #[must_use]
    pub fn profile_row(&self, id: &str) -> Option<Profile> {
        self.state().profiles.get(id).cloned()
    }

    /// Register a credentials-backed account.
    pub fn register_account(&self, email: &str, password: &str, user_id: &str) {
        self.state().accounts.insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user: AuthUser {
                    id: user_id.to_string(),
                    email: Some(email.to_string()),
                    created_at: Some(Utc::now()),
                },
            },
        );
    }

    /// Replace the stored session and publish the matching event, as an
    /// externally-triggered session change would.
    pub fn push_session(&self, session: Option<Session>, event: AuthEvent) {
        self.state().session = session;
        let _ = self.events.send(event);
    }

    fn make_session(&self, user: AuthUser) -> Session {
        Session {
            access_token: self.id_gen.generate_token(),
            refresh_token: self.id_gen.generate_token(),
            expires_at: Utc::now() + Duration::hours(1),
            user,
        }
    }

    fn joined_post(state: &MemoryState, post: &Post) -> Post {
        let mut post = post.clone();
        post.profile = state.profiles.get(&post.user_id).cloned();
        post
    }

    fn page_posts<F>(
        state: &MemoryState,
        limit: u64,
        before: Option<&PageCursor>,
        filter: F,
    ) -> Vec<Post>
    where
        F: Fn(&Post) -> bool,
    {
        let mut rows: Vec<Post> = state
            .posts
            .iter()
            .filter(|p| filter(p))
            .filter(|p| {
                before.is_none_or(|c| {
                    p.created_at < c.created_at
                        || (p.created_at == c.created_at && p.id < c.id)
                })
            })
            .map(|p| Self::joined_post(state, p))
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(limit as usize);
        rows
    }
}

#[async_trait]
impl ProfileStore for MemoryBackend {
    async fn by_id(&self, id: &str) -> AppResult<Option<Profile>> {
        self.record("profiles.by_id").await?;
        Ok(self.state().profiles.get(id).cloned())
    }

    async fn by_username(&self, username: &str) -> AppResult<Option<Profile>> {
        self.record("profiles.by_username").await?;
        Ok(self
            .state()
            .profiles
            .values()
            .find(|p| p.username == username)
            .cloned())
    }

    async fn update(&self, id: &str, changes: &ProfileChanges) -> AppResult<()> {
        self.record("profiles.update").await?;
        let mut state = self.state();
        let Some(profile) = state.profiles.get_mut(id) else {
            return Err(AppError::NotFound(format!("profile {id}")));
        };
        if let Some(ref username) = changes.username {
            profile.username = username.clone();
        }
        if let Some(ref full_name) = changes.full_name {
            profile.full_name = full_name.clone();
        }
        if let Some(ref avatar) = changes.avatar {
            profile.avatar = Some(avatar.clone());
        }
        if let Some(ref bio) = changes.bio {
            profile.bio = Some(bio.clone());
        }
        if let Some(is_private) = changes.is_private {
            profile.is_private = is_private;
        }
        Ok(())
    }

    async fn set_counters(&self, id: &str, counters: &ProfileCounters) -> AppResult<()> {
        self.record("profiles.set_counters").await?;
        let mut state = self.state();
        let Some(profile) = state.profiles.get_mut(id) else {
            return Err(AppError::NotFound(format!("profile {id}")));
        };
        if let Some(followers) = counters.followers {
            profile.followers = followers;
        }
        if let Some(following) = counters.following {
            profile.following = following;
        }
        if let Some(posts) = counters.posts {
            profile.posts = posts;
        }
        Ok(())
    }

    async fn search(&self, needle: &str, limit: u64) -> AppResult<Vec<Profile>> {
        self.record("profiles.search").await?;
        let needle = needle.to_lowercase();
        let mut rows: Vec<Profile> = self
            .state()
            .profiles
            .values()
            .filter(|p| {
                p.username.to_lowercase().contains(&needle)
                    || p.full_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.username.cmp(&b.username));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn recent(&self, limit: u64) -> AppResult<Vec<Profile>> {
        self.record("profiles.recent").await?;
        let mut rows: Vec<Profile> = self.state().profiles.values().cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl PostStore for MemoryBackend {
    async fn feed_page(&self, limit: u64, before: Option<&PageCursor>) -> AppResult<Vec<Post>> {
        self.record("posts.feed_page").await?;
        Ok(Self::page_posts(&self.state(), limit, before, |_| true))
    }

    async fn by_user(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
    ) -> AppResult<Vec<Post>> {
        self.record("posts.by_user").await?;
        Ok(Self::page_posts(&self.state(), limit, before, |p| {
            p.user_id == user_id
        }))
    }

    async fn media_by_user(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
    ) -> AppResult<Vec<Post>> {
        self.record("posts.media_by_user").await?;
        Ok(Self::page_posts(&self.state(), limit, before, |p| {
            p.user_id == user_id && p.has_media()
        }))
    }

    async fn by_ids(&self, ids: &[String]) -> AppResult<Vec<Post>> {
        self.record("posts.by_ids").await?;
        let state = self.state();
        let mut rows: Vec<Post> = state
            .posts
            .iter()
            .filter(|p| ids.contains(&p.id))
            .map(|p| Self::joined_post(&state, p))
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(rows)
    }

    async fn get(&self, id: &str) -> AppResult<Option<Post>> {
        self.record("posts.get").await?;
        let state = self.state();
        Ok(state
            .posts
            .iter()
            .find(|p| p.id == id)
            .map(|p| Self::joined_post(&state, p)))
    }

    async fn insert(&self, row: &NewPost) -> AppResult<Post> {
        self.record("posts.insert").await?;
        let post = Post {
            id: self.id_gen.generate(),
            user_id: row.user_id.clone(),
            text: row.text.clone(),
            images: row.images.clone(),
            video: row.video.clone(),
            created_at: Utc::now(),
            is_private: row.is_private,
            likes: 0,
            comments: 0,
            shares: 0,
            profile: None,
        };
        self.state().posts.push(post.clone());
        Ok(post)
    }

    async fn delete(&self, id: &str) -> AppResult<()> {
        self.record("posts.delete").await?;
        self.state().posts.retain(|p| p.id != id);
        Ok(())
    }

    async fn set_like_count(&self, id: &str, likes: i64) -> AppResult<()> {
        self.record("posts.set_like_count").await?;
        if let Some(post) = self.state().posts.iter_mut().find(|p| p.id == id) {
            post.likes = likes;
        }
        Ok(())
    }

    async fn set_comment_count(&self, id: &str, comments: i64) -> AppResult<()> {
        self.record("posts.set_comment_count").await?;
        if let Some(post) = self.state().posts.iter_mut().find(|p| p.id == id) {
            post.comments = comments;
        }
        Ok(())
    }

    async fn count_by_user(&self, user_id: &str) -> AppResult<u64> {
        self.record("posts.count_by_user").await?;
        Ok(self
            .state()
            .posts
            .iter()
            .filter(|p| p.user_id == user_id)
            .count() as u64)
    }

    async fn search_text(&self, needle: &str, limit: u64) -> AppResult<Vec<Post>> {
        self.record("posts.search_text").await?;
        let needle = needle.to_lowercase();
        let state = self.state();
        let mut rows: Vec<Post> = state
            .posts
            .iter()
            .filter(|p| p.text.to_lowercase().contains(&needle))
            .map(|p| Self::joined_post(&state, p))
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl LikeStore for MemoryBackend {
    async fn exists(&self, post_id: &str, user_id: &str) -> AppResult<bool> {
        self.record("likes.exists").await?;
        Ok(self
            .state()
            .likes
            .contains(&(post_id.to_string(), user_id.to_string())))
    }

    async fn insert(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.record("likes.insert").await?;
        let inserted = self
            .state()
            .likes
            .insert((post_id.to_string(), user_id.to_string()));
        if inserted {
            Ok(())
        } else {
            Err(AppError::Conflict(
                "duplicate key value violates unique constraint".to_string(),
            ))
        }
    }

    async fn delete(&self, post_id: &str, user_id: &str) -> AppResult<()> {
        self.record("likes.delete").await?;
        self.state()
            .likes
            .remove(&(post_id.to_string(), user_id.to_string()));
        Ok(())
    }

    async fn count_for_post(&self, post_id: &str) -> AppResult<u64> {
        self.record("likes.count_for_post").await?;
        Ok(self
            .state()
            .likes
            .iter()
            .filter(|(p, _)| p == post_id)
            .count() as u64)
    }

    async fn post_ids_liked_by(&self, user_id: &str) -> AppResult<Vec<String>> {
        self.record("likes.post_ids_liked_by").await?;
        Ok(self
            .state()
            .likes
            .iter()
            .filter(|(_, u)| u == user_id)
            .map(|(p, _)| p.clone())
            .collect())
    }
}

#[async_trait]
impl RelationshipStore for MemoryBackend {
    async fn exists(&self, follower_id: &str, following_id: &str) -> AppResult<bool> {
        self.record("relationships.exists").await?;
        Ok(self
            .state()
            .relationships
            .contains(&(follower_id.to_string(), following_id.to_string())))
    }

    async fn insert(&self, follower_id: &str, following_id: &str) -> AppResult<()> {
        self.record("relationships.insert").await?;
        let inserted = self
            .state()
            .relationships
            .insert((follower_id.to_string(), following_id.to_string()));
        if inserted {
            Ok(())
        } else {
            Err(AppError::Conflict(
                "duplicate key value violates unique constraint".to_string(),
            ))
        }
    }

    async fn delete(&self, follower_id: &str, following_id: &str) -> AppResult<()> {
        self.record("relationships.delete").await?;
        self.state()
            .relationships
            .remove(&(follower_id.to_string(), following_id.to_string()));
        Ok(())
    }

    async fn count_followers(&self, user_id: &str) -> AppResult<u64> {
        self.record("relationships.count_followers").await?;
        Ok(self
            .state()
            .relationships
            .iter()
            .filter(|(_, following)| following == user_id)
            .count() as u64)
    }

    async fn count_following(&self, user_id: &str) -> AppResult<u64> {
        self.record("relationships.count_following").await?;
        Ok(self
            .state()
            .relationships
            .iter()
            .filter(|(follower, _)| follower == user_id)
            .count() as u64)
    }

    async fn following_ids(&self, follower_id: &str) -> AppResult<Vec<String>> {
        self.record("relationships.following_ids").await?;
        Ok(self
            .state()
            .relationships
            .iter()
            .filter(|(follower, _)| follower == follower_id)
            .map(|(_, following)| following.clone())
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemoryBackend {
    async fn insert(&self, row: &NewNotification) -> AppResult<Notification> {
        self.record("notifications.insert").await?;
        let notification = Notification {
            id: row.id.clone(),
            user_id: row.user_id.clone(),
            kind: row.kind,
            initiator_id: row.initiator_id.clone(),
            content_id: row.content_id.clone(),
            is_read: row.is_read,
            created_at: Utc::now(),
        };
        self.state().notifications.push(notification.clone());
        Ok(notification)
    }

    async fn list(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>> {
        self.record("notifications.list").await?;
        let mut rows: Vec<Notification> = self
            .state()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .filter(|n| !unread_only || !n.is_read)
            .filter(|n| {
                before.is_none_or(|c| {
                    n.created_at < c.created_at
                        || (n.created_at == c.created_at && n.id < c.id)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.record("notifications.mark_all_read").await?;
        let mut changed = 0;
        for notification in self
            .state()
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user_id && !n.is_read)
        {
            notification.is_read = true;
            changed += 1;
        }
        Ok(changed)
    }

    async fn count_unread(&self, user_id: &str) -> AppResult<u64> {
        self.record("notifications.count_unread").await?;
        Ok(self
            .state()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as u64)
    }
}

#[async_trait]
impl CommentStore for MemoryBackend {
    async fn for_post(&self, post_id: &str, limit: u64) -> AppResult<Vec<Comment>> {
        self.record("comments.for_post").await?;
        let state = self.state();
        let mut rows: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .map(|mut c| {
                c.profile = state.profiles.get(&c.user_id).cloned();
                c
            })
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn insert(&self, row: &NewComment) -> AppResult<Comment> {
        self.record("comments.insert").await?;
        let comment = Comment {
            id: self.id_gen.generate(),
            post_id: row.post_id.clone(),
            user_id: row.user_id.clone(),
            text: row.text.clone(),
            created_at: Utc::now(),
            likes: 0,
            profile: None,
        };
        self.state().comments.push(comment.clone());
        Ok(comment)
    }

    async fn count_for_post(&self, post_id: &str) -> AppResult<u64> {
        self.record("comments.count_for_post").await?;
        Ok(self
            .state()
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .count() as u64)
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn list_buckets(&self) -> AppResult<Vec<String>> {
        self.record("objects.list_buckets").await?;
        Ok(self.state().buckets.keys().cloned().collect())
    }

    async fn bucket_exists(&self, name: &str) -> AppResult<bool> {
        self.record("objects.bucket_exists").await?;
        let mut state = self.state();
        if let Some(remaining) = state.hidden_bucket_checks.get_mut(name) {
            *remaining -= 1;
            if *remaining == 0 {
                state.hidden_bucket_checks.remove(name);
            }
            return Ok(false);
        }
        Ok(state.buckets.contains_key(name))
    }

    async fn create_bucket(&self, name: &str, public: bool, size_limit: u64) -> AppResult<()> {
        self.record("objects.create_bucket").await?;
        let mut state = self.state();
        if state.buckets.contains_key(name) {
            return Err(AppError::Conflict(format!("bucket {name} already exists")));
        }
        state
            .buckets
            .insert(name.to_string(), BucketSpec { public, size_limit });
        Ok(())
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        _content_type: &str,
    ) -> AppResult<()> {
        self.record("objects.upload").await?;
        let mut state = self.state();
        let Some(spec) = state.buckets.get(bucket) else {
            return Err(AppError::NotFound(format!("bucket {bucket}")));
        };
        if data.len() as u64 > spec.size_limit {
            return Err(AppError::RemoteRejected {
                status: 413,
                message: "payload exceeds the bucket size limit".to_string(),
            });
        }
        state
            .objects
            .insert((bucket.to_string(), path.to_string()), data.len());
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> AppResult<()> {
        self.record("objects.remove").await?;
        let mut state = self.state();
        for path in paths {
            state.objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl AuthApi for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> AppResult<Session> {
        self.record("auth.sign_up").await?;
        let user_id = self.id_gen.generate();
        let user = AuthUser {
            id: user_id.clone(),
            email: Some(email.to_string()),
            created_at: Some(Utc::now()),
        };

        {
            let mut state = self.state();
            if state.accounts.contains_key(email) {
                return Err(AppError::Conflict("email already registered".to_string()));
            }
            state.accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            // The remote service provisions the profile row from the
            // sign-up metadata.
            state.profiles.insert(
                user_id.clone(),
                Profile {
                    id: user_id.clone(),
                    username: metadata.username.clone(),
                    full_name: metadata.full_name.clone(),
                    avatar: None,
                    bio: None,
                    is_private: false,
                    followers: 0,
                    following: 0,
                    posts: 0,
                    created_at: Utc::now(),
                },
            );
        }

        let session = self.make_session(user);
        self.push_session(Some(session.clone()), AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        self.record("auth.sign_in").await?;
        let account = self.state().accounts.get(email).cloned();
        let Some(account) = account else {
            return Err(AppError::RemoteRejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            });
        };
        if account.password != password {
            return Err(AppError::RemoteRejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            });
        }

        let session = self.make_session(account.user);
        self.push_session(Some(session.clone()), AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> AppResult<()> {
        let result = self.record("auth.sign_out").await;
        // Mirrors the HTTP client: local state clears even when the remote
        // call failed.
        self.push_session(None, AuthEvent::SignedOut);
        result
    }

    async fn current_session(&self) -> Option<Session> {
        let session = self.state().session.clone()?;
        if session.is_expired() {
            self.push_session(None, AuthEvent::SignedOut);
            return None;
        }
        Some(session)
    }

    fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

/// Session helper for tests that need one without going through sign-in.
#[must_use]
pub fn test_session(user_id: &str, expires_at: DateTime<Utc>) -> Session {
    Session {
        access_token: "access".to_string(),
        refresh_token: "refresh".to_string(),
        expires_at,
        user: AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.test")),
            created_at: Some(Utc::now()),
        },
    }
}
