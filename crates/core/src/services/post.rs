//! Post composition, deletion and comments.

use std::sync::Arc;

use murmur_backend::{
    Comment, CommentRepository, NewComment, NewPost, Post, PostRepository, ProfileCounters,
    ProfileRepository,
};
use murmur_common::{AppError, AppResult, config::StorageConfig};
use tokio::sync::Mutex;

use crate::services::notifications::NotificationService;
use crate::services::uploads::{UploadService, UploadSource};

/// Everything a new post carries before upload.
#[derive(Debug, Clone, Default)]
pub struct CreatePostInput {
    pub text: String,
    /// Image files to upload, in display order.
    pub images: Vec<UploadSource>,
    /// At most one video.
    pub video: Option<UploadSource>,
    pub is_private: bool,
}

/// One file that failed during a batch upload; the post may still have been
/// created from the files that succeeded.
#[derive(Debug)]
pub struct UploadFailure {
    /// Original file name.
    pub name: String,
    /// Why it failed.
    pub error: AppError,
}

/// A created post plus the per-file upload failures, if any.
#[derive(Debug)]
pub struct CreatedPost {
    pub post: Post,
    /// Empty when every file uploaded.
    pub failed_uploads: Vec<UploadFailure>,
}

/// Post composer and per-post comment operations.
pub struct PostService {
    posts: PostRepository,
    comments: CommentRepository,
    profiles: ProfileRepository,
    uploads: Arc<UploadService>,
    notifications: Arc<NotificationService>,
    storage: StorageConfig,
    /// Held for the duration of a submission; a second submission while one
    /// is pending is a duplicate, not a queue.
    submitting: Mutex<()>,
}

impl PostService {
    /// Create a new post service.
    #[must_use]
    pub fn new(
        posts: PostRepository,
        comments: CommentRepository,
        profiles: ProfileRepository,
        uploads: Arc<UploadService>,
        notifications: Arc<NotificationService>,
        storage: StorageConfig,
    ) -> Self {
        Self {
            posts,
            comments,
            profiles,
            uploads,
            notifications,
            storage,
            submitting: Mutex::new(()),
        }
    }

    /// Create a post.
    ///
    /// An empty post (no text, no images, no video) is rejected before any
    /// upload or insert call. Media uploads report per-file outcomes: the
    /// post is created from the successful uploads and the failures ride
    /// along in the result.
    pub async fn create(
        &self,
        actor_id: Option<&str>,
        input: CreatePostInput,
    ) -> AppResult<CreatedPost> {
        let text = input.text.trim().to_string();
        if text.is_empty() && input.images.is_empty() && input.video.is_none() {
            return Err(AppError::Validation(
                "a post needs text, an image or a video".to_string(),
            ));
        }

        let actor_id = actor_id.ok_or(AppError::AuthRequired)?;

        let _guard = self.submitting.try_lock().map_err(|_| {
            AppError::Conflict("a post submission is already in progress".to_string())
        })?;

        let mut failed_uploads = Vec::new();

        let mut image_paths = Vec::with_capacity(input.images.len());
        for outcome in self
            .uploads
            .upload_many(&input.images, &self.storage.image_bucket, actor_id)
            .await
        {
            match outcome.result {
                Ok(path) => image_paths.push(path),
                Err(error) => failed_uploads.push(UploadFailure {
                    name: outcome.name,
                    error,
                }),
            }
        }

        let video_path = match input.video {
            Some(source) => match self
                .uploads
                .upload(&source, &self.storage.video_bucket, actor_id)
                .await
            {
                Ok(path) => Some(path),
                Err(error) => {
                    tracing::warn!(name = %source.name, error = %error, "Video upload failed");
                    failed_uploads.push(UploadFailure {
                        name: source.name,
                        error,
                    });
                    None
                }
            },
            None => None,
        };

        if text.is_empty() && image_paths.is_empty() && video_path.is_none() {
            // Every upload failed and there is no text; nothing left to post.
            return Err(failed_uploads.pop().map_or_else(
                || AppError::Validation("a post needs text, an image or a video".to_string()),
                |failure| failure.error,
            ));
        }

        let post = self
            .posts
            .insert(&NewPost {
                user_id: actor_id.to_string(),
                text,
                images: image_paths,
                video: video_path,
                is_private: input.is_private,
            })
            .await?;

        self.refresh_post_counter(actor_id).await;

        tracing::info!(post_id = %post.id, user_id = %actor_id, "Created post");
        Ok(CreatedPost {
            post,
            failed_uploads,
        })
    }

    /// Delete a post. Owner-only; stored media is removed best-effort after
    /// the row.
    pub async fn delete(&self, actor_id: Option<&str>, post: &Post) -> AppResult<()> {
        let actor_id = actor_id.ok_or(AppError::AuthRequired)?;
        if actor_id != post.user_id {
            return Err(AppError::Forbidden(
                "only the owner can delete a post".to_string(),
            ));
        }

        self.posts.delete(&post.id).await?;

        for image in &post.images {
            if let Err(error) = self.uploads.delete(image, &self.storage.image_bucket).await {
                tracing::warn!(path = %image, error = %error, "Image cleanup failed");
            }
        }
        if let Some(ref video) = post.video {
            if let Err(error) = self.uploads.delete(video, &self.storage.video_bucket).await {
                tracing::warn!(path = %video, error = %error, "Video cleanup failed");
            }
        }

        self.refresh_post_counter(actor_id).await;
        tracing::info!(post_id = %post.id, "Deleted post");
        Ok(())
    }

    /// Oldest-first comments for a post with joined author profiles.
    pub async fn comments(&self, post_id: &str, limit: u64) -> AppResult<Vec<Comment>> {
        self.comments.for_post(post_id, limit).await
    }

    /// Add a comment; notifies the post owner (unless commenting on one's
    /// own post) and recounts the post's comment counter.
    pub async fn add_comment(
        &self,
        actor_id: Option<&str>,
        post: &Post,
        text: &str,
    ) -> AppResult<Comment> {
        let actor_id = actor_id.ok_or(AppError::AuthRequired)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::Validation("a comment needs text".to_string()));
        }

        let comment = self
            .comments
            .insert(&NewComment {
                post_id: post.id.clone(),
                user_id: actor_id.to_string(),
                text: text.to_string(),
            })
            .await?;

        match self.comments.count_for_post(&post.id).await {
            Ok(count) => {
                if let Err(error) = self.posts.set_comment_count(&post.id, count as i64).await {
                    tracing::warn!(post_id = %post.id, error = %error, "Comment counter write failed");
                }
            }
            Err(error) => {
                tracing::warn!(post_id = %post.id, error = %error, "Comment recount failed");
            }
        }

        if let Err(error) = self
            .notifications
            .notify_comment(&post.user_id, actor_id, &post.id)
            .await
        {
            tracing::warn!(post_id = %post.id, error = %error, "Comment notification failed");
        }

        Ok(comment)
    }

    /// Best-effort recount of the owner's posts counter.
    async fn refresh_post_counter(&self, user_id: &str) {
        let refresh = async {
            let count = self.posts.count_by_user(user_id).await?;
            self.profiles
                .set_counters(
                    user_id,
                    &ProfileCounters {
                        posts: Some(count as i64),
                        ..ProfileCounters::default()
                    },
                )
                .await
        };
        if let Err(error) = refresh.await {
            tracing::warn!(user_id = %user_id, error = %error, "Post counter refresh failed");
        }
    }
}
