//! Notification inbox and creation helpers.

use murmur_backend::{
    NewNotification, Notification, NotificationKind, NotificationRepository, PageCursor,
};
use murmur_common::{AppResult, IdGenerator};

/// Notification service: the recipient-facing inbox plus the creation
/// helpers the interaction services call as a side effect of likes, follows
/// and comments.
pub struct NotificationService {
    store: NotificationRepository,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(store: NotificationRepository) -> Self {
        Self {
            store,
            id_gen: IdGenerator::new(),
        }
    }

    /// Notify a post owner that their post was liked.
    ///
    /// Returns `None` without touching the backend when the actor is the
    /// owner; nobody needs a notification about their own action.
    pub async fn notify_like(
        &self,
        post_owner_id: &str,
        actor_id: &str,
        post_id: &str,
    ) -> AppResult<Option<Notification>> {
        self.create(post_owner_id, actor_id, NotificationKind::Like, Some(post_id))
            .await
    }

    /// Notify a user that they gained a follower.
    pub async fn notify_follow(
        &self,
        target_id: &str,
        actor_id: &str,
    ) -> AppResult<Option<Notification>> {
        self.create(target_id, actor_id, NotificationKind::Follow, None)
            .await
    }

    /// Notify a post owner that their post was commented on.
    pub async fn notify_comment(
        &self,
        post_owner_id: &str,
        actor_id: &str,
        post_id: &str,
    ) -> AppResult<Option<Notification>> {
        self.create(
            post_owner_id,
            actor_id,
            NotificationKind::Comment,
            Some(post_id),
        )
        .await
    }

    async fn create(
        &self,
        recipient_id: &str,
        actor_id: &str,
        kind: NotificationKind,
        content_id: Option<&str>,
    ) -> AppResult<Option<Notification>> {
        if recipient_id == actor_id {
            return Ok(None);
        }

        let row = NewNotification {
            id: self.id_gen.generate(),
            user_id: recipient_id.to_string(),
            kind,
            initiator_id: actor_id.to_string(),
            content_id: content_id.map(ToString::to_string),
            is_read: false,
        };

        let notification = self.store.insert(&row).await?;
        tracing::debug!(
            recipient_id = %recipient_id,
            initiator_id = %actor_id,
            kind = ?kind,
            "Created notification"
        );
        Ok(Some(notification))
    }

    /// Newest-first page of a recipient's notifications.
    pub async fn list(
        &self,
        user_id: &str,
        limit: u64,
        before: Option<&PageCursor>,
        unread_only: bool,
    ) -> AppResult<Vec<Notification>> {
        self.store.list(user_id, limit, before, unread_only).await
    }

    /// Count unread notifications for a recipient.
    pub async fn unread_count(&self, user_id: &str) -> AppResult<u64> {
        self.store.count_unread(user_id).await
    }

    /// Mark every notification of a recipient read; returns how many rows
    /// changed.
    pub async fn mark_all_read(&self, user_id: &str) -> AppResult<u64> {
        self.store.mark_all_read(user_id).await
    }
}
