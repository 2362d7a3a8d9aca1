//! Row types exchanged with the backend's table endpoints.
//!
//! The client never owns persisted state; these records are transient,
//! possibly-stale projections of backend rows. Reads may be wide (joined
//! profile projections), writes always target single rows by primary key or
//! unique relationship tuple.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public-facing user record, one-to-one with an authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Same value as the owning identity's id.
    pub id: String,
    /// Unique handle.
    pub username: String,
    pub full_name: String,
    /// Storage path or absolute URL; resolved lazily at render time.
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    /// Denormalized counter; may drift from the relationship rows.
    #[serde(default)]
    pub followers: i64,
    /// Denormalized counter; may drift from the relationship rows.
    #[serde(default)]
    pub following: i64,
    /// Denormalized counter; may drift from the post rows.
    #[serde(default)]
    pub posts: i64,
    pub created_at: DateTime<Utc>,
}

/// Targeted profile update; only set fields are written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
}

/// Recomputed denormalized counters for a profile; only set fields are
/// written.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileCounters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub following: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posts: Option<i64>,
}

impl ProfileCounters {
    /// True when no counter is set (nothing to write).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.followers.is_none() && self.following.is_none() && self.posts.is_none()
    }
}

/// A post row, optionally carrying the joined owner profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// Owner id.
    pub user_id: String,
    #[serde(default)]
    pub text: String,
    /// Ordered storage paths.
    #[serde(default)]
    pub images: Vec<String>,
    /// Storage path, if the post carries a video.
    #[serde(default)]
    pub video: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_private: bool,
    /// Denormalized counter; the `post_likes` rows are the source of truth.
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub comments: i64,
    #[serde(default)]
    pub shares: i64,
    /// Joined, read-only owner projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

impl Post {
    /// Whether the post carries any media.
    #[must_use]
    pub fn has_media(&self) -> bool {
        !self.images.is_empty() || self.video.is_some()
    }
}

/// Insert payload for a new post; the backend assigns id and timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct NewPost {
    pub user_id: String,
    pub text: String,
    pub images: Vec<String>,
    pub video: Option<String>,
    pub is_private: bool,
}

/// Notification categories, mirroring the backend's `type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Follow,
    Mention,
    Share,
}

/// A notification row addressed to a recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    /// Recipient.
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// The user whose action produced this notification.
    pub initiator_id: String,
    /// Related content (post id for likes/comments/mentions).
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification; ids are client-minted ULIDs.
#[derive(Debug, Clone, Serialize)]
pub struct NewNotification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub initiator_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    pub is_read: bool,
}

/// A comment row, optionally carrying the joined author profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,
}

/// Insert payload for a comment.
#[derive(Debug, Clone, Serialize)]
pub struct NewComment {
    pub post_id: String,
    pub user_id: String,
    pub text: String,
}

/// Keyset cursor for timestamp-descending pagination.
///
/// Rows strictly older than `(created_at, id)` belong to the next page; the
/// id tiebreak keeps rows created in the same instant from being skipped or
/// repeated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl PageCursor {
    /// Cursor pointing just past the given feed row.
    #[must_use]
    pub fn after_post(post: &Post) -> Self {
        Self {
            created_at: post.created_at,
            id: post.id.clone(),
        }
    }

    /// Cursor pointing just past the given notification row.
    #[must_use]
    pub fn after_notification(notification: &Notification) -> Self {
        Self {
            created_at: notification.created_at,
            id: notification.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_has_media() {
        let mut post = Post {
            id: "p1".into(),
            user_id: "u1".into(),
            text: "hello".into(),
            images: vec![],
            video: None,
            created_at: Utc::now(),
            is_private: false,
            likes: 0,
            comments: 0,
            shares: 0,
            profile: None,
        };
        assert!(!post.has_media());

        post.images.push("u1/a.jpg".into());
        assert!(post.has_media());

        post.images.clear();
        post.video = Some("u1/clip.mp4".into());
        assert!(post.has_media());
    }

    #[test]
    fn test_notification_kind_wire_names() {
        let json = serde_json::to_string(&NotificationKind::Follow)
            .unwrap_or_else(|e| panic!("serialize: {e}"));
        assert_eq!(json, "\"follow\"");

        let kind: NotificationKind = serde_json::from_str("\"like\"")
            .unwrap_or_else(|e| panic!("deserialize: {e}"));
        assert_eq!(kind, NotificationKind::Like);
    }

    #[test]
    fn test_notification_type_column_rename() {
        let row = NewNotification {
            id: "n1".into(),
            user_id: "u2".into(),
            kind: NotificationKind::Like,
            initiator_id: "u1".into(),
            content_id: Some("p1".into()),
            is_read: false,
        };
        let value = serde_json::to_value(&row).unwrap_or_else(|e| panic!("serialize: {e}"));
        assert_eq!(value["type"], "like");
        assert!(value.get("kind").is_none());
    }
}
