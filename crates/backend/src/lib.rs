//! Remote data client for murmur.
//!
//! This crate is the only boundary to the hosted backend service. It exposes:
//!
//! - [`Backend`]: one configured handle shared by every sub-client, owning
//!   the HTTP client, the base URL, the publishable API key and the current
//!   session.
//! - [`auth`]: the authentication API (sign-up, sign-in, sign-out, refresh)
//!   and the session-change event stream.
//! - [`rest`]: a typed query layer over the backend's REST table endpoints
//!   (filtered selects with embedded joins, inserts, keyed updates/deletes,
//!   exact counts).
//! - [`stores`]: per-table store traits with HTTP implementations; services
//!   hold `Arc<dyn …>` handles so tests can substitute the in-memory backend
//!   from [`test_support`].
//! - [`objects`]: the object-storage API (buckets, uploads, public URLs).

pub mod auth;
pub mod client;
pub mod objects;
pub mod records;
pub mod rest;
pub mod stores;

#[cfg(feature = "test-support")]
pub mod test_support;

pub use auth::{AuthApi, AuthClient, AuthEvent, AuthUser, HttpAuth, Session, SignUpMetadata};
pub use client::Backend;
pub use objects::{HttpObjectStore, ObjectRepository, ObjectStore};
pub use records::{
    Comment, NewComment, NewNotification, NewPost, Notification, NotificationKind, PageCursor,
    Post, Profile, ProfileChanges, ProfileCounters,
};
pub use stores::{
    CommentRepository, CommentStore, HttpCommentStore, HttpLikeStore, HttpNotificationStore,
    HttpPostStore, HttpProfileStore, HttpRelationshipStore, LikeRepository, LikeStore,
    NotificationRepository, NotificationStore, PostRepository, PostStore, ProfileRepository,
    ProfileStore, RelationshipRepository, RelationshipStore,
};
