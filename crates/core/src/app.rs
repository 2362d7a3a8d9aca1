//! Composition root: wires every service over one backend handle.

use std::sync::Arc;

use murmur_backend::{
    AuthClient, Backend, CommentRepository, HttpCommentStore, HttpLikeStore,
    HttpNotificationStore, HttpPostStore, HttpProfileStore, HttpRelationshipStore,
    LikeRepository, NotificationRepository, ObjectRepository, PostRepository, ProfileRepository,
    RelationshipRepository,
};
use murmur_common::{AppResult, Config};
use tokio::task::JoinHandle;

use crate::services::{
    EngagementService, NotificationService, PostService, ProfileService, SearchFeed,
    SessionService, TimelineService, UploadService,
};

/// The assembled client core.
///
/// Presentation layers hold one of these and talk only to its services; the
/// backend handle and its HTTP stores stay an implementation detail.
pub struct App {
    /// Loaded configuration.
    pub config: Config,
    /// Session/identity provider.
    pub session: Arc<SessionService>,
    /// File storage helper.
    pub uploads: Arc<UploadService>,
    /// Like/follow reconciler.
    pub engagement: Arc<EngagementService>,
    /// Feed and profile-tab fetchers.
    pub timeline: Arc<TimelineService>,
    /// Profile resolution and suggestions.
    pub profiles: Arc<ProfileService>,
    /// Debounced search.
    pub search: Arc<SearchFeed>,
    /// Post composer.
    pub posts: Arc<PostService>,
    /// Notification inbox.
    pub notifications: Arc<NotificationService>,
    listener: JoinHandle<()>,
}

impl App {
    /// Build the service graph, restore any persisted session and start the
    /// auth event listener.
    pub async fn connect(config: Config) -> AppResult<Self> {
        let backend = Backend::connect(&config.backend)?;

        let auth: AuthClient = Arc::new(backend.auth());
        let objects: ObjectRepository = Arc::new(backend.objects());
        let profile_store: ProfileRepository = Arc::new(HttpProfileStore::new(backend.clone()));
        let post_store: PostRepository = Arc::new(HttpPostStore::new(backend.clone()));
        let like_store: LikeRepository = Arc::new(HttpLikeStore::new(backend.clone()));
        let relationship_store: RelationshipRepository =
            Arc::new(HttpRelationshipStore::new(backend.clone()));
        let notification_store: NotificationRepository =
            Arc::new(HttpNotificationStore::new(backend.clone()));
        let comment_store: CommentRepository = Arc::new(HttpCommentStore::new(backend.clone()));

        let uploads = Arc::new(UploadService::new(objects, config.storage.clone()));
        let notifications = Arc::new(NotificationService::new(notification_store));
        let engagement = Arc::new(EngagementService::new(
            like_store.clone(),
            relationship_store.clone(),
            post_store.clone(),
            profile_store.clone(),
            notifications.clone(),
        ));
        let timeline = Arc::new(TimelineService::new(
            post_store.clone(),
            like_store,
            config.feed.page_size,
        ));
        let profiles = Arc::new(ProfileService::new(
            profile_store.clone(),
            relationship_store,
            post_store.clone(),
        ));
        let search = Arc::new(SearchFeed::new(
            profile_store.clone(),
            post_store.clone(),
            &config.search,
        ));
        let posts = Arc::new(PostService::new(
            post_store,
            comment_store,
            profile_store.clone(),
            uploads.clone(),
            notifications.clone(),
            config.storage.clone(),
        ));
        let session = Arc::new(SessionService::new(auth, profile_store));

        session.initialize().await;
        let listener = session.clone().spawn_listener();

        tracing::info!(backend = %config.backend.url, "Client core ready");
        Ok(Self {
            config,
            session,
            uploads,
            engagement,
            timeline,
            profiles,
            search,
            posts,
            notifications,
            listener,
        })
    }

    /// Stop the background auth listener. Dropping the app without calling
    /// this merely detaches it.
    pub fn shutdown(self) {
        self.listener.abort();
    }
}
