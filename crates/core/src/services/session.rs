//! Session/identity provider.
//!
//! Process-wide, single-owner container for the authenticated identity and
//! its cached profile. Dependent views observe changes through a watch
//! channel, and a background listener re-synchronizes the snapshot when the
//! backend reports externally-triggered session changes (token refresh,
//! expiry) — the one genuinely event-driven piece of the client.

use std::sync::Arc;

use murmur_backend::{
    AuthClient, AuthEvent, AuthUser, Profile, ProfileChanges, ProfileRepository, SignUpMetadata,
};
use murmur_common::{AppError, AppResult};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use validator::Validate;

/// What every dependent view renders from: the identity and its profile.
#[derive(Debug, Clone, Default)]
pub struct AuthSnapshot {
    /// The authenticated identity, if any.
    pub user: Option<AuthUser>,
    /// Cached profile for the identity; may lag briefly after sign-up while
    /// the backend provisions the row.
    pub profile: Option<Profile>,
}

impl AuthSnapshot {
    /// Whether an identity is established.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    /// The authenticated user id, if any.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }
}

/// Validated sign-up input.
#[derive(Debug, Clone, Validate)]
pub struct SignUpInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    #[validate(length(min = 3, max = 32))]
    pub username: String,
    #[validate(length(min = 1, max = 100))]
    pub full_name: String,
}

/// Validated profile update; only set fields are written.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateProfileInput {
    #[validate(length(min = 3, max = 32))]
    pub username: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub full_name: Option<String>,
    /// Storage path of an uploaded avatar.
    pub avatar: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    pub is_private: Option<bool>,
}

impl UpdateProfileInput {
    fn into_changes(self) -> ProfileChanges {
        ProfileChanges {
            username: self.username,
            full_name: self.full_name,
            avatar: self.avatar,
            bio: self.bio,
            is_private: self.is_private,
        }
    }
}

/// Session/identity provider.
pub struct SessionService {
    auth: AuthClient,
    profiles: ProfileRepository,
    snapshot: watch::Sender<AuthSnapshot>,
}

impl SessionService {
    /// Create a new session service; the snapshot starts unauthenticated.
    #[must_use]
    pub fn new(auth: AuthClient, profiles: ProfileRepository) -> Self {
        let (snapshot, _) = watch::channel(AuthSnapshot::default());
        Self {
            auth,
            profiles,
            snapshot,
        }
    }

    /// Restore a persisted/remote session at startup.
    ///
    /// Any failure here is logged and treated as unauthenticated — fail open
    /// to logged-out, never to logged-in.
    pub async fn initialize(&self) {
        match self.auth.current_session().await {
            Some(session) => {
                let profile = self.fetch_profile(&session.user.id).await;
                self.snapshot.send_replace(AuthSnapshot {
                    user: Some(session.user),
                    profile,
                });
            }
            None => {
                self.snapshot.send_replace(AuthSnapshot::default());
            }
        }
    }

    /// Submit credentials; on success the snapshot carries the identity and
    /// profile. On failure the state stays unauthenticated and the error is
    /// surfaced.
    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<()> {
        let session = self.auth.sign_in(email, password).await?;

        let profile = self.fetch_profile(&session.user.id).await;
        self.snapshot.send_replace(AuthSnapshot {
            user: Some(session.user),
            profile,
        });
        Ok(())
    }

    /// Create an identity; the backend provisions the profile row from the
    /// sign-up metadata.
    pub async fn sign_up(&self, input: SignUpInput) -> AppResult<()> {
        input.validate()?;

        let session = self
            .auth
            .sign_up(
                &input.email,
                &input.password,
                SignUpMetadata {
                    username: input.username,
                    full_name: input.full_name,
                },
            )
            .await?;

        // Provisioning may lag; a missing row right after sign-up is not an
        // error.
        let profile = self.fetch_profile(&session.user.id).await;
        self.snapshot.send_replace(AuthSnapshot {
            user: Some(session.user),
            profile,
        });
        Ok(())
    }

    /// End the session. Local state clears even when the remote call fails;
    /// the failure is still returned for display.
    pub async fn sign_out(&self) -> AppResult<()> {
        let result = self.auth.sign_out().await;
        self.snapshot.send_replace(AuthSnapshot::default());
        result
    }

    /// Merge fields into the profile via a targeted update, then re-fetch
    /// the canonical row — the optimistic merge is never trusted as final.
    pub async fn update_profile(&self, input: UpdateProfileInput) -> AppResult<Profile> {
        input.validate()?;

        let user_id = self
            .current()
            .user_id()
            .map(ToString::to_string)
            .ok_or(AppError::AuthRequired)?;

        self.profiles
            .update(&user_id, &input.into_changes())
            .await?;

        let canonical = self
            .profiles
            .by_id(&user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("profile {user_id}")))?;

        self.snapshot.send_modify(|snapshot| {
            snapshot.profile = Some(canonical.clone());
        });
        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(canonical)
    }

    /// Current snapshot.
    #[must_use]
    pub fn current(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    /// Spawn the background listener that re-synchronizes the snapshot on
    /// externally-triggered session changes.
    pub fn spawn_listener(self: Arc<Self>) -> JoinHandle<()> {
        let service = self;
        let mut events = service.auth.events();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(AuthEvent::SignedOut) => {
                        service.snapshot.send_replace(AuthSnapshot::default());
                    }
                    Ok(AuthEvent::SignedIn | AuthEvent::TokenRefreshed) => {
                        service.resync().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Auth event stream lagged; re-synchronizing");
                        service.resync().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Re-derive the snapshot from the backend's current session.
    async fn resync(&self) {
        match self.auth.current_session().await {
            Some(session) => {
                let profile = self.fetch_profile(&session.user.id).await;
                self.snapshot.send_replace(AuthSnapshot {
                    user: Some(session.user),
                    profile,
                });
            }
            None => {
                self.snapshot.send_replace(AuthSnapshot::default());
            }
        }
    }

    /// Fetch the profile for an identity; failures degrade to `None` so a
    /// profile hiccup never blocks authentication itself.
    async fn fetch_profile(&self, user_id: &str) -> Option<Profile> {
        match self.profiles.by_id(user_id).await {
            Ok(profile) => {
                if profile.is_none() {
                    tracing::debug!(user_id = %user_id, "No profile row yet for identity");
                }
                profile
            }
            Err(error) => {
                tracing::warn!(user_id = %user_id, error = %error, "Profile fetch failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use murmur_backend::test_support::{MemoryBackend, test_session};

    fn service(backend: &Arc<MemoryBackend>) -> SessionService {
        SessionService::new(backend.clone(), backend.clone())
    }

    fn sign_up_input() -> SignUpInput {
        SignUpInput {
            email: "jane@example.test".to_string(),
            password: "correct-horse".to_string(),
            username: "jane".to_string(),
            full_name: "Jane Doe".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_up_establishes_identity_and_profile() {
        let backend = MemoryBackend::shared();
        let session = service(&backend);

        session
            .sign_up(sign_up_input())
            .await
            .unwrap_or_else(|e| panic!("sign up: {e}"));

        let snapshot = session.current();
        assert!(snapshot.is_authenticated());
        let profile = snapshot.profile.unwrap_or_else(|| panic!("profile"));
        assert_eq!(profile.username, "jane");
    }

    #[tokio::test]
    async fn test_sign_up_rejects_invalid_input_before_any_call() {
        let backend = MemoryBackend::shared();
        let session = service(&backend);

        let mut input = sign_up_input();
        input.email = "not-an-email".to_string();
        let error = session
            .sign_up(input)
            .await
            .expect_err("invalid email must fail");

        assert!(matches!(error, AppError::Validation(_)));
        assert!(backend.calls().is_empty());
        assert!(!session.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_failed_sign_in_leaves_state_unauthenticated() {
        let backend = MemoryBackend::shared();
        backend.register_account("jane@example.test", "correct-horse", "u1");
        let session = service(&backend);

        let error = session
            .sign_in("jane@example.test", "wrong")
            .await
            .expect_err("bad password must fail");
        assert!(matches!(error, AppError::RemoteRejected { .. }));
        assert!(!session.current().is_authenticated());

        session
            .sign_in("jane@example.test", "correct-horse")
            .await
            .unwrap_or_else(|e| panic!("sign in: {e}"));
        assert_eq!(session.current().user_id(), Some("u1"));
    }

    #[tokio::test]
    async fn test_sign_out_clears_local_state_even_on_remote_failure() {
        let backend = MemoryBackend::shared();
        backend.register_account("jane@example.test", "correct-horse", "u1");
        let session = service(&backend);
        session
            .sign_in("jane@example.test", "correct-horse")
            .await
            .unwrap_or_else(|e| panic!("sign in: {e}"));

        backend.fail_once("auth.sign_out");
        let result = session.sign_out().await;

        assert!(result.is_err());
        assert!(!session.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_update_profile_refetches_canonical_row() {
        let backend = MemoryBackend::shared();
        let session = service(&backend);
        session
            .sign_up(sign_up_input())
            .await
            .unwrap_or_else(|e| panic!("sign up: {e}"));

        let updated = session
            .update_profile(UpdateProfileInput {
                bio: Some("hello there".to_string()),
                ..UpdateProfileInput::default()
            })
            .await
            .unwrap_or_else(|e| panic!("update: {e}"));

        assert_eq!(updated.bio.as_deref(), Some("hello there"));
        assert_eq!(
            session.current().profile.and_then(|p| p.bio),
            Some("hello there".to_string())
        );
        // The canonical row was re-read after the targeted update.
        assert!(backend.call_count("profiles.by_id") >= 1);
    }

    #[tokio::test]
    async fn test_update_profile_requires_authentication() {
        let backend = MemoryBackend::shared();
        let session = service(&backend);

        let error = session
            .update_profile(UpdateProfileInput {
                bio: Some("hello".to_string()),
                ..UpdateProfileInput::default()
            })
            .await
            .expect_err("anonymous update must fail");
        assert!(matches!(error, AppError::AuthRequired));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_restores_existing_session() {
        let backend = MemoryBackend::shared();
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));
        backend.push_session(
            Some(test_session("u1", Utc::now() + chrono::Duration::hours(1))),
            murmur_backend::AuthEvent::SignedIn,
        );

        let session = service(&backend);
        session.initialize().await;

        let snapshot = session.current();
        assert_eq!(snapshot.user_id(), Some("u1"));
        assert_eq!(
            snapshot.profile.map(|p| p.username),
            Some("jane".to_string())
        );
    }

    #[tokio::test]
    async fn test_expired_session_fails_open_to_logged_out() {
        let backend = MemoryBackend::shared();
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));
        backend.push_session(
            Some(test_session("u1", Utc::now() - chrono::Duration::hours(1))),
            murmur_backend::AuthEvent::SignedIn,
        );

        let session = service(&backend);
        session.initialize().await;

        assert!(!session.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_listener_resyncs_on_external_session_change() {
        let backend = MemoryBackend::shared();
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));
        let session = Arc::new(service(&backend));
        let mut updates = session.subscribe();
        let listener = session.clone().spawn_listener();

        // An externally-established session (another tab, token refresh).
        backend.push_session(
            Some(test_session("u1", Utc::now() + chrono::Duration::hours(1))),
            murmur_backend::AuthEvent::TokenRefreshed,
        );

        updates
            .changed()
            .await
            .unwrap_or_else(|e| panic!("snapshot change: {e}"));
        assert_eq!(session.current().user_id(), Some("u1"));

        // External sign-out clears the snapshot without a local call.
        backend.push_session(None, murmur_backend::AuthEvent::SignedOut);
        updates
            .changed()
            .await
            .unwrap_or_else(|e| panic!("snapshot change: {e}"));
        assert!(!session.current().is_authenticated());

        listener.abort();
    }
}
