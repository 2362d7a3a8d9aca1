//! Authentication API and session types.
//!
//! The backend hosts credential handling entirely; this module only submits
//! credentials, stores the returned session and republishes session changes
//! as [`AuthEvent`]s so dependent state can re-synchronize without user
//! action.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use murmur_common::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

use crate::client::Backend;
use crate::rest::{deserialize_ok, expect_ok};

/// Leeway before the recorded expiry at which a token counts as expired, so
/// a request issued just under the wire does not race the backend's clock.
const EXPIRY_LEEWAY_SECS: i64 = 30;

/// The authenticated principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// An established session; held only in memory for the session lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: AuthUser,
}

impl Session {
    /// Whether the access token is past (or within leeway of) its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_LEEWAY_SECS) >= self.expires_at
    }
}

/// Session-change events published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// Profile seed recorded as identity metadata at sign-up; the backend
/// provisions the profile row from it.
#[derive(Debug, Clone, Serialize)]
pub struct SignUpMetadata {
    pub username: String,
    pub full_name: String,
}

/// Wire shape of the token endpoints.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    /// Lifetime in seconds from issuance.
    expires_in: i64,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at: Utc::now() + Duration::seconds(self.expires_in),
            user: self.user,
        }
    }
}

/// Authentication surface consumed by the session provider.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Create an identity with a profile seed and establish a session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> AppResult<Session>;

    /// Submit credentials and establish a session.
    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session>;

    /// End the session.
    ///
    /// Local session state is cleared and `SignedOut` is published even when
    /// the remote call fails; the failure is still returned so callers can
    /// surface it.
    async fn sign_out(&self) -> AppResult<()>;

    /// The current session, refreshed transparently when expired; `None`
    /// when signed out or unrefreshable.
    async fn current_session(&self) -> Option<Session>;

    /// Subscribe to session-change events.
    fn events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Shared auth client handle.
pub type AuthClient = Arc<dyn AuthApi>;

/// HTTP implementation of [`AuthApi`] over the backend's auth endpoints.
#[derive(Clone)]
pub struct HttpAuth {
    backend: Backend,
}

impl Backend {
    /// Handle to the auth endpoints.
    #[must_use]
    pub fn auth(&self) -> HttpAuth {
        HttpAuth {
            backend: self.clone(),
        }
    }

    /// Exchange the refresh token of an expired session for a fresh one and
    /// store it. Used both by explicit refresh and transparently before
    /// requests.
    pub(crate) async fn refresh_stored_session(&self, stale: &Session) -> AppResult<Session> {
        let url = self.endpoint("auth/v1/token?grant_type=refresh_token")?;
        let response = self
            .inner
            .http
            .post(url)
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(&self.inner.anon_key)
            .json(&json!({ "refresh_token": stale.refresh_token }))
            .send()
            .await?;

        let token: TokenResponse = deserialize_ok(response).await?;
        let session = token.into_session();
        self.store_session(Some(session.clone()), AuthEvent::TokenRefreshed)
            .await;
        Ok(session)
    }
}

impl HttpAuth {
    async fn token_request(&self, body: serde_json::Value) -> AppResult<Session> {
        let url = self
            .backend
            .endpoint("auth/v1/token?grant_type=password")?;
        let response = self
            .backend
            .inner
            .http
            .post(url)
            .header("apikey", &self.backend.inner.anon_key)
            .bearer_auth(&self.backend.inner.anon_key)
            .json(&body)
            .send()
            .await?;

        let token: TokenResponse = deserialize_ok(response).await?;
        Ok(token.into_session())
    }
}

#[async_trait]
impl AuthApi for HttpAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: SignUpMetadata,
    ) -> AppResult<Session> {
        let url = self.backend.endpoint("auth/v1/signup")?;
        let response = self
            .backend
            .inner
            .http
            .post(url)
            .header("apikey", &self.backend.inner.anon_key)
            .bearer_auth(&self.backend.inner.anon_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": metadata,
            }))
            .send()
            .await?;

        let body: serde_json::Value = deserialize_ok(response).await?;
        if body.get("access_token").is_none() {
            // The project has email confirmation enabled; no session exists
            // until the user confirms.
            return Err(AppError::RemoteRejected {
                status: 200,
                message: "Account created; email confirmation required before sign-in"
                    .to_string(),
            });
        }

        let token: TokenResponse = serde_json::from_value(body)?;
        let session = token.into_session();
        self.backend
            .store_session(Some(session.clone()), AuthEvent::SignedIn)
            .await;

        tracing::info!(user_id = %session.user.id, "Signed up");
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Session> {
        let session = self
            .token_request(json!({ "email": email, "password": password }))
            .await?;

        self.backend
            .store_session(Some(session.clone()), AuthEvent::SignedIn)
            .await;

        tracing::info!(user_id = %session.user.id, "Signed in");
        Ok(session)
    }

    async fn sign_out(&self) -> AppResult<()> {
        let stored = self.backend.session().await;

        let remote = match stored {
            Some(session) => async {
                let url = self.backend.endpoint("auth/v1/logout")?;
                let response = self
                    .backend
                    .inner
                    .http
                    .post(url)
                    .header("apikey", &self.backend.inner.anon_key)
                    .bearer_auth(&session.access_token)
                    .send()
                    .await?;
                expect_ok(response).await
            }
            .await,
            None => Ok(()),
        };

        // Clear locally no matter what the backend said; a client that still
        // believes it is signed in after requesting sign-out is worse than a
        // server-side session that outlives it.
        self.backend.store_session(None, AuthEvent::SignedOut).await;

        if let Err(ref error) = remote {
            tracing::warn!(error = %error, "Remote sign-out failed; local session cleared");
        }
        remote
    }

    async fn current_session(&self) -> Option<Session> {
        let session = self.backend.session().await?;
        if !session.is_expired() {
            return Some(session);
        }

        match self.backend.refresh_stored_session(&session).await {
            Ok(fresh) => Some(fresh),
            Err(error) => {
                // Fail open to logged-out, never to logged-in.
                tracing::warn!(error = %error, "Session refresh failed; treating as signed out");
                self.backend.store_session(None, AuthEvent::SignedOut).await;
                None
            }
        }
    }

    fn events(&self) -> broadcast::Receiver<AuthEvent> {
        self.backend.auth_events()
    }
}
