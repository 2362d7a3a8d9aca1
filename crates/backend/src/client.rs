//! The configured backend handle shared by every sub-client.

use std::sync::Arc;
use std::time::Duration;

use murmur_common::{AppError, AppResult, config::BackendConfig};
use reqwest::RequestBuilder;
use tokio::sync::{RwLock, broadcast};
use url::Url;

use crate::auth::{AuthEvent, Session};

/// Capacity of the auth event channel; events are tiny and listeners drain
/// them promptly.
const AUTH_EVENT_CAPACITY: usize = 16;

pub(crate) struct BackendInner {
    pub(crate) http: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) anon_key: String,
    pub(crate) session: RwLock<Option<Session>>,
    pub(crate) auth_events: broadcast::Sender<AuthEvent>,
}

/// One configured handle to the hosted backend.
///
/// Cheap to clone; all clones share the HTTP connection pool and the current
/// session, so a token refresh performed by one sub-client is visible to all
/// of them.
#[derive(Clone)]
pub struct Backend {
    pub(crate) inner: Arc<BackendInner>,
}

impl Backend {
    /// Build a backend handle from configuration.
    pub fn connect(config: &BackendConfig) -> AppResult<Self> {
        let base_url = Url::parse(&config.url)?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(BackendInner {
                http,
                base_url,
                anon_key: config.anon_key.clone(),
                session: RwLock::new(None),
                auth_events,
            }),
        })
    }

    /// Subscribe to session-change events (sign-in, sign-out, refresh).
    #[must_use]
    pub fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.auth_events.subscribe()
    }

    /// Snapshot of the currently stored session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.inner.session.read().await.clone()
    }

    /// Replace the stored session and notify subscribers.
    pub(crate) async fn store_session(&self, session: Option<Session>, event: AuthEvent) {
        {
            let mut slot = self.inner.session.write().await;
            *slot = session;
        }
        // Send fails only when nobody is listening, which is fine.
        let _ = self.inner.auth_events.send(event);
    }

    /// Resolve a path relative to the backend base URL.
    pub(crate) fn endpoint(&self, path: &str) -> AppResult<Url> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| AppError::Config(format!("Invalid endpoint {path}: {e}")))
    }

    /// The bearer token for the next request: the signed-in user's access
    /// token when present (refreshed transparently if expired), the anon key
    /// otherwise.
    pub(crate) async fn bearer_token(&self) -> String {
        let session = self.inner.session.read().await.clone();
        match session {
            Some(s) if !s.is_expired() => s.access_token,
            Some(s) => match self.refresh_stored_session(&s).await {
                Ok(fresh) => fresh.access_token,
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        "Token refresh failed; request will use anonymous credentials"
                    );
                    self.inner.anon_key.clone()
                }
            },
            None => self.inner.anon_key.clone(),
        }
    }

    /// Attach the `apikey` and `Authorization` headers every backend endpoint
    /// expects.
    pub(crate) async fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.bearer_token().await;
        builder
            .header("apikey", &self.inner.anon_key)
            .bearer_auth(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BackendConfig {
        BackendConfig {
            url: "https://backend.test".into(),
            anon_key: "anon-key".into(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }

    #[tokio::test]
    async fn test_bearer_falls_back_to_anon_key() {
        let backend =
            Backend::connect(&test_config()).unwrap_or_else(|e| panic!("connect: {e}"));
        assert_eq!(backend.bearer_token().await, "anon-key");
    }

    #[test]
    fn test_endpoint_join() {
        let backend =
            Backend::connect(&test_config()).unwrap_or_else(|e| panic!("connect: {e}"));
        let url = backend
            .endpoint("rest/v1/posts")
            .unwrap_or_else(|e| panic!("endpoint: {e}"));
        assert_eq!(url.as_str(), "https://backend.test/rest/v1/posts");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let mut config = test_config();
        config.url = "not a url".into();
        assert!(Backend::connect(&config).is_err());
    }
}
