//! Debounced, cancellable search across profiles and posts.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use murmur_backend::{Post, PostRepository, Profile, ProfileRepository};
use murmur_common::config::SearchConfig;
use tokio::sync::watch;
use tokio::task::AbortHandle;

/// Results for one settled query; both sections are independent queries and
/// either can be empty on its own.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResults {
    /// The query these results answer.
    pub query: String,
    /// Profiles whose username or full name contains the query,
    /// case-insensitively.
    pub users: Vec<Profile>,
    /// Posts whose text contains the query, case-insensitively.
    pub posts: Vec<Post>,
}

/// Debounced search feed.
///
/// Raw keystrokes go in via [`SearchFeed::submit`]; settled results come out
/// of the watch channel from [`SearchFeed::subscribe`]. A new keystroke
/// inside the debounce window supersedes the previous one and aborts its
/// in-flight query, so a stale response can never overwrite a newer one.
pub struct SearchFeed {
    profiles: ProfileRepository,
    posts: PostRepository,
    debounce: Duration,
    limit: u64,
    results: watch::Sender<SearchResults>,
    in_flight: Mutex<Option<AbortHandle>>,
}

impl SearchFeed {
    /// Create a new search feed.
    #[must_use]
    pub fn new(profiles: ProfileRepository, posts: PostRepository, config: &SearchConfig) -> Self {
        let (results, _) = watch::channel(SearchResults::default());
        Self {
            profiles,
            posts,
            debounce: Duration::from_millis(config.debounce_ms),
            limit: config.result_limit,
            results,
            in_flight: Mutex::new(None),
        }
    }

    fn in_flight(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to settled results.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SearchResults> {
        self.results.subscribe()
    }

    /// The most recently settled results.
    #[must_use]
    pub fn latest(&self) -> SearchResults {
        self.results.borrow().clone()
    }

    /// Feed one keystroke's worth of raw input.
    ///
    /// The query runs only after the debounce window elapses with no newer
    /// submission; blank input settles to empty results without any backend
    /// traffic.
    pub fn submit(&self, raw: &str) {
        let mut slot = self.in_flight();
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let query = raw.trim().to_string();
        if query.is_empty() {
            self.results.send_replace(SearchResults::default());
            return;
        }

        let profiles = self.profiles.clone();
        let posts = self.posts.clone();
        let results = self.results.clone();
        let debounce = self.debounce;
        let limit = self.limit;

        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;

            let users = match profiles.search(&query, limit).await {
                Ok(users) => users,
                Err(error) => {
                    tracing::warn!(query = %query, error = %error, "Profile search failed");
                    Vec::new()
                }
            };
            let matching_posts = match posts.search_text(&query, limit).await {
                Ok(found) => found,
                Err(error) => {
                    tracing::warn!(query = %query, error = %error, "Post search failed");
                    Vec::new()
                }
            };

            results.send_replace(SearchResults {
                query,
                users,
                posts: matching_posts,
            });
        });

        *slot = Some(task.abort_handle());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_backend::test_support::MemoryBackend;
    use std::sync::Arc;
    use tokio::time::{advance, timeout};

    fn feed(backend: &Arc<MemoryBackend>) -> SearchFeed {
        SearchFeed::new(backend.clone(), backend.clone(), &SearchConfig::default())
    }

    fn seed(backend: &MemoryBackend) {
        let mut jane = MemoryBackend::profile("u1", "jane");
        jane.full_name = "Jane Doe".to_string();
        backend.seed_profile(jane);
        backend.seed_profile(MemoryBackend::profile("u2", "marco"));
        backend.seed_post("p1", "u2", "lunch with Jane today", 100);
        backend.seed_post("p2", "u2", "quiet evening", 50);
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_arrive_only_after_debounce_window() {
        let backend = MemoryBackend::shared();
        seed(&backend);
        let search = feed(&backend);
        let mut rx = search.subscribe();

        search.submit("jane");

        // Inside the window nothing has settled or been queried.
        advance(Duration::from_millis(150)).await;
        assert!(!rx.has_changed().unwrap_or_else(|e| panic!("channel: {e}")));
        assert_eq!(backend.call_count("profiles.search"), 0);

        advance(Duration::from_millis(200)).await;
        timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap_or_else(|e| panic!("timed out: {e}"))
            .unwrap_or_else(|e| panic!("channel: {e}"));

        let results = rx.borrow().clone();
        assert_eq!(results.query, "jane");
        assert_eq!(results.users.len(), 1);
        assert_eq!(results.users[0].username, "jane");
        assert_eq!(results.posts.len(), 1);
        assert_eq!(results.posts[0].id, "p1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_keystroke_supersedes_inflight_query() {
        let backend = MemoryBackend::shared();
        seed(&backend);
        let search = feed(&backend);
        let mut rx = search.subscribe();

        search.submit("mar");
        advance(Duration::from_millis(150)).await;
        // Superseded before its window elapsed; only the second query runs.
        search.submit("jane");
        advance(Duration::from_millis(350)).await;

        timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap_or_else(|e| panic!("timed out: {e}"))
            .unwrap_or_else(|e| panic!("channel: {e}"));

        let results = rx.borrow_and_update().clone();
        assert_eq!(results.query, "jane");
        assert_eq!(backend.call_count("profiles.search"), 1);

        // Nothing further settles for the aborted query.
        advance(Duration::from_millis(500)).await;
        assert!(!rx.has_changed().unwrap_or_else(|e| panic!("channel: {e}")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_matches_username_and_full_name_case_insensitively() {
        let backend = MemoryBackend::shared();
        seed(&backend);
        let search = feed(&backend);
        let mut rx = search.subscribe();

        search.submit("JANE");
        advance(Duration::from_millis(350)).await;
        timeout(Duration::from_secs(1), rx.changed())
            .await
            .unwrap_or_else(|e| panic!("timed out: {e}"))
            .unwrap_or_else(|e| panic!("channel: {e}"));

        let results = rx.borrow().clone();
        assert_eq!(results.users.len(), 1);
        assert_eq!(results.users[0].full_name, "Jane Doe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_blank_input_settles_empty_without_backend_traffic() {
        let backend = MemoryBackend::shared();
        seed(&backend);
        let search = feed(&backend);

        search.submit("   ");
        advance(Duration::from_millis(500)).await;

        assert_eq!(search.latest(), SearchResults::default());
        assert!(backend.calls().is_empty());
    }
}
