//! Feed and profile-tab fetchers.

use murmur_backend::{LikeRepository, PageCursor, Post, PostRepository};
use murmur_common::AppResult;

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items in display order.
    pub items: Vec<T>,
    /// Cursor for the next page; `None` when this page was short, i.e. the
    /// listing is exhausted.
    pub next_cursor: Option<PageCursor>,
}

impl<T> Page<T> {
    /// An empty, exhausted page.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
        }
    }
}

/// Profile sub-feeds, each an independent query gated by the active tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileTab {
    /// Everything the user posted.
    Posts,
    /// Posts carrying at least one image or a video.
    Media,
    /// Posts the user has liked.
    Likes,
}

/// Feed and profile-tab fetching with keyset pagination.
pub struct TimelineService {
    posts: PostRepository,
    likes: LikeRepository,
    page_size: u64,
}

impl TimelineService {
    /// Create a new timeline service.
    #[must_use]
    pub const fn new(posts: PostRepository, likes: LikeRepository, page_size: u64) -> Self {
        Self {
            posts,
            likes,
            page_size,
        }
    }

    /// Newest-first feed page with joined owner profiles.
    pub async fn feed(&self, before: Option<&PageCursor>) -> AppResult<Page<Post>> {
        let items = self.posts.feed_page(self.page_size, before).await?;
        Ok(self.page_of(items))
    }

    /// One profile tab's page.
    ///
    /// The likes tab resolves the user's like rows first and short-circuits
    /// an empty id set to an empty page without issuing the post fetch — a
    /// membership filter over nothing would otherwise degenerate.
    pub async fn user_tab(
        &self,
        user_id: &str,
        tab: ProfileTab,
        before: Option<&PageCursor>,
    ) -> AppResult<Page<Post>> {
        match tab {
            ProfileTab::Posts => {
                let items = self.posts.by_user(user_id, self.page_size, before).await?;
                Ok(self.page_of(items))
            }
            ProfileTab::Media => {
                let items = self
                    .posts
                    .media_by_user(user_id, self.page_size, before)
                    .await?;
                Ok(self.page_of(items))
            }
            ProfileTab::Likes => {
                let liked_ids = self.likes.post_ids_liked_by(user_id).await?;
                if liked_ids.is_empty() {
                    return Ok(Page::empty());
                }
                let items = self.posts.by_ids(&liked_ids).await?;
                // The id set is bounded by the user's own likes; no cursor.
                Ok(Page {
                    items,
                    next_cursor: None,
                })
            }
        }
    }

    fn page_of(&self, items: Vec<Post>) -> Page<Post> {
        let next_cursor = if items.len() as u64 == self.page_size {
            items.last().map(PageCursor::after_post)
        } else {
            None
        };
        Page { items, next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_backend::test_support::MemoryBackend;
    use std::sync::Arc;

    fn service(backend: &Arc<MemoryBackend>, page_size: u64) -> TimelineService {
        TimelineService::new(backend.clone(), backend.clone(), page_size)
    }

    #[tokio::test]
    async fn test_feed_is_newest_first_with_joined_profiles() {
        let backend = MemoryBackend::shared();
        backend.seed_profile(MemoryBackend::profile("u1", "jane"));
        backend.seed_post("p1", "u1", "oldest", 300);
        backend.seed_post("p2", "u1", "middle", 200);
        backend.seed_post("p3", "u1", "newest", 100);

        let page = service(&backend, 20)
            .feed(None)
            .await
            .unwrap_or_else(|e| panic!("feed: {e}"));

        let ids: Vec<&str> = page.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2", "p1"]);
        assert!(page.next_cursor.is_none());
        let joined = page.items[0]
            .profile
            .as_ref()
            .unwrap_or_else(|| panic!("joined profile"));
        assert_eq!(joined.username, "jane");
    }

    #[tokio::test]
    async fn test_feed_pages_through_cursor_without_overlap() {
        let backend = MemoryBackend::shared();
        for i in 0..5 {
            backend.seed_post(&format!("p{i}"), "u1", "post", 600 - i * 60);
        }
        let timeline = service(&backend, 2);

        let first = timeline
            .feed(None)
            .await
            .unwrap_or_else(|e| panic!("page 1: {e}"));
        assert_eq!(first.items.len(), 2);
        let cursor = first
            .next_cursor
            .clone()
            .unwrap_or_else(|| panic!("full page needs a cursor"));

        let second = timeline
            .feed(Some(&cursor))
            .await
            .unwrap_or_else(|e| panic!("page 2: {e}"));
        assert_eq!(second.items.len(), 2);

        let third_cursor = second
            .next_cursor
            .clone()
            .unwrap_or_else(|| panic!("cursor"));
        let third = timeline
            .feed(Some(&third_cursor))
            .await
            .unwrap_or_else(|e| panic!("page 3: {e}"));
        assert_eq!(third.items.len(), 1);
        assert!(third.next_cursor.is_none());

        let mut seen: Vec<String> = first
            .items
            .into_iter()
            .chain(second.items)
            .chain(third.items)
            .map(|p| p.id)
            .collect();
        let total = seen.len();
        seen.dedup();
        assert_eq!(total, 5);
        assert_eq!(seen.len(), 5);
    }

    #[tokio::test]
    async fn test_media_tab_filters_to_posts_with_media() {
        let backend = MemoryBackend::shared();
        backend.seed_post("p1", "u1", "text only", 300);
        backend.seed_media_post("p2", "u1", &["u1/a.jpg"], None, 200);
        backend.seed_media_post("p3", "u1", &[], Some("u1/clip.mp4"), 100);
        backend.seed_media_post("p4", "u9", &["u9/b.jpg"], None, 50);

        let page = service(&backend, 20)
            .user_tab("u1", ProfileTab::Media, None)
            .await
            .unwrap_or_else(|e| panic!("media tab: {e}"));

        let ids: Vec<&str> = page.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p2"]);
    }

    #[tokio::test]
    async fn test_likes_tab_short_circuits_empty_id_set() {
        let backend = MemoryBackend::shared();
        backend.seed_post("p1", "u2", "hello", 100);
        let timeline = service(&backend, 20);

        let page = timeline
            .user_tab("u1", ProfileTab::Likes, None)
            .await
            .unwrap_or_else(|e| panic!("likes tab: {e}"));

        assert!(page.items.is_empty());
        // The like rows were read; the post fetch was skipped entirely.
        assert_eq!(backend.call_count("likes.post_ids_liked_by"), 1);
        assert_eq!(backend.call_count("posts.by_ids"), 0);
    }

    #[tokio::test]
    async fn test_likes_tab_resolves_liked_posts() {
        let backend = MemoryBackend::shared();
        backend.seed_post("p1", "u2", "first", 300);
        backend.seed_post("p2", "u3", "second", 200);
        backend.seed_post("p3", "u2", "third", 100);
        backend.seed_like("p1", "u1");
        backend.seed_like("p3", "u1");

        let page = service(&backend, 20)
            .user_tab("u1", ProfileTab::Likes, None)
            .await
            .unwrap_or_else(|e| panic!("likes tab: {e}"));

        let ids: Vec<&str> = page.items.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p3", "p1"]);
    }
}
