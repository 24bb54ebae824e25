//! One-shot feed aggregation.
//!
//! For every post four independent reads run concurrently: comment count,
//! liked-by-me, saved-by-me and the like edges themselves. Posts are fanned
//! out with a bounded window, so a page of N posts costs roughly 4N store
//! round trips. That is a latency/cost trade against a single join and is
//! the first place to look if feed loads get slow.

use futures::{stream, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::core::{PostId, TargetId, UserId};
use crate::engine::edge_index::EdgeIndex;
use crate::error::AppResult;
use crate::infrastructure::{EdgeFilter, SocialStore};
use crate::models::{EdgeKind, PostStats, PostViewModel};

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub page_size: usize,
    /// Posts whose reads may be in flight at once
    pub fanout_concurrency: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            fanout_concurrency: 16,
        }
    }
}

pub struct FeedAggregator {
    store: Arc<dyn SocialStore>,
    config: FeedConfig,
}

impl FeedAggregator {
    pub fn new(store: Arc<dyn SocialStore>, config: FeedConfig) -> Self {
        Self { store, config }
    }

    /// Newest posts with the viewer's derived figures, in createdAt
    /// descending order whatever order the per-post reads finish in
    #[instrument(skip(self), fields(user = %current_user))]
    pub async fn load_feed(&self, current_user: &UserId) -> AppResult<Vec<PostViewModel>> {
        let posts = self.store.list_posts(self.config.page_size).await?;
        debug!(posts = posts.len(), "loading feed");

        let concurrency = self.config.fanout_concurrency.max(1);
        stream::iter(posts)
            .map(|post| {
                let store = self.store.clone();
                let user = current_user.clone();
                async move {
                    let stats = post_stats(store.as_ref(), &post.id, &user).await?;
                    Ok::<_, crate::error::AppError>(PostViewModel { post, stats })
                }
            })
            // `buffered` keeps input order
            .buffered(concurrency)
            .try_collect()
            .await
    }
}

/// The four concurrent reads behind one post's figures
pub async fn post_stats(
    store: &dyn SocialStore,
    post_id: &PostId,
    current_user: &UserId,
) -> AppResult<PostStats> {
    let target: TargetId = post_id.into();
    let liked_filter = EdgeFilter::pair(EdgeKind::Like, current_user.clone(), target.clone());
    let saved_filter = EdgeFilter::pair(EdgeKind::Save, current_user.clone(), target.clone());
    let likes_filter = EdgeFilter::target(EdgeKind::Like, target.clone());

    let (comment_count, is_liked_by_me, is_saved_by_me, likes) = tokio::try_join!(
        store.count_comments(post_id),
        store.edge_exists(&liked_filter),
        store.edge_exists(&saved_filter),
        store.query_edges(&likes_filter),
    )?;

    let index = EdgeIndex::build(EdgeKind::Like, &likes);
    Ok(PostStats {
        like_count: index.count(&target),
        is_liked_by_me,
        is_saved_by_me,
        comment_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EdgeId;
    use crate::infrastructure::{ContentStore, MemoryStore, RelationStore};
    use crate::models::{Comment, NewEdge, Post, TargetType};
    use chrono::{Duration, TimeZone, Utc};

    async fn seed(store: &MemoryStore, count: usize) -> Vec<PostId> {
        let base = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut ids = Vec::new();
        for i in 0..count {
            let id = PostId::new(format!("p{}", i));
            store
                .insert_post(Post {
                    id: id.clone(),
                    author_id: "alice".into(),
                    content: format!("post {}", i),
                    media: vec![],
                    created_at: base + Duration::minutes(i as i64),
                })
                .await;
            ids.push(id);
        }
        ids
    }

    #[tokio::test]
    async fn test_feed_orders_newest_first_with_stats() {
        let store = Arc::new(MemoryStore::new());
        let ids = seed(&store, 3).await;

        store
            .create_edge(NewEdge::like("bob".into(), (&ids[0]).into(), TargetType::Post))
            .await
            .unwrap();
        store
            .create_edge(NewEdge::like("alice".into(), (&ids[0]).into(), TargetType::Post))
            .await
            .unwrap();
        store
            .create_edge(NewEdge::save("alice".into(), ids[1].clone()))
            .await
            .unwrap();
        store
            .insert_comment(Comment {
                id: "c1".into(),
                post_id: ids[0].clone(),
                author_id: "bob".into(),
                content: "nice".into(),
                created_at: Utc::now(),
            })
            .await;

        let feed = FeedAggregator::new(store.clone(), FeedConfig::default());
        let items = feed.load_feed(&"alice".into()).await.unwrap();

        let order: Vec<&str> = items.iter().map(|i| i.post.id.as_str()).collect();
        assert_eq!(order, vec!["p2", "p1", "p0"]);

        let p0 = &items[2].stats;
        assert_eq!(p0.like_count, 2);
        assert!(p0.is_liked_by_me);
        assert!(!p0.is_saved_by_me);
        assert_eq!(p0.comment_count, 1);

        assert!(items[1].stats.is_saved_by_me);
        assert_eq!(items[0].stats, PostStats::default());
    }

    #[tokio::test]
    async fn test_feed_respects_page_size_and_narrow_fanout() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 10).await;

        let feed = FeedAggregator::new(
            store.clone(),
            FeedConfig {
                page_size: 4,
                fanout_concurrency: 1,
            },
        );
        let items = feed.load_feed(&"bob".into()).await.unwrap();
        let order: Vec<&str> = items.iter().map(|i| i.post.id.as_str()).collect();
        assert_eq!(order, vec!["p9", "p8", "p7", "p6"]);
    }

    #[tokio::test]
    async fn test_duplicate_likes_count_once() {
        let store = Arc::new(MemoryStore::new());
        let ids = seed(&store, 1).await;
        for _ in 0..2 {
            store
                .insert_edge(
                    NewEdge::like("bob".into(), (&ids[0]).into(), TargetType::Post)
                        .into_edge(EdgeId::generate(), Utc::now()),
                )
                .await;
        }

        let stats = post_stats(store.as_ref(), &ids[0], &"bob".into()).await.unwrap();
        assert_eq!(stats.like_count, 1);
        assert!(stats.is_liked_by_me);
    }
}
