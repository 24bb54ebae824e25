// Store Decorators - cross-cutting concerns layered around any social store
// TracedStore adds spans, timing and per-operation counters without touching
// the backend.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::core::{CommentId, EdgeId, PostId};
use crate::error::AppResult;
use crate::infrastructure::content_store::ContentStore;
use crate::infrastructure::relation_store::{EdgeFilter, RelationStore};
use crate::infrastructure::subscription::{SnapshotSink, Subscription};
use crate::models::{Comment, Edge, EdgeKind, NewComment, NewEdge, NewPost, Post};

#[derive(Debug, Clone, Default, Serialize)]
pub struct OperationStats {
    pub calls: u64,
    pub failures: u64,
    pub total_time_ms: f64,
    pub max_time_ms: f64,
}

/// Wraps a store and records every call
#[derive(Debug, Clone)]
pub struct TracedStore<S> {
    inner: S,
    stats: Arc<RwLock<HashMap<&'static str, OperationStats>>>,
    slow_threshold: Duration,
}

impl<S> TracedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(RwLock::new(HashMap::new())),
            slow_threshold: Duration::from_millis(250),
        }
    }

    pub async fn stats(&self) -> HashMap<&'static str, OperationStats> {
        self.stats.read().await.clone()
    }

    async fn record_operation(&self, operation: &'static str, start: Instant, success: bool) {
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;

        if !success {
            warn!(operation, elapsed_ms, "store operation failed");
        } else if elapsed > self.slow_threshold {
            warn!(operation, elapsed_ms, "slow store operation");
        } else {
            debug!(operation, elapsed_ms, "store operation");
        }

        let mut stats = self.stats.write().await;
        let entry = stats.entry(operation).or_default();
        entry.calls += 1;
        if !success {
            entry.failures += 1;
        }
        entry.total_time_ms += elapsed_ms;
        if elapsed_ms > entry.max_time_ms {
            entry.max_time_ms = elapsed_ms;
        }
    }
}

#[async_trait]
impl<S: RelationStore> RelationStore for TracedStore<S> {
    #[instrument(skip(self, edge), fields(kind = %edge.kind, user = %edge.user_id, target = %edge.target_id))]
    async fn create_edge(&self, edge: NewEdge) -> AppResult<EdgeId> {
        let start = Instant::now();
        let result = self.inner.create_edge(edge).await;
        self.record_operation("create_edge", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self, filter), fields(kind = %filter.kind))]
    async fn query_edges(&self, filter: &EdgeFilter) -> AppResult<Vec<Edge>> {
        let start = Instant::now();
        let result = self.inner.query_edges(filter).await;
        self.record_operation("query_edges", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self), fields(edge = %edge_id))]
    async fn delete_edge(&self, kind: EdgeKind, edge_id: &EdgeId) -> AppResult<()> {
        let start = Instant::now();
        let result = self.inner.delete_edge(kind, edge_id).await;
        self.record_operation("delete_edge", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self, filter, sink), fields(kind = %filter.kind))]
    async fn subscribe_edges(
        &self,
        filter: EdgeFilter,
        sink: SnapshotSink<Edge>,
    ) -> AppResult<Subscription> {
        let start = Instant::now();
        let result = self.inner.subscribe_edges(filter, sink).await;
        self.record_operation("subscribe_edges", start, result.is_ok()).await;
        result
    }

    async fn count_edges(&self, filter: &EdgeFilter) -> AppResult<u64> {
        let start = Instant::now();
        let result = self.inner.count_edges(filter).await;
        self.record_operation("count_edges", start, result.is_ok()).await;
        result
    }

    async fn edge_exists(&self, filter: &EdgeFilter) -> AppResult<bool> {
        let start = Instant::now();
        let result = self.inner.edge_exists(filter).await;
        self.record_operation("edge_exists", start, result.is_ok()).await;
        result
    }
}

#[async_trait]
impl<S: ContentStore> ContentStore for TracedStore<S> {
    #[instrument(skip(self, post), fields(author = %post.author_id))]
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let start = Instant::now();
        let result = self.inner.create_post(post).await;
        self.record_operation("create_post", start, result.is_ok()).await;
        result
    }

    async fn get_post(&self, post_id: &PostId) -> AppResult<Option<Post>> {
        let start = Instant::now();
        let result = self.inner.get_post(post_id).await;
        self.record_operation("get_post", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self))]
    async fn list_posts(&self, limit: usize) -> AppResult<Vec<Post>> {
        let start = Instant::now();
        let result = self.inner.list_posts(limit).await;
        self.record_operation("list_posts", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self, comment), fields(post = %comment.post_id, author = %comment.author_id))]
    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let start = Instant::now();
        let result = self.inner.create_comment(comment).await;
        self.record_operation("create_comment", start, result.is_ok()).await;
        result
    }

    async fn get_comment(&self, comment_id: &CommentId) -> AppResult<Option<Comment>> {
        let start = Instant::now();
        let result = self.inner.get_comment(comment_id).await;
        self.record_operation("get_comment", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self), fields(comment = %comment_id))]
    async fn delete_comment(&self, comment_id: &CommentId) -> AppResult<()> {
        let start = Instant::now();
        let result = self.inner.delete_comment(comment_id).await;
        self.record_operation("delete_comment", start, result.is_ok()).await;
        result
    }

    async fn query_comments(&self, post_id: &PostId) -> AppResult<Vec<Comment>> {
        let start = Instant::now();
        let result = self.inner.query_comments(post_id).await;
        self.record_operation("query_comments", start, result.is_ok()).await;
        result
    }

    async fn count_comments(&self, post_id: &PostId) -> AppResult<u64> {
        let start = Instant::now();
        let result = self.inner.count_comments(post_id).await;
        self.record_operation("count_comments", start, result.is_ok()).await;
        result
    }

    #[instrument(skip(self, sink), fields(post = %post_id))]
    async fn subscribe_comments(
        &self,
        post_id: PostId,
        sink: SnapshotSink<Comment>,
    ) -> AppResult<Subscription> {
        let start = Instant::now();
        let result = self.inner.subscribe_comments(post_id, sink).await;
        self.record_operation("subscribe_comments", start, result.is_ok()).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::memory_store::MemoryStore;
    use crate::models::TargetType;

    #[tokio::test]
    async fn test_traced_store_counts_calls_and_failures() {
        let store = TracedStore::new(MemoryStore::new());

        store
            .create_edge(NewEdge::like("alice".into(), "p1".into(), TargetType::Post))
            .await
            .unwrap();
        let _ = store.delete_edge(EdgeKind::Like, &EdgeId::new("missing")).await;

        let stats = store.stats().await;
        assert_eq!(stats["create_edge"].calls, 1);
        assert_eq!(stats["create_edge"].failures, 0);
        assert_eq!(stats["delete_edge"].failures, 1);
    }
}
