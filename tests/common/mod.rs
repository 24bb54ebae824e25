// Shared fixtures for integration tests: a store with injectable write
// failures and a gate that holds edge writes in flight.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use pawfeed::config::EngineConfig;
use pawfeed::core::{CommentId, EdgeId, PostId, UserId};
use pawfeed::engine::ThreadSession;
use pawfeed::error::{AppError, AppResult};
use pawfeed::infrastructure::{
    ContentStore, EdgeFilter, MemoryStore, RelationStore, SnapshotSink, Subscription,
};
use pawfeed::models::{Comment, Edge, EdgeKind, NewComment, NewEdge, NewPost, Post, ThreadView};
use pawfeed::services::SocialService;

pub struct FlakyStore {
    inner: MemoryStore,
    failing_writes: AtomicUsize,
    edge_writes: AtomicUsize,
    gate: Arc<RwLock<()>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing_writes: AtomicUsize::new(0),
            edge_writes: AtomicUsize::new(0),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// The next `n` edge writes fail with `TransientIo`
    pub fn fail_next_edge_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Edge writes block until the returned guard is dropped
    pub async fn hold_edge_writes(&self) -> OwnedRwLockWriteGuard<()> {
        self.gate.clone().write_owned().await
    }

    /// Edge writes that reached the inner store
    pub fn edge_writes(&self) -> usize {
        self.edge_writes.load(Ordering::SeqCst)
    }

    async fn edge_write(&self) -> AppResult<()> {
        let _open = self.gate.read().await;
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(AppError::TransientIo("injected write failure".to_string()));
        }
        self.edge_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl RelationStore for FlakyStore {
    async fn create_edge(&self, edge: NewEdge) -> AppResult<EdgeId> {
        self.edge_write().await?;
        self.inner.create_edge(edge).await
    }

    async fn query_edges(&self, filter: &EdgeFilter) -> AppResult<Vec<Edge>> {
        self.inner.query_edges(filter).await
    }

    async fn delete_edge(&self, kind: EdgeKind, edge_id: &EdgeId) -> AppResult<()> {
        self.edge_write().await?;
        self.inner.delete_edge(kind, edge_id).await
    }

    async fn subscribe_edges(
        &self,
        filter: EdgeFilter,
        sink: SnapshotSink<Edge>,
    ) -> AppResult<Subscription> {
        self.inner.subscribe_edges(filter, sink).await
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        self.inner.create_post(post).await
    }

    async fn get_post(&self, post_id: &PostId) -> AppResult<Option<Post>> {
        self.inner.get_post(post_id).await
    }

    async fn list_posts(&self, limit: usize) -> AppResult<Vec<Post>> {
        self.inner.list_posts(limit).await
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        self.inner.create_comment(comment).await
    }

    async fn get_comment(&self, comment_id: &CommentId) -> AppResult<Option<Comment>> {
        self.inner.get_comment(comment_id).await
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> AppResult<()> {
        self.inner.delete_comment(comment_id).await
    }

    async fn query_comments(&self, post_id: &PostId) -> AppResult<Vec<Comment>> {
        self.inner.query_comments(post_id).await
    }

    async fn subscribe_comments(
        &self,
        post_id: PostId,
        sink: SnapshotSink<Comment>,
    ) -> AppResult<Subscription> {
        self.inner.subscribe_comments(post_id, sink).await
    }
}

pub fn service(store: Arc<FlakyStore>) -> SocialService {
    SocialService::new(store, &EngineConfig::default())
}

pub async fn new_post(store: &FlakyStore, author: &str) -> Post {
    store
        .create_post(NewPost {
            author_id: UserId::from(author),
            content: format!("{}'s dog at the park", author),
            media: vec![],
        })
        .await
        .unwrap()
}

pub async fn new_comment(store: &FlakyStore, post: &Post, author: &str, text: &str) -> Comment {
    store
        .create_comment(NewComment {
            post_id: post.id.clone(),
            author_id: UserId::from(author),
            content: text.to_string(),
        })
        .await
        .unwrap()
}

/// Wait (bounded) for the thread view to satisfy `predicate`
pub async fn settle(
    session: &ThreadSession,
    predicate: impl FnMut(&ThreadView) -> bool,
) -> ThreadView {
    tokio::time::timeout(Duration::from_secs(5), session.wait_for(predicate))
        .await
        .expect("thread view did not settle in time")
        .unwrap()
}

/// Poll `condition` until it holds or five seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition did not hold in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
