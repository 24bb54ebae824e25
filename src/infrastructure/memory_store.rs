// In-memory social store - posts, comments and edges behind one lock
// Used by tests and by the dev server when DATABASE_URL=memory

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::{CommentId, EdgeId, PostId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::content_store::ContentStore;
use crate::infrastructure::relation_store::{EdgeFilter, RelationStore};
use crate::infrastructure::subscription::{SnapshotSink, SubscriberRegistry, Subscription};
use crate::models::{Comment, Edge, EdgeKind, NewComment, NewEdge, NewPost, Post};

#[derive(Debug, Default)]
struct MemoryState {
    posts: HashMap<PostId, Post>,
    comments: HashMap<CommentId, Comment>,
    edges: HashMap<EdgeId, Edge>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Wall clock, bumped by a millisecond when it would not advance so
    /// creation order always matches timestamp order
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn edge_snapshot(&self, filter: &EdgeFilter) -> Vec<Edge> {
        self.edges
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    fn comment_snapshot(&self, post_id: &PostId) -> Vec<Comment> {
        let mut comments: Vec<Comment> = self
            .comments
            .values()
            .filter(|c| &c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(Comment::thread_order);
        comments
    }
}

/// Store backed by process memory. Snapshots are delivered while the state
/// lock is held, so each subscriber observes changes in write order.
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    edge_subscribers: SubscriberRegistry<EdgeFilter, Edge>,
    comment_subscribers: SubscriberRegistry<PostId, Comment>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("edge_subscribers", &self.edge_subscribers.len())
            .field("comment_subscribers", &self.comment_subscribers.len())
            .finish()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            edge_subscribers: SubscriberRegistry::new(),
            comment_subscribers: SubscriberRegistry::new(),
        }
    }

    /// Insert a fully-formed post, keeping its id and timestamp
    pub async fn insert_post(&self, post: Post) {
        let mut state = self.state.lock().await;
        state.posts.insert(post.id.clone(), post);
    }

    /// Insert a fully-formed comment, keeping its id and timestamp
    pub async fn insert_comment(&self, comment: Comment) {
        let mut state = self.state.lock().await;
        let post_id = comment.post_id.clone();
        state.comments.insert(comment.id.clone(), comment);
        self.notify_comments(&state, &post_id);
    }

    /// Insert an edge without any uniqueness check, as a racing client would
    pub async fn insert_edge(&self, edge: Edge) {
        let mut state = self.state.lock().await;
        let changed = edge.clone();
        state.edges.insert(edge.id.clone(), edge);
        self.notify_edges(&state, &changed);
    }

    pub fn live_subscriptions(&self) -> usize {
        self.edge_subscribers.len() + self.comment_subscribers.len()
    }

    fn notify_edges(&self, state: &MemoryState, changed: &Edge) {
        for subscriber in self.edge_subscribers.matching(|f| f.matches(changed)) {
            subscriber.deliver(state.edge_snapshot(&subscriber.filter));
        }
    }

    fn notify_comments(&self, state: &MemoryState, post_id: &PostId) {
        let subscribers = self.comment_subscribers.matching(|p| p == post_id);
        if subscribers.is_empty() {
            return;
        }
        let snapshot = state.comment_snapshot(post_id);
        for subscriber in subscribers {
            subscriber.deliver(snapshot.clone());
        }
    }
}

#[async_trait]
impl RelationStore for MemoryStore {
    async fn create_edge(&self, edge: NewEdge) -> AppResult<EdgeId> {
        let mut state = self.state.lock().await;
        let id = EdgeId::generate();
        let created_at = state.next_timestamp();
        let edge = edge.into_edge(id.clone(), created_at);
        debug!(edge = %id, kind = %edge.kind, user = %edge.user_id, target = %edge.target_id, "edge created");
        state.edges.insert(id.clone(), edge.clone());
        self.notify_edges(&state, &edge);
        Ok(id)
    }

    async fn query_edges(&self, filter: &EdgeFilter) -> AppResult<Vec<Edge>> {
        let state = self.state.lock().await;
        Ok(state.edge_snapshot(filter))
    }

    async fn delete_edge(&self, kind: EdgeKind, edge_id: &EdgeId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let kind_matches = state.edges.get(edge_id).map_or(false, |e| e.kind == kind);
        let removed = if kind_matches {
            state.edges.remove(edge_id)
        } else {
            None
        };
        match removed {
            Some(edge) => {
                debug!(edge = %edge_id, kind = %kind, "edge deleted");
                self.notify_edges(&state, &edge);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("{} edge {}", kind, edge_id))),
        }
    }

    async fn subscribe_edges(
        &self,
        filter: EdgeFilter,
        sink: SnapshotSink<Edge>,
    ) -> AppResult<Subscription> {
        let state = self.state.lock().await;
        let label = format!("edges:{}", filter.kind);
        let (handle, subscriber) = self.edge_subscribers.register(label, filter, sink);
        subscriber.deliver(state.edge_snapshot(&subscriber.filter));
        Ok(handle)
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let mut state = self.state.lock().await;
        let created_at = state.next_timestamp();
        let post = post.into_post(PostId::generate(), created_at);
        state.posts.insert(post.id.clone(), post.clone());
        Ok(post)
    }

    async fn get_post(&self, post_id: &PostId) -> AppResult<Option<Post>> {
        let state = self.state.lock().await;
        Ok(state.posts.get(post_id).cloned())
    }

    async fn list_posts(&self, limit: usize) -> AppResult<Vec<Post>> {
        let state = self.state.lock().await;
        let mut posts: Vec<Post> = state.posts.values().cloned().collect();
        posts.sort_by(Post::feed_order);
        posts.truncate(limit);
        Ok(posts)
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        let mut state = self.state.lock().await;
        if !state.posts.contains_key(&comment.post_id) {
            return Err(AppError::NotFound(format!("post {}", comment.post_id)));
        }
        let created_at = state.next_timestamp();
        let comment = comment.into_comment(CommentId::generate(), created_at);
        state.comments.insert(comment.id.clone(), comment.clone());
        self.notify_comments(&state, &comment.post_id);
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: &CommentId) -> AppResult<Option<Comment>> {
        let state = self.state.lock().await;
        Ok(state.comments.get(comment_id).cloned())
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> AppResult<()> {
        let mut state = self.state.lock().await;
        match state.comments.remove(comment_id) {
            Some(comment) => {
                self.notify_comments(&state, &comment.post_id);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("comment {}", comment_id))),
        }
    }

    async fn query_comments(&self, post_id: &PostId) -> AppResult<Vec<Comment>> {
        let state = self.state.lock().await;
        Ok(state.comment_snapshot(post_id))
    }

    async fn subscribe_comments(
        &self,
        post_id: PostId,
        sink: SnapshotSink<Comment>,
    ) -> AppResult<Subscription> {
        let state = self.state.lock().await;
        let label = format!("comments:{}", post_id);
        let snapshot = state.comment_snapshot(&post_id);
        let (handle, subscriber) = self.comment_subscribers.register(label, post_id, sink);
        subscriber.deliver(snapshot);
        Ok(handle)
    }
}
