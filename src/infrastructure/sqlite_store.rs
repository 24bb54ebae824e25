use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::{CommentId, EdgeId, PostId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::content_store::ContentStore;
use crate::infrastructure::relation_store::{EdgeFilter, RelationStore};
use crate::infrastructure::subscription::{SnapshotSink, SubscriberRegistry, Subscription};
use crate::models::{Comment, Edge, EdgeKind, NewComment, NewEdge, NewPost, Post, TargetType};

/// SQLite implementation of the social store.
///
/// SQLite has no change feed, so every write re-queries the affected
/// subscriptions and pushes their snapshots. Writes and their notifications
/// run under `write_lock` so each subscriber sees snapshots in commit order.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
    edge_subscribers: SubscriberRegistry<EdgeFilter, Edge>,
    comment_subscribers: SubscriberRegistry<PostId, Comment>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("pool_size", &self.pool.size())
            .field("edge_subscribers", &self.edge_subscribers.len())
            .field("comment_subscribers", &self.comment_subscribers.len())
            .finish()
    }
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite:data/pawfeed.db`), creating the file
    /// and tables if needed
    pub async fn connect(url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::Configuration(format!("Invalid SQLite URL {}: {}", url, e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to connect to {}: {}", url, e)))?;

        let store = Self::with_pool(pool);
        store.initialize().await?;
        info!("SQLite social store ready at {}", url);
        Ok(store)
    }

    pub async fn new_in_memory() -> AppResult<Self> {
        // One connection that never idles out, or the database vanishes
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                AppError::TransientIo(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let store = Self::with_pool(pool);
        store.initialize().await?;
        Ok(store)
    }

    fn with_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
            edge_subscribers: SubscriberRegistry::new(),
            comment_subscribers: SubscriberRegistry::new(),
        }
    }

    /// Create tables and indexes. Edges carry no unique
    /// constraint on (kind, user_id, target_id).
    pub async fn initialize(&self) -> AppResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id TEXT PRIMARY KEY,
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                media TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id TEXT PRIMARY KEY,
                post_id TEXT NOT NULL,
                author_id TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                user_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                target_type TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC)",
            "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at)",
            "CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(kind, target_id)",
            "CREATE INDEX IF NOT EXISTS idx_edges_user_target ON edges(kind, user_id, target_id)",
        ];

        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::TransientIo(format!("Failed to initialize schema: {}", e)))?;
        }
        Ok(())
    }

    fn row_to_post(row: &SqliteRow) -> AppResult<Post> {
        let media: String = row.try_get("media")?;
        let media = serde_json::from_str(&media)
            .map_err(|e| AppError::Internal(format!("Corrupt media column: {}", e)))?;
        Ok(Post {
            id: PostId::new(row.try_get::<String, _>("id")?),
            author_id: row.try_get::<String, _>("author_id")?.into(),
            content: row.try_get("content")?,
            media,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn row_to_comment(row: &SqliteRow) -> AppResult<Comment> {
        Ok(Comment {
            id: CommentId::new(row.try_get::<String, _>("id")?),
            post_id: row.try_get::<String, _>("post_id")?.into(),
            author_id: row.try_get::<String, _>("author_id")?.into(),
            content: row.try_get("content")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    fn row_to_edge(row: &SqliteRow) -> AppResult<Edge> {
        Ok(Edge {
            id: EdgeId::new(row.try_get::<String, _>("id")?),
            kind: EdgeKind::parse(&row.try_get::<String, _>("kind")?)?,
            user_id: row.try_get::<String, _>("user_id")?.into(),
            target_id: row.try_get::<String, _>("target_id")?.into(),
            target_type: TargetType::parse(&row.try_get::<String, _>("target_type")?)?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    async fn fetch_edges(&self, filter: &EdgeFilter) -> AppResult<Vec<Edge>> {
        if matches!(&filter.target_ids, Some(targets) if targets.is_empty()) {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, kind, user_id, target_id, target_type, created_at FROM edges WHERE kind = ",
        );
        qb.push_bind(filter.kind.as_str());

        if let Some(user) = &filter.user_id {
            qb.push(" AND user_id = ");
            qb.push_bind(user.as_str().to_string());
        }

        if let Some(targets) = &filter.target_ids {
            qb.push(" AND target_id IN (");
            let mut separated = qb.separated(",");
            for target in targets {
                separated.push_bind(target.as_str().to_string());
            }
            qb.push(")");
        }

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to query edges: {}", e)))?;

        rows.iter().map(Self::row_to_edge).collect()
    }

    async fn fetch_comments(&self, post_id: &PostId) -> AppResult<Vec<Comment>> {
        let rows = sqlx::query(
            "SELECT id, post_id, author_id, content, created_at FROM comments WHERE post_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(post_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::TransientIo(format!("Failed to query comments of {}: {}", post_id, e)))?;

        rows.iter().map(Self::row_to_comment).collect()
    }

    /// Push fresh snapshots after a committed edge write. A failed re-query
    /// skips that subscriber; the write itself has already succeeded.
    async fn notify_edges(&self, changed: &Edge) {
        for subscriber in self.edge_subscribers.matching(|f| f.matches(changed)) {
            match self.fetch_edges(&subscriber.filter).await {
                Ok(snapshot) => {
                    subscriber.deliver(snapshot);
                }
                Err(e) => warn!(edge = %changed.id, kind = %changed.kind, "skipping edge snapshot: {}", e),
            }
        }
    }

    async fn notify_comments(&self, post_id: &PostId) {
        let subscribers = self.comment_subscribers.matching(|p| p == post_id);
        if subscribers.is_empty() {
            return;
        }
        match self.fetch_comments(post_id).await {
            Ok(snapshot) => {
                for subscriber in subscribers {
                    subscriber.deliver(snapshot.clone());
                }
            }
            Err(e) => warn!(post = %post_id, "skipping comment snapshot: {}", e),
        }
    }
}

#[async_trait]
impl RelationStore for SqliteStore {
    async fn create_edge(&self, edge: NewEdge) -> AppResult<EdgeId> {
        let _guard = self.write_lock.lock().await;
        let edge = edge.into_edge(EdgeId::generate(), Utc::now());

        sqlx::query(
            "INSERT INTO edges (id, kind, user_id, target_id, target_type, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(edge.id.as_str())
        .bind(edge.kind.as_str())
        .bind(edge.user_id.as_str())
        .bind(edge.target_id.as_str())
        .bind(edge.target_type.as_str())
        .bind(edge.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::TransientIo(format!("Failed to create {} edge: {}", edge.kind, e)))?;

        debug!(edge = %edge.id, kind = %edge.kind, target = %edge.target_id, "edge created");
        self.notify_edges(&edge).await;
        Ok(edge.id)
    }

    async fn query_edges(&self, filter: &EdgeFilter) -> AppResult<Vec<Edge>> {
        self.fetch_edges(filter).await
    }

    async fn delete_edge(&self, kind: EdgeKind, edge_id: &EdgeId) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;

        let row = sqlx::query(
            "SELECT id, kind, user_id, target_id, target_type, created_at FROM edges WHERE id = ? AND kind = ?",
        )
        .bind(edge_id.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::TransientIo(format!("Failed to read edge {}: {}", edge_id, e)))?;

        let edge = match row {
            Some(row) => Self::row_to_edge(&row)?,
            None => return Err(AppError::NotFound(format!("{} edge {}", kind, edge_id))),
        };

        let result = sqlx::query("DELETE FROM edges WHERE id = ?")
            .bind(edge_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to delete edge {}: {}", edge_id, e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{} edge {}", kind, edge_id)));
        }

        debug!(edge = %edge_id, kind = %kind, "edge deleted");
        self.notify_edges(&edge).await;
        Ok(())
    }

    async fn subscribe_edges(
        &self,
        filter: EdgeFilter,
        sink: SnapshotSink<Edge>,
    ) -> AppResult<Subscription> {
        let _guard = self.write_lock.lock().await;
        let label = format!("edges:{}", filter.kind);
        let (handle, subscriber) = self.edge_subscribers.register(label, filter, sink);
        let snapshot = self.fetch_edges(&subscriber.filter).await?;
        subscriber.deliver(snapshot);
        Ok(handle)
    }

    async fn count_edges(&self, filter: &EdgeFilter) -> AppResult<u64> {
        if matches!(&filter.target_ids, Some(targets) if targets.is_empty()) {
            return Ok(0);
        }

        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS n FROM edges WHERE kind = ");
        qb.push_bind(filter.kind.as_str());
        if let Some(user) = &filter.user_id {
            qb.push(" AND user_id = ");
            qb.push_bind(user.as_str().to_string());
        }
        if let Some(targets) = &filter.target_ids {
            qb.push(" AND target_id IN (");
            let mut separated = qb.separated(",");
            for target in targets {
                separated.push_bind(target.as_str().to_string());
            }
            qb.push(")");
        }

        let row = qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to count edges: {}", e)))?;
        Ok(row.try_get::<i64, _>("n")?.max(0) as u64)
    }
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        let post = post.into_post(PostId::generate(), Utc::now());
        let media = serde_json::to_string(&post.media)
            .map_err(|e| AppError::Internal(format!("Failed to encode media: {}", e)))?;

        sqlx::query(
            "INSERT INTO posts (id, author_id, content, media, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(post.id.as_str())
        .bind(post.author_id.as_str())
        .bind(&post.content)
        .bind(media)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::TransientIo(format!("Failed to create post: {}", e)))?;

        Ok(post)
    }

    async fn get_post(&self, post_id: &PostId) -> AppResult<Option<Post>> {
        let row = sqlx::query("SELECT id, author_id, content, media, created_at FROM posts WHERE id = ?")
            .bind(post_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to get post {}: {}", post_id, e)))?;

        row.as_ref().map(Self::row_to_post).transpose()
    }

    async fn list_posts(&self, limit: usize) -> AppResult<Vec<Post>> {
        let rows = sqlx::query(
            "SELECT id, author_id, content, media, created_at FROM posts ORDER BY created_at DESC, id ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::TransientIo(format!("Failed to list posts: {}", e)))?;

        rows.iter().map(Self::row_to_post).collect()
    }

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment> {
        if self.get_post(&comment.post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("post {}", comment.post_id)));
        }

        let _guard = self.write_lock.lock().await;
        let comment = comment.into_comment(CommentId::generate(), Utc::now());

        sqlx::query(
            "INSERT INTO comments (id, post_id, author_id, content, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(comment.id.as_str())
        .bind(comment.post_id.as_str())
        .bind(comment.author_id.as_str())
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::TransientIo(format!("Failed to create comment: {}", e)))?;

        self.notify_comments(&comment.post_id).await;
        Ok(comment)
    }

    async fn get_comment(&self, comment_id: &CommentId) -> AppResult<Option<Comment>> {
        let row = sqlx::query("SELECT id, post_id, author_id, content, created_at FROM comments WHERE id = ?")
            .bind(comment_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to get comment {}: {}", comment_id, e)))?;

        row.as_ref().map(Self::row_to_comment).transpose()
    }

    async fn delete_comment(&self, comment_id: &CommentId) -> AppResult<()> {
        let comment = self
            .get_comment(comment_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("comment {}", comment_id)))?;

        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(comment_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to delete comment {}: {}", comment_id, e)))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("comment {}", comment_id)));
        }
        self.notify_comments(&comment.post_id).await;
        Ok(())
    }

    async fn query_comments(&self, post_id: &PostId) -> AppResult<Vec<Comment>> {
        self.fetch_comments(post_id).await
    }

    async fn count_comments(&self, post_id: &PostId) -> AppResult<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM comments WHERE post_id = ?")
            .bind(post_id.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::TransientIo(format!("Failed to count comments of {}: {}", post_id, e)))?;
        Ok(row.try_get::<i64, _>("n")?.max(0) as u64)
    }

    async fn subscribe_comments(
        &self,
        post_id: PostId,
        sink: SnapshotSink<Comment>,
    ) -> AppResult<Subscription> {
        let _guard = self.write_lock.lock().await;
        let label = format!("comments:{}", post_id);
        let snapshot = self.fetch_comments(&post_id).await?;
        let (handle, subscriber) = self.comment_subscribers.register(label, post_id, sink);
        subscriber.deliver(snapshot);
        Ok(handle)
    }
}
