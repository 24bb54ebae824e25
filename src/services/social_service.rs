// SocialService - the engine's entry point for screens and the HTTP layer
// Explicitly constructed from a store and handed to whoever needs it

use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::EngineConfig;
use crate::core::{PostId, TargetId, UserId};
use crate::engine::{
    derive, CommentThreadAggregator, EdgeKey, EdgeToggler, FeedAggregator, ThreadSession,
    WriteOutcome,
};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{EdgeFilter, SocialStore};
use crate::models::{
    Comment, CommentViewModel, EdgeKind, NewComment, NewPost, Post, PostViewModel, TargetType,
};

const MAX_POST_LEN: usize = 5000;

#[derive(Clone)]
pub struct SocialService {
    store: Arc<dyn SocialStore>,
    toggler: Arc<EdgeToggler>,
    feed: Arc<FeedAggregator>,
    threads: Arc<CommentThreadAggregator>,
}

impl std::fmt::Debug for SocialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocialService")
            .field("toggler", &self.toggler)
            .finish()
    }
}

impl SocialService {
    pub fn new(store: Arc<dyn SocialStore>, config: &EngineConfig) -> Self {
        let toggler = Arc::new(EdgeToggler::new(store.clone()));
        Self {
            feed: Arc::new(FeedAggregator::new(store.clone(), (&config.feed).into())),
            threads: Arc::new(CommentThreadAggregator::new(store.clone(), toggler.clone())),
            toggler,
            store,
        }
    }

    pub fn store(&self) -> Arc<dyn SocialStore> {
        self.store.clone()
    }

    /// `getFeed(userId)`
    pub async fn get_feed(&self, user: &UserId) -> AppResult<Vec<PostViewModel>> {
        validate_user(user)?;
        self.feed.load_feed(user).await
    }

    /// `openThread(postId, userId)`; the caller owns the returned session
    /// and must `close()` it (dropping it also tears it down)
    pub async fn open_thread(&self, post_id: PostId, user: UserId) -> AppResult<ThreadSession> {
        validate_user(&user)?;
        self.threads.open(post_id, user).await
    }

    /// One-shot derivation of a thread, for callers that do not stay subscribed
    #[instrument(skip(self), fields(post = %post_id, user = %user))]
    pub async fn thread_snapshot(
        &self,
        post_id: &PostId,
        user: &UserId,
    ) -> AppResult<Vec<CommentViewModel>> {
        if self.store.get_post(post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("post {}", post_id)));
        }
        let comments = self.store.query_comments(post_id).await?;
        let targets: Vec<TargetId> = comments.iter().map(|c| TargetId::from(&c.id)).collect();
        let likes = self
            .store
            .query_edges(&EdgeFilter::targets(EdgeKind::Like, targets))
            .await?;
        Ok(derive(&comments, &likes, user))
    }

    pub async fn create_post(&self, post: NewPost) -> AppResult<Post> {
        validate_user(&post.author_id)?;
        let content = post.content.trim();
        if content.is_empty() && post.media.is_empty() {
            return Err(AppError::Validation("post needs content or media".to_string()));
        }
        if content.chars().count() > MAX_POST_LEN {
            return Err(AppError::Validation(format!("post longer than {} characters", MAX_POST_LEN)));
        }
        let post = self
            .store
            .create_post(NewPost {
                content: content.to_string(),
                ..post
            })
            .await?;
        info!(post = %post.id, author = %post.author_id, "post created");
        Ok(post)
    }

    pub async fn create_comment(&self, post_id: PostId, user: UserId, content: &str) -> AppResult<Comment> {
        validate_user(&user)?;
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::Validation("comment cannot be empty".to_string()));
        }
        self.store
            .create_comment(NewComment {
                post_id,
                author_id: user,
                content: content.to_string(),
            })
            .await
    }

    /// Non-optimistic like toggle, serialized with every other write on the
    /// same (user, target)
    #[instrument(skip(self), fields(user = %user, target = %target_id))]
    pub async fn toggle_like(
        &self,
        user: &UserId,
        target_id: &TargetId,
        target_type: TargetType,
    ) -> AppResult<WriteOutcome> {
        validate_user(user)?;
        self.ensure_target_exists(target_id, target_type).await?;
        let key = EdgeKey::new(EdgeKind::Like, user.clone(), target_id.clone());
        self.toggler.toggle(&key, target_type).await
    }

    #[instrument(skip(self), fields(user = %user, post = %post_id))]
    pub async fn toggle_save(&self, user: &UserId, post_id: &PostId) -> AppResult<WriteOutcome> {
        validate_user(user)?;
        let target: TargetId = post_id.into();
        self.ensure_target_exists(&target, TargetType::Post).await?;
        let key = EdgeKey::new(EdgeKind::Save, user.clone(), target);
        self.toggler.toggle(&key, TargetType::Post).await
    }

    async fn ensure_target_exists(&self, target_id: &TargetId, target_type: TargetType) -> AppResult<()> {
        let exists = match target_type {
            TargetType::Post => self
                .store
                .get_post(&PostId::new(target_id.as_str()))
                .await?
                .is_some(),
            TargetType::Comment => self
                .store
                .get_comment(&target_id.as_str().into())
                .await?
                .is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("{} {}", target_type.as_str(), target_id)))
        }
    }
}

fn validate_user(user: &UserId) -> AppResult<()> {
    if user.is_valid() {
        Ok(())
    } else {
        Err(AppError::Validation("user id cannot be empty".to_string()))
    }
}
