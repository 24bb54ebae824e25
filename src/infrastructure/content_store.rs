//! ContentStore - the Posts and Comments collections.

use async_trait::async_trait;

use crate::core::{CommentId, PostId};
use crate::error::AppResult;
use crate::infrastructure::subscription::{SnapshotSink, Subscription};
use crate::models::{Comment, NewComment, NewPost, Post};

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn create_post(&self, post: NewPost) -> AppResult<Post>;

    async fn get_post(&self, post_id: &PostId) -> AppResult<Option<Post>>;

    /// Newest first, at most `limit` posts
    async fn list_posts(&self, limit: usize) -> AppResult<Vec<Post>>;

    async fn create_comment(&self, comment: NewComment) -> AppResult<Comment>;

    async fn get_comment(&self, comment_id: &CommentId) -> AppResult<Option<Comment>>;

    /// Returns `NotFound` if the comment does not exist
    async fn delete_comment(&self, comment_id: &CommentId) -> AppResult<()>;

    /// Comments of one post, oldest first
    async fn query_comments(&self, post_id: &PostId) -> AppResult<Vec<Comment>>;

    async fn count_comments(&self, post_id: &PostId) -> AppResult<u64> {
        Ok(self.query_comments(post_id).await?.len() as u64)
    }

    /// Full comment list of `post_id`, oldest first, on every change
    async fn subscribe_comments(
        &self,
        post_id: PostId,
        sink: SnapshotSink<Comment>,
    ) -> AppResult<Subscription>;
}
