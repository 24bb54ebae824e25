use serde::{Deserialize, Serialize};

use crate::models::{Comment, Post};

/// Post-level figures derived from edge and comment snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostStats {
    pub like_count: u64,
    pub is_liked_by_me: bool,
    pub is_saved_by_me: bool,
    pub comment_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostViewModel {
    pub post: Post,
    #[serde(flatten)]
    pub stats: PostStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentViewModel {
    pub comment: Comment,
    pub like_count: u64,
    pub is_liked_by_me: bool,
}

/// Everything a thread screen renders. Rebuilt wholesale on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadView {
    pub post: PostStats,
    pub comments: Vec<CommentViewModel>,
    /// False until both the comment and edge streams have delivered once
    pub loaded: bool,
}
