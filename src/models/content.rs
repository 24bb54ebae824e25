use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::core::{CommentId, PostId, UserId};

/// A feed post. Like/save/comment figures are derived, never stored here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub media: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    /// Feed order: newest first, id as the tiebreak
    pub fn feed_order(a: &Post, b: &Post) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Thread order: oldest first, id as the tiebreak so equal timestamps
    /// render the same way on every re-derivation
    pub fn thread_order(a: &Comment, b: &Comment) -> Ordering {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

/// Fields supplied by the author when creating a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPost {
    pub author_id: UserId,
    pub content: String,
    #[serde(default)]
    pub media: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComment {
    pub post_id: PostId,
    pub author_id: UserId,
    pub content: String,
}

impl NewPost {
    pub fn into_post(self, id: PostId, created_at: DateTime<Utc>) -> Post {
        Post {
            id,
            author_id: self.author_id,
            content: self.content,
            media: self.media,
            created_at,
        }
    }
}

impl NewComment {
    pub fn into_comment(self, id: CommentId, created_at: DateTime<Utc>) -> Comment {
        Comment {
            id,
            post_id: self.post_id,
            author_id: self.author_id,
            content: self.content,
            created_at,
        }
    }
}
