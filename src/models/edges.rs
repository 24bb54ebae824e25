use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::{EdgeId, PostId, TargetId, UserId};
use crate::error::{AppError, AppResult};

/// Relation an edge expresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Like,
    Save,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Like => "like",
            EdgeKind::Save => "save",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "like" => Ok(EdgeKind::Like),
            "save" => Ok(EdgeKind::Save),
            other => Err(AppError::Validation(format!("Unknown edge kind: {}", other))),
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Post,
    Comment,
}

impl TargetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Post => "post",
            TargetType::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> AppResult<Self> {
        match s {
            "post" => Ok(TargetType::Post),
            "comment" => Ok(TargetType::Comment),
            other => Err(AppError::Validation(format!("Unknown target type: {}", other))),
        }
    }
}

/// A stored relation record. Its existence is the fact being modeled; edges
/// are only ever created or deleted, never updated.
///
/// At most one edge per (kind, user, target) is the logical invariant. The
/// store does not enforce it, so readers must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub user_id: UserId,
    pub target_id: TargetId,
    pub target_type: TargetType,
    pub created_at: DateTime<Utc>,
}

/// Edge fields before the store assigns an id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewEdge {
    pub kind: EdgeKind,
    pub user_id: UserId,
    pub target_id: TargetId,
    pub target_type: TargetType,
}

impl NewEdge {
    /// LikeEdge: (user, target, post|comment)
    pub fn like(user_id: UserId, target_id: TargetId, target_type: TargetType) -> Self {
        Self {
            kind: EdgeKind::Like,
            user_id,
            target_id,
            target_type,
        }
    }

    /// SaveEdge: (user, post)
    pub fn save(user_id: UserId, post_id: PostId) -> Self {
        Self {
            kind: EdgeKind::Save,
            user_id,
            target_id: post_id.into(),
            target_type: TargetType::Post,
        }
    }

    pub fn into_edge(self, id: EdgeId, created_at: DateTime<Utc>) -> Edge {
        Edge {
            id,
            kind: self.kind,
            user_id: self.user_id,
            target_id: self.target_id,
            target_type: self.target_type,
            created_at,
        }
    }
}
