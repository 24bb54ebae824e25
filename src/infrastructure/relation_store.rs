//! RelationStore - the remote collection of directed edge records.
//!
//! The store knows nothing about posts or comments. It stores edges, answers
//! filtered queries and pushes full snapshots to subscribers. It does not
//! enforce one-edge-per-(user, target); callers must check before writing.

use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::core::{EdgeId, TargetId, UserId};
use crate::error::AppResult;
use crate::infrastructure::content_store::ContentStore;
use crate::infrastructure::subscription::{SnapshotSink, Subscription};
use crate::models::{Edge, EdgeKind, NewEdge};

/// Which edges a query or subscription covers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeFilter {
    pub kind: EdgeKind,
    pub user_id: Option<UserId>,
    /// `None` matches every target; `Some` of an empty set matches nothing
    pub target_ids: Option<BTreeSet<TargetId>>,
}

impl EdgeFilter {
    pub fn kind(kind: EdgeKind) -> Self {
        Self {
            kind,
            user_id: None,
            target_ids: None,
        }
    }

    /// All edges of `kind` pointing at `target`
    pub fn target(kind: EdgeKind, target: TargetId) -> Self {
        Self {
            kind,
            user_id: None,
            target_ids: Some(BTreeSet::from([target])),
        }
    }

    /// All edges of `kind` pointing at any of `targets`
    pub fn targets(kind: EdgeKind, targets: impl IntoIterator<Item = TargetId>) -> Self {
        Self {
            kind,
            user_id: None,
            target_ids: Some(targets.into_iter().collect()),
        }
    }

    /// The (user, target) pair a toggle reads before writing
    pub fn pair(kind: EdgeKind, user_id: UserId, target: TargetId) -> Self {
        Self {
            kind,
            user_id: Some(user_id),
            target_ids: Some(BTreeSet::from([target])),
        }
    }

    pub fn matches(&self, edge: &Edge) -> bool {
        if edge.kind != self.kind {
            return false;
        }
        if let Some(user) = &self.user_id {
            if &edge.user_id != user {
                return false;
            }
        }
        match &self.target_ids {
            Some(targets) => targets.contains(&edge.target_id),
            None => true,
        }
    }
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    /// Insert an edge. Fails with `TransientIo` on transport failure.
    async fn create_edge(&self, edge: NewEdge) -> AppResult<EdgeId>;

    /// One-shot read. Order is unspecified.
    async fn query_edges(&self, filter: &EdgeFilter) -> AppResult<Vec<Edge>>;

    /// Remove an edge. Returns `NotFound` if it is already gone, which
    /// callers treat as success since the end state is "absent".
    async fn delete_edge(&self, kind: EdgeKind, edge_id: &EdgeId) -> AppResult<()>;

    /// Deliver the full matching set now and after every change until the
    /// returned handle is cancelled.
    async fn subscribe_edges(
        &self,
        filter: EdgeFilter,
        sink: SnapshotSink<Edge>,
    ) -> AppResult<Subscription>;

    /// Size of a query; raw edge count, duplicates included
    async fn count_edges(&self, filter: &EdgeFilter) -> AppResult<u64> {
        Ok(self.query_edges(filter).await?.len() as u64)
    }

    async fn edge_exists(&self, filter: &EdgeFilter) -> AppResult<bool> {
        Ok(!self.query_edges(filter).await?.is_empty())
    }
}

/// Everything the engine needs from the remote document store
pub trait SocialStore: RelationStore + ContentStore {}

impl<T: RelationStore + ContentStore> SocialStore for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TargetType;
    use chrono::Utc;

    fn edge(kind: EdgeKind, user: &str, target: &str) -> Edge {
        NewEdge {
            kind,
            user_id: UserId::new(user),
            target_id: TargetId::new(target),
            target_type: TargetType::Post,
        }
        .into_edge(EdgeId::generate(), Utc::now())
    }

    #[test]
    fn test_filter_matching() {
        let like = edge(EdgeKind::Like, "alice", "p1");

        assert!(EdgeFilter::kind(EdgeKind::Like).matches(&like));
        assert!(!EdgeFilter::kind(EdgeKind::Save).matches(&like));
        assert!(EdgeFilter::target(EdgeKind::Like, "p1".into()).matches(&like));
        assert!(!EdgeFilter::target(EdgeKind::Like, "p2".into()).matches(&like));
        assert!(EdgeFilter::pair(EdgeKind::Like, "alice".into(), "p1".into()).matches(&like));
        assert!(!EdgeFilter::pair(EdgeKind::Like, "bob".into(), "p1".into()).matches(&like));
    }

    #[test]
    fn test_empty_target_set_matches_nothing() {
        let like = edge(EdgeKind::Like, "alice", "c1");
        let filter = EdgeFilter::targets(EdgeKind::Like, Vec::<TargetId>::new());
        assert!(!filter.matches(&like));
    }
}
