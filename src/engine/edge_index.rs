//! Per-scope index over one edge snapshot.
//!
//! Counts are the number of distinct users holding at least one edge on a
//! target, so a duplicated like still counts once. Duplicates are reported
//! and logged but never fail the build.

use std::collections::{HashMap, HashSet};
use tracing::warn;

use crate::core::{TargetId, UserId};
use crate::error::AppError;
use crate::models::{Edge, EdgeKind};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeIndex {
    users_by_target: HashMap<TargetId, HashSet<UserId>>,
    duplicates: Vec<(UserId, TargetId)>,
}

impl EdgeIndex {
    /// Index every edge of `kind` in `edges`; edges of other kinds are ignored
    pub fn build(kind: EdgeKind, edges: &[Edge]) -> Self {
        let mut users_by_target: HashMap<TargetId, HashSet<UserId>> = HashMap::new();
        let mut duplicates = Vec::new();

        for edge in edges.iter().filter(|e| e.kind == kind) {
            let users = users_by_target.entry(edge.target_id.clone()).or_default();
            if !users.insert(edge.user_id.clone()) {
                duplicates.push((edge.user_id.clone(), edge.target_id.clone()));
            }
        }

        for (user, target) in &duplicates {
            let violation = AppError::InvariantViolation(format!(
                "duplicate {} edge for user {} on {}",
                kind, user, target
            ));
            warn!("{}", violation);
        }

        Self {
            users_by_target,
            duplicates,
        }
    }

    pub fn count(&self, target: &TargetId) -> u64 {
        self.users_by_target
            .get(target)
            .map_or(0, |users| users.len() as u64)
    }

    pub fn contains(&self, user: &UserId, target: &TargetId) -> bool {
        self.users_by_target
            .get(target)
            .map_or(false, |users| users.contains(user))
    }

    /// (user, target) pairs that had more than one edge in the snapshot
    pub fn duplicates(&self) -> &[(UserId, TargetId)] {
        &self.duplicates
    }

    pub fn is_empty(&self) -> bool {
        self.users_by_target.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EdgeId;
    use crate::models::{NewEdge, TargetType};
    use chrono::Utc;

    fn like(user: &str, target: &str) -> Edge {
        NewEdge::like(user.into(), target.into(), TargetType::Comment)
            .into_edge(EdgeId::generate(), Utc::now())
    }

    #[test]
    fn test_counts_and_membership() {
        let edges = vec![like("alice", "c1"), like("bob", "c1"), like("alice", "c2")];
        let index = EdgeIndex::build(EdgeKind::Like, &edges);

        assert_eq!(index.count(&"c1".into()), 2);
        assert_eq!(index.count(&"c2".into()), 1);
        assert_eq!(index.count(&"c3".into()), 0);
        assert!(index.contains(&"bob".into(), &"c1".into()));
        assert!(!index.contains(&"bob".into(), &"c2".into()));
        assert!(index.duplicates().is_empty());
    }

    #[test]
    fn test_duplicates_collapse_to_presence() {
        let edges = vec![like("alice", "c1"), like("alice", "c1"), like("bob", "c1")];
        let index = EdgeIndex::build(EdgeKind::Like, &edges);

        assert_eq!(index.count(&"c1".into()), 2);
        assert!(index.contains(&"alice".into(), &"c1".into()));
        assert_eq!(
            index.duplicates(),
            &[(UserId::new("alice"), TargetId::new("c1"))]
        );
    }

    #[test]
    fn test_other_kinds_are_ignored() {
        let save = NewEdge::save("alice".into(), "p1".into()).into_edge(EdgeId::generate(), Utc::now());
        let index = EdgeIndex::build(EdgeKind::Like, &[save]);
        assert!(index.is_empty());
    }
}
