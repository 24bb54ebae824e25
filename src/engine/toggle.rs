//! Query-before-write edge toggling, serialized per logical edge.
//!
//! The store does not enforce uniqueness, so two overlapping read-then-write
//! sequences on the same (kind, user, target) could both see "absent" and
//! both create. Every write path here takes a per-key lock first, so within
//! one process those sequences never overlap.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::core::{EdgeId, TargetId, UserId};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{EdgeFilter, SocialStore};
use crate::models::{EdgeKind, NewEdge, TargetType};

/// Identity of one logical edge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub kind: EdgeKind,
    pub user_id: UserId,
    pub target_id: TargetId,
}

impl EdgeKey {
    pub fn new(kind: EdgeKind, user_id: UserId, target_id: TargetId) -> Self {
        Self {
            kind,
            user_id,
            target_id,
        }
    }

    pub fn filter(&self) -> EdgeFilter {
        EdgeFilter::pair(self.kind, self.user_id.clone(), self.target_id.clone())
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}", self.kind, self.user_id, self.target_id)
    }
}

/// What a write actually did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Edge state after the write
    pub present: bool,
    pub created: Option<EdgeId>,
    pub removed: usize,
}

pub struct EdgeToggler {
    store: Arc<dyn SocialStore>,
    locks: Mutex<HashMap<EdgeKey, Arc<AsyncMutex<()>>>>,
}

impl fmt::Debug for EdgeToggler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeToggler")
            .field("held_keys", &self.held_keys())
            .finish()
    }
}

impl EdgeToggler {
    pub fn new(store: Arc<dyn SocialStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Flip the edge: delete it if present, create it if absent
    pub async fn toggle(&self, key: &EdgeKey, target_type: TargetType) -> AppResult<WriteOutcome> {
        let mut lease = self.lease(key);
        lease.acquire().await;
        self.write_locked(key, target_type, None).await
    }

    /// Bring the edge to `desired`; a no-op if it is already there
    pub async fn set(
        &self,
        key: &EdgeKey,
        target_type: TargetType,
        desired: bool,
    ) -> AppResult<WriteOutcome> {
        let mut lease = self.lease(key);
        lease.acquire().await;
        self.write_locked(key, target_type, Some(desired)).await
    }

    /// Delete every edge of `kind` on `target`, whoever owns it
    pub async fn remove_all_for_target(&self, kind: EdgeKind, target: &TargetId) -> AppResult<usize> {
        let edges = self
            .store
            .query_edges(&EdgeFilter::target(kind, target.clone()))
            .await?;
        let mut removed = 0;
        for edge in edges {
            match self.store.delete_edge(kind, &edge.id).await {
                Ok(()) => removed += 1,
                Err(AppError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(kind = %kind, target = %target, removed, "removed edges for target");
        Ok(removed)
    }

    async fn write_locked(
        &self,
        key: &EdgeKey,
        target_type: TargetType,
        desired: Option<bool>,
    ) -> AppResult<WriteOutcome> {
        let existing = self.store.query_edges(&key.filter()).await?;
        let present = !existing.is_empty();
        let desired = desired.unwrap_or(!present);

        if existing.len() > 1 {
            warn!(
                "{}",
                AppError::InvariantViolation(format!("{} edges found for {}", existing.len(), key))
            );
        }

        if desired == present {
            debug!(key = %key, present, "edge already in desired state");
            return Ok(WriteOutcome {
                present,
                created: None,
                removed: 0,
            });
        }

        if desired {
            let edge = NewEdge {
                kind: key.kind,
                user_id: key.user_id.clone(),
                target_id: key.target_id.clone(),
                target_type,
            };
            let id = self.store.create_edge(edge).await?;
            info!(key = %key, edge = %id, "edge created");
            return Ok(WriteOutcome {
                present: true,
                created: Some(id),
                removed: 0,
            });
        }

        // Removing collapses any duplicates as well
        let mut removed = 0;
        for edge in &existing {
            match self.store.delete_edge(key.kind, &edge.id).await {
                Ok(()) => removed += 1,
                Err(AppError::NotFound(_)) => {
                    debug!(key = %key, edge = %edge.id, "edge already gone");
                }
                Err(e) => return Err(e),
            }
        }
        info!(key = %key, removed, "edge removed");
        Ok(WriteOutcome {
            present: false,
            created: None,
            removed,
        })
    }

    fn lease(&self, key: &EdgeKey) -> KeyLease<'_> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let lock = locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone();
        KeyLease {
            toggler: self,
            key: key.clone(),
            lock: Some(lock),
            guard: None,
        }
    }

    fn release(&self, key: &EdgeKey) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Only the map holds it: nobody is waiting
        if locks.get(key).map_or(false, |l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    /// Keys with a write in flight or waiting
    pub fn held_keys(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

/// Claim on one key's lock. Dropping it, including when the owning future
/// is cancelled mid-write, frees the map entry once no one else holds it.
struct KeyLease<'a> {
    toggler: &'a EdgeToggler,
    key: EdgeKey,
    lock: Option<Arc<AsyncMutex<()>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyLease<'_> {
    async fn acquire(&mut self) {
        if let Some(lock) = self.lock.clone() {
            self.guard = Some(lock.lock_owned().await);
        }
    }
}

impl Drop for KeyLease<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.lock.take();
        self.toggler.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::{MemoryStore, RelationStore};

    fn setup() -> (Arc<MemoryStore>, EdgeToggler) {
        let store = Arc::new(MemoryStore::new());
        let toggler = EdgeToggler::new(store.clone());
        (store, toggler)
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_state() {
        let (store, toggler) = setup();
        let key = EdgeKey::new(EdgeKind::Like, "alice".into(), "p1".into());

        let first = toggler.toggle(&key, TargetType::Post).await.unwrap();
        assert!(first.present);
        assert!(first.created.is_some());
        assert_eq!(store.count_edges(&key.filter()).await.unwrap(), 1);

        let second = toggler.toggle(&key, TargetType::Post).await.unwrap();
        assert!(!second.present);
        assert_eq!(second.removed, 1);
        assert_eq!(store.count_edges(&key.filter()).await.unwrap(), 0);
        assert_eq!(toggler.held_keys(), 0);
    }

    #[tokio::test]
    async fn test_set_is_idempotent() {
        let (store, toggler) = setup();
        let key = EdgeKey::new(EdgeKind::Save, "alice".into(), "p1".into());

        toggler.set(&key, TargetType::Post, true).await.unwrap();
        let again = toggler.set(&key, TargetType::Post, true).await.unwrap();
        assert!(again.present);
        assert!(again.created.is_none());
        assert_eq!(store.count_edges(&key.filter()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_removal_collapses_duplicates() {
        let (store, toggler) = setup();
        let key = EdgeKey::new(EdgeKind::Like, "alice".into(), "c1".into());
        let edge = NewEdge::like("alice".into(), "c1".into(), TargetType::Comment);
        store.create_edge(edge.clone()).await.unwrap();
        store.create_edge(edge).await.unwrap();

        let outcome = toggler.toggle(&key, TargetType::Comment).await.unwrap();
        assert!(!outcome.present);
        assert_eq!(outcome.removed, 2);
        assert_eq!(store.count_edges(&key.filter()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_sets_create_a_single_edge() {
        let (store, toggler) = setup();
        let toggler = Arc::new(toggler);
        let key = EdgeKey::new(EdgeKind::Like, "alice".into(), "p1".into());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let toggler = toggler.clone();
                let key = key.clone();
                tokio::spawn(async move { toggler.set(&key, TargetType::Post, true).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.count_edges(&key.filter()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_all_for_target() {
        let (store, toggler) = setup();
        for user in ["alice", "bob", "carol"] {
            store
                .create_edge(NewEdge::like(user.into(), "c9".into(), TargetType::Comment))
                .await
                .unwrap();
        }
        let removed = toggler
            .remove_all_for_target(EdgeKind::Like, &"c9".into())
            .await
            .unwrap();
        assert_eq!(removed, 3);
    }
}
