//! Optimistic overlay for toggles issued from a live view.
//!
//! Each (kind, user, target) moves through
//! `Idle -> Pending -> (Reconciled | RolledBack)`. While a prediction exists
//! it overrides the snapshot for that one edge; it stores the predicted
//! membership rather than a delta, so a snapshot that already agrees with it
//! is a no-op and one that disagrees simply wins once the prediction is
//! released.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::core::{TargetId, UserId};
use crate::engine::edge_index::EdgeIndex;
use crate::engine::toggle::EdgeKey;
use crate::models::EdgeKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    /// Remote write in flight
    Pending,
    /// Remote write succeeded; waiting for a snapshot to take over
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Prediction {
    predicted: bool,
    phase: MutationPhase,
    seq: u64,
}

/// Result of asking the controller to start a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleDecision {
    /// Prediction applied; issue the remote write for `desired` tagged `seq`
    Start { seq: u64, desired: bool },
    /// A toggle on the same edge is still pending; this one is absorbed
    Coalesced,
}

/// How a settled mutation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Snapshot already matches; overlay removed
    Reconciled,
    /// Overlay kept until the next snapshot of this kind
    AwaitingSnapshot,
    /// Overlay removed after a failure
    RolledBack,
    /// Result for a superseded or unknown mutation
    Ignored,
}

#[derive(Debug, Default)]
pub struct OptimisticMutationController {
    predictions: HashMap<EdgeKey, Prediction>,
    next_seq: u64,
}

impl OptimisticMutationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a local prediction that flips `displayed`, unless one is pending
    pub fn begin(&mut self, key: EdgeKey, displayed: bool) -> ToggleDecision {
        if let Some(existing) = self.predictions.get(&key) {
            if existing.phase == MutationPhase::Pending {
                debug!(key = %key, "toggle coalesced into pending mutation");
                return ToggleDecision::Coalesced;
            }
        }

        self.next_seq += 1;
        let seq = self.next_seq;
        let desired = !displayed;
        self.predictions.insert(
            key,
            Prediction {
                predicted: desired,
                phase: MutationPhase::Pending,
                seq,
            },
        );
        ToggleDecision::Start { seq, desired }
    }

    /// Remote write for `seq` succeeded. `snapshot_member` is the membership
    /// the latest snapshot reports for this edge.
    pub fn confirm(&mut self, key: &EdgeKey, seq: u64, snapshot_member: bool) -> Settlement {
        let Some(prediction) = self.predictions.get_mut(key) else {
            return Settlement::Ignored;
        };
        if prediction.seq != seq {
            return Settlement::Ignored;
        }
        if prediction.predicted == snapshot_member {
            self.predictions.remove(key);
            return Settlement::Reconciled;
        }
        prediction.phase = MutationPhase::Confirmed;
        Settlement::AwaitingSnapshot
    }

    /// Remote write for `seq` failed; revert to whatever the snapshot says
    pub fn rollback(&mut self, key: &EdgeKey, seq: u64) -> Settlement {
        match self.predictions.get(key) {
            Some(prediction) if prediction.seq == seq => {
                self.predictions.remove(key);
                warn!(key = %key, "optimistic prediction rolled back");
                Settlement::RolledBack
            }
            _ => Settlement::Ignored,
        }
    }

    /// A fresh snapshot of `kind` arrived: confirmed predictions give way to
    /// it. Pending ones stay, the snapshot may predate their write.
    pub fn on_snapshot(&mut self, kind: EdgeKind) -> usize {
        let before = self.predictions.len();
        self.predictions
            .retain(|key, p| key.kind != kind || p.phase == MutationPhase::Pending);
        before - self.predictions.len()
    }

    pub fn is_pending(&self, key: &EdgeKey) -> bool {
        self.predictions
            .get(key)
            .map_or(false, |p| p.phase == MutationPhase::Pending)
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Count and membership for `target` as the user should see them:
    /// the snapshot index with this user's prediction laid over it
    pub fn view(
        &self,
        kind: EdgeKind,
        index: &EdgeIndex,
        user: &UserId,
        target: &TargetId,
    ) -> (u64, bool) {
        let base_count = index.count(target);
        let base_member = index.contains(user, target);
        let key = EdgeKey::new(kind, user.clone(), target.clone());

        match self.predictions.get(&key) {
            Some(p) if p.predicted != base_member => {
                let count = if p.predicted {
                    base_count + 1
                } else {
                    base_count.saturating_sub(1)
                };
                (count, p.predicted)
            }
            _ => (base_count, base_member),
        }
    }
}
