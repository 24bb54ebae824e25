//! Live comment thread for one post.
//!
//! Three store streams feed one ordered queue: the post's comments, the like
//! edges on the post and its comments, and the viewer's save edge on the
//! post. UI intents and remote write results go through the same queue, so
//! a single task applies every change in arrival order and rebuilds the
//! [`ThreadView`] from the latest snapshot of each input plus the optimistic
//! overlay. No input ever patches state held from another.
//!
//! The like stream's filter depends on the comment ids, so it is re-opened
//! whenever the comment set changes. Each opening gets a new generation and
//! snapshots from an older generation are dropped.
//!
//! A toggle flips what the user currently sees, so it waits in the actor
//! until the stream it reads from has delivered for the current scope.

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::core::{PostId, TargetId, UserId};
use crate::engine::edge_index::EdgeIndex;
use crate::engine::optimistic::{OptimisticMutationController, Settlement, ToggleDecision};
use crate::engine::thread_session::{MutationFailure, ThreadSession, ToggleOutcome};
use crate::engine::toggle::{EdgeKey, EdgeToggler};
use crate::error::{AppError, AppResult};
use crate::infrastructure::{EdgeFilter, ScopeToken, SnapshotSink, SocialStore, SubscriptionManager};
use crate::models::{Comment, CommentViewModel, Edge, EdgeKind, PostStats, TargetType, ThreadView};

/// Pure derivation of the comment list from the latest snapshots.
///
/// Comments are ordered by createdAt then id. Each like count is the number
/// of distinct users with a like edge on the comment.
pub fn derive(comments: &[Comment], likes: &[Edge], current_user: &UserId) -> Vec<CommentViewModel> {
    let index = EdgeIndex::build(EdgeKind::Like, likes);
    derive_with(comments, &index, current_user, &OptimisticMutationController::new())
}

fn derive_with(
    comments: &[Comment],
    likes: &EdgeIndex,
    current_user: &UserId,
    overlay: &OptimisticMutationController,
) -> Vec<CommentViewModel> {
    let mut ordered: Vec<&Comment> = comments.iter().collect();
    ordered.sort_by(|a, b| Comment::thread_order(a, b));

    ordered
        .into_iter()
        .map(|comment| {
            let target = TargetId::from(&comment.id);
            let (like_count, is_liked_by_me) =
                overlay.view(EdgeKind::Like, likes, current_user, &target);
            CommentViewModel {
                comment: comment.clone(),
                like_count,
                is_liked_by_me,
            }
        })
        .collect()
}

/// Latest snapshot of every input; `None` until that stream first delivers
#[derive(Debug, Default)]
struct ThreadInputs {
    comments: Option<Vec<Comment>>,
    likes: Option<EdgeIndex>,
    saves: Option<EdgeIndex>,
}

/// Toggle intent waiting for its edge stream to deliver
struct DeferredToggle {
    kind: EdgeKind,
    target_id: TargetId,
    reply: oneshot::Sender<AppResult<ToggleOutcome>>,
}

enum Readiness {
    Ready,
    Waiting,
    Unavailable(AppError),
}

pub(crate) enum ThreadMsg {
    Comments(Vec<Comment>),
    Likes { generation: u64, edges: Vec<Edge> },
    Saves(Vec<Edge>),
    Toggle {
        kind: EdgeKind,
        target_id: TargetId,
        reply: oneshot::Sender<AppResult<ToggleOutcome>>,
    },
    Settled {
        key: EdgeKey,
        seq: u64,
        result: AppResult<()>,
    },
    Close {
        reply: Option<oneshot::Sender<()>>,
    },
}

/// Opens live threads against a store
pub struct CommentThreadAggregator {
    store: Arc<dyn SocialStore>,
    toggler: Arc<EdgeToggler>,
}

impl CommentThreadAggregator {
    pub fn new(store: Arc<dyn SocialStore>, toggler: Arc<EdgeToggler>) -> Self {
        Self { store, toggler }
    }

    /// Subscribe to `post_id`'s thread as seen by `current_user`
    pub async fn open(&self, post_id: PostId, current_user: UserId) -> AppResult<ThreadSession> {
        if self.store.get_post(&post_id).await?.is_none() {
            return Err(AppError::NotFound(format!("post {}", post_id)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(ThreadView::default());
        let (failure_tx, failure_rx) = mpsc::unbounded_channel();

        let mut scope: SubscriptionManager<PostId> = SubscriptionManager::new();
        let token = scope
            .open_scope(post_id.clone())
            .unwrap_or_else(|| scope.token());

        let comments_sub = self
            .store
            .subscribe_comments(
                post_id.clone(),
                scoped_sink(&tx, &token, ThreadMsg::Comments),
            )
            .await?;
        scope.track(comments_sub);

        let saves_sub = self
            .store
            .subscribe_edges(
                EdgeFilter::pair(EdgeKind::Save, current_user.clone(), (&post_id).into()),
                scoped_sink(&tx, &token, ThreadMsg::Saves),
            )
            .await?;
        scope.track(saves_sub);

        let actor = ThreadActor {
            post_id: post_id.clone(),
            user: current_user.clone(),
            store: self.store.clone(),
            toggler: self.toggler.clone(),
            tx: tx.clone(),
            scope,
            like_scope: SubscriptionManager::new(),
            inputs: ThreadInputs::default(),
            likes_current: false,
            deferred: Vec::new(),
            overlay: OptimisticMutationController::new(),
            view_tx,
            failure_tx,
        };
        let task = tokio::spawn(actor.run(rx));

        info!(post = %post_id, user = %current_user, "thread opened");
        Ok(ThreadSession::new(
            post_id,
            current_user,
            self.store.clone(),
            self.toggler.clone(),
            tx,
            view_rx,
            failure_rx,
            task,
        ))
    }
}

/// Sink that forwards snapshots into the queue only while `token` is current
fn scoped_sink<T: Send + 'static>(
    tx: &mpsc::UnboundedSender<ThreadMsg>,
    token: &ScopeToken,
    wrap: fn(Vec<T>) -> ThreadMsg,
) -> SnapshotSink<T> {
    let tx = tx.clone();
    let token = token.clone();
    Arc::new(move |snapshot: Vec<T>| {
        if !token.is_current() {
            debug!("{}", AppError::StaleScope("snapshot after teardown".to_string()));
            return;
        }
        let _ = tx.send(wrap(snapshot));
    })
}

struct ThreadActor {
    post_id: PostId,
    user: UserId,
    store: Arc<dyn SocialStore>,
    toggler: Arc<EdgeToggler>,
    tx: mpsc::UnboundedSender<ThreadMsg>,
    scope: SubscriptionManager<PostId>,
    like_scope: SubscriptionManager<BTreeSet<TargetId>>,
    inputs: ThreadInputs,
    /// The like snapshot belongs to the open like scope
    likes_current: bool,
    deferred: Vec<DeferredToggle>,
    overlay: OptimisticMutationController,
    view_tx: watch::Sender<ThreadView>,
    failure_tx: mpsc::UnboundedSender<MutationFailure>,
}

impl ThreadActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ThreadMsg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                ThreadMsg::Comments(comments) => self.on_comments(comments).await,
                ThreadMsg::Likes { generation, edges } => self.on_likes(generation, edges),
                ThreadMsg::Saves(edges) => {
                    self.inputs.saves = Some(EdgeIndex::build(EdgeKind::Save, &edges));
                    self.overlay.on_snapshot(EdgeKind::Save);
                }
                ThreadMsg::Toggle {
                    kind,
                    target_id,
                    reply,
                } => self.deferred.push(DeferredToggle {
                    kind,
                    target_id,
                    reply,
                }),
                ThreadMsg::Settled { key, seq, result } => self.on_settled(key, seq, result),
                ThreadMsg::Close { reply } => {
                    self.teardown();
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                    return;
                }
            }
            self.flush_deferred();
            self.publish();
        }
        self.teardown();
    }

    async fn on_comments(&mut self, comments: Vec<Comment>) {
        let mut targets: BTreeSet<TargetId> = comments.iter().map(|c| TargetId::from(&c.id)).collect();
        targets.insert((&self.post_id).into());
        self.inputs.comments = Some(comments);

        let Some(token) = self.like_scope.open_scope(targets.clone()) else {
            return;
        };

        debug!(post = %self.post_id, targets = targets.len(), generation = token.generation(), "re-scoping like stream");
        self.likes_current = false;
        let generation = token.generation();
        let tx = self.tx.clone();
        let sink_token = token.clone();
        let sink: SnapshotSink<Edge> = Arc::new(move |edges: Vec<Edge>| {
            if !sink_token.is_current() {
                return;
            }
            let _ = tx.send(ThreadMsg::Likes { generation, edges });
        });

        match self
            .store
            .subscribe_edges(EdgeFilter::targets(EdgeKind::Like, targets), sink)
            .await
        {
            Ok(subscription) => self.like_scope.track(subscription),
            Err(e) => {
                // Keep the last like snapshot and retry on the next comment change
                error!(post = %self.post_id, "failed to subscribe to likes: {}", e);
                self.like_scope.teardown();
                self.likes_current = self.inputs.likes.is_some();
            }
        }
    }

    fn on_likes(&mut self, generation: u64, edges: Vec<Edge>) {
        if generation != self.like_scope.token().generation() {
            debug!("{}", AppError::StaleScope(format!("like snapshot generation {}", generation)));
            return;
        }
        self.inputs.likes = Some(EdgeIndex::build(EdgeKind::Like, &edges));
        self.likes_current = true;
        self.overlay.on_snapshot(EdgeKind::Like);
    }

    fn readiness(&self, kind: EdgeKind) -> Readiness {
        match kind {
            EdgeKind::Save if self.inputs.saves.is_some() => Readiness::Ready,
            EdgeKind::Save => Readiness::Waiting,
            EdgeKind::Like if self.inputs.likes.is_some() && self.likes_current => Readiness::Ready,
            // Comments arrived but the like subscription could not be opened
            EdgeKind::Like if self.inputs.comments.is_some() && self.like_scope.scope().is_none() => {
                Readiness::Unavailable(AppError::TransientIo(format!(
                    "like stream of thread {} is unavailable",
                    self.post_id
                )))
            }
            EdgeKind::Like => Readiness::Waiting,
        }
    }

    /// Apply queued toggles whose stream has delivered, in arrival order
    fn flush_deferred(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        for toggle in std::mem::take(&mut self.deferred) {
            match self.readiness(toggle.kind) {
                Readiness::Ready => {
                    let outcome = self.on_toggle(toggle.kind, toggle.target_id);
                    let _ = toggle.reply.send(outcome);
                }
                Readiness::Waiting => {
                    debug!(kind = %toggle.kind, target = %toggle.target_id, "toggle waiting for snapshot");
                    self.deferred.push(toggle);
                }
                Readiness::Unavailable(error) => {
                    let _ = toggle.reply.send(Err(error));
                }
            }
        }
    }

    fn on_toggle(&mut self, kind: EdgeKind, target_id: TargetId) -> AppResult<ToggleOutcome> {
        let target_type = self.target_type(kind, &target_id)?;
        let key = EdgeKey::new(kind, self.user.clone(), target_id);
        let (_, displayed) = self.displayed(&key);

        match self.overlay.begin(key.clone(), displayed) {
            ToggleDecision::Coalesced => Ok(ToggleOutcome::Coalesced),
            ToggleDecision::Start { seq, desired } => {
                let toggler = self.toggler.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = toggler
                        .set(&key, target_type, desired)
                        .await
                        .map(|_| ());
                    let _ = tx.send(ThreadMsg::Settled { key, seq, result });
                });
                Ok(ToggleOutcome::Applied { predicted: desired })
            }
        }
    }

    fn on_settled(&mut self, key: EdgeKey, seq: u64, result: AppResult<()>) {
        match result {
            Ok(()) => {
                let member = self.snapshot_member(&key);
                if self.overlay.confirm(&key, seq, member) == Settlement::AwaitingSnapshot {
                    debug!(key = %key, "write confirmed, waiting for snapshot");
                }
            }
            Err(error) => {
                if self.overlay.rollback(&key, seq) == Settlement::RolledBack {
                    warn!(key = %key, "toggle failed: {}", error);
                    let _ = self.failure_tx.send(MutationFailure {
                        kind: key.kind,
                        target_id: key.target_id,
                        error,
                    });
                }
            }
        }
    }

    fn target_type(&self, kind: EdgeKind, target_id: &TargetId) -> AppResult<TargetType> {
        if *target_id == self.post_id {
            return Ok(TargetType::Post);
        }
        if kind == EdgeKind::Save {
            return Err(AppError::Validation(format!(
                "post {} is not part of thread {}",
                target_id, self.post_id
            )));
        }
        let known = self
            .inputs
            .comments
            .as_ref()
            .map_or(false, |comments| comments.iter().any(|c| *target_id == c.id));
        if known {
            Ok(TargetType::Comment)
        } else {
            Err(AppError::NotFound(format!(
                "comment {} in thread {}",
                target_id, self.post_id
            )))
        }
    }

    fn index(&self, kind: EdgeKind) -> Option<&EdgeIndex> {
        match kind {
            EdgeKind::Like => self.inputs.likes.as_ref(),
            EdgeKind::Save => self.inputs.saves.as_ref(),
        }
    }

    fn snapshot_member(&self, key: &EdgeKey) -> bool {
        self.index(key.kind)
            .map_or(false, |index| index.contains(&key.user_id, &key.target_id))
    }

    fn displayed(&self, key: &EdgeKey) -> (u64, bool) {
        let empty = EdgeIndex::default();
        let index = self.index(key.kind).unwrap_or(&empty);
        self.overlay.view(key.kind, index, &key.user_id, &key.target_id)
    }

    fn build_view(&self) -> ThreadView {
        let empty = EdgeIndex::default();
        let likes = self.inputs.likes.as_ref().unwrap_or(&empty);
        let saves = self.inputs.saves.as_ref().unwrap_or(&empty);
        let comments = self.inputs.comments.as_deref().unwrap_or(&[]);
        let post_target: TargetId = (&self.post_id).into();

        let (like_count, is_liked_by_me) = self.overlay.view(EdgeKind::Like, likes, &self.user, &post_target);
        let (_, is_saved_by_me) = self.overlay.view(EdgeKind::Save, saves, &self.user, &post_target);

        ThreadView {
            post: PostStats {
                like_count,
                is_liked_by_me,
                is_saved_by_me,
                comment_count: comments.len() as u64,
            },
            comments: derive_with(comments, likes, &self.user, &self.overlay),
            loaded: self.inputs.comments.is_some()
                && self.inputs.likes.is_some()
                && self.inputs.saves.is_some(),
        }
    }

    /// Replace the published view wholesale if anything changed
    fn publish(&self) {
        let view = self.build_view();
        if *self.view_tx.borrow() != view {
            self.view_tx.send_replace(view);
        }
    }

    fn teardown(&mut self) {
        self.like_scope.teardown();
        self.scope.teardown();
        info!(post = %self.post_id, user = %self.user, "thread closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CommentId, EdgeId};
    use crate::models::NewEdge;
    use chrono::{Duration, TimeZone, Utc};

    fn comment(id: &str, minute: i64) -> Comment {
        Comment {
            id: CommentId::new(id),
            post_id: "p1".into(),
            author_id: "bob".into(),
            content: format!("comment {}", id),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + Duration::minutes(minute),
        }
    }

    fn like(user: &str, target: &str) -> Edge {
        NewEdge::like(user.into(), target.into(), TargetType::Comment)
            .into_edge(EdgeId::generate(), Utc::now())
    }

    #[test]
    fn test_derive_orders_by_time_then_id() {
        let comments = vec![comment("c2", 2), comment("c1", 1)];
        let view = derive(&comments, &[], &"alice".into());

        let ids: Vec<&str> = view.iter().map(|c| c.comment.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c2"]);
        assert!(view.iter().all(|c| c.like_count == 0 && !c.is_liked_by_me));
    }

    #[test]
    fn test_equal_timestamps_use_id_tiebreak() {
        let comments = vec![comment("cb", 5), comment("ca", 5), comment("cc", 5)];
        let first = derive(&comments, &[], &"alice".into());
        let reversed: Vec<Comment> = comments.into_iter().rev().collect();
        let second = derive(&reversed, &[], &"alice".into());

        let ids: Vec<&str> = first.iter().map(|c| c.comment.id.as_str()).collect();
        assert_eq!(ids, vec!["ca", "cb", "cc"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_derive_is_pure_and_counts_match_edges() {
        let comments = vec![comment("c1", 1), comment("c2", 2), comment("c3", 3)];
        let likes = vec![like("alice", "c1"), like("bob", "c1"), like("bob", "c3"), like("bob", "p1")];

        let first = derive(&comments, &likes, &"alice".into());
        let second = derive(&comments, &likes, &"alice".into());
        assert_eq!(first, second);

        for vm in &first {
            let expected = likes.iter().filter(|e| e.target_id == vm.comment.id).count() as u64;
            assert_eq!(vm.like_count, expected);
        }
        assert!(first[0].is_liked_by_me);
        assert!(!first[2].is_liked_by_me);
    }
}
