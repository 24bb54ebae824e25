//! Handle returned by `open_thread`: the live view plus the thread's intents.

use futures::Stream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::{CommentId, PostId, TargetId, UserId};
use crate::engine::comment_thread::ThreadMsg;
use crate::engine::toggle::EdgeToggler;
use crate::error::{AppError, AppResult};
use crate::infrastructure::SocialStore;
use crate::models::{Comment, EdgeKind, NewComment, ThreadView};

pub const MAX_COMMENT_LEN: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Prediction shown immediately; the remote write is in flight
    Applied { predicted: bool },
    /// Same toggle already in flight; nothing new was issued
    Coalesced,
}

/// A toggle that was rolled back. Delivered once per failure.
#[derive(Debug, Clone)]
pub struct MutationFailure {
    pub kind: EdgeKind,
    pub target_id: TargetId,
    pub error: AppError,
}

pub struct ThreadSession {
    post_id: PostId,
    user: UserId,
    store: Arc<dyn SocialStore>,
    toggler: Arc<EdgeToggler>,
    tx: mpsc::UnboundedSender<ThreadMsg>,
    view: watch::Receiver<ThreadView>,
    failures: AsyncMutex<mpsc::UnboundedReceiver<MutationFailure>>,
    task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for ThreadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSession")
            .field("post_id", &self.post_id)
            .field("user", &self.user)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ThreadSession {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        post_id: PostId,
        user: UserId,
        store: Arc<dyn SocialStore>,
        toggler: Arc<EdgeToggler>,
        tx: mpsc::UnboundedSender<ThreadMsg>,
        view: watch::Receiver<ThreadView>,
        failures: mpsc::UnboundedReceiver<MutationFailure>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            post_id,
            user,
            store,
            toggler,
            tx,
            view,
            failures: AsyncMutex::new(failures),
            task: Mutex::new(Some(task)),
            closed: AtomicBool::new(false),
        }
    }

    pub fn post_id(&self) -> &PostId {
        &self.post_id
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Current derived view
    pub fn view(&self) -> ThreadView {
        self.view.borrow().clone()
    }

    /// Receiver that is notified on every new view. Ends after `close()`.
    pub fn watch(&self) -> watch::Receiver<ThreadView> {
        self.view.clone()
    }

    /// Views as a stream: the current one first, then every change
    pub fn view_stream(&self) -> impl Stream<Item = ThreadView> + Send + 'static {
        let mut rx = self.view.clone();
        rx.mark_changed();
        futures::stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let view = rx.borrow_and_update().clone();
            Some((view, rx))
        })
    }

    /// Wait until the view satisfies `predicate`
    pub async fn wait_for(&self, predicate: impl FnMut(&ThreadView) -> bool) -> AppResult<ThreadView> {
        let mut rx = self.view.clone();
        let view = rx
            .wait_for(predicate)
            .await
            .map_err(|_| self.closed_error())?;
        Ok(view.clone())
    }

    pub async fn post_comment(&self, text: &str) -> AppResult<Comment> {
        self.ensure_open()?;
        let content = text.trim();
        if content.is_empty() {
            return Err(AppError::Validation("comment cannot be empty".to_string()));
        }
        if content.chars().count() > MAX_COMMENT_LEN {
            return Err(AppError::Validation(format!(
                "comment longer than {} characters",
                MAX_COMMENT_LEN
            )));
        }

        // Shows up in the view through the comment stream
        self.store
            .create_comment(NewComment {
                post_id: self.post_id.clone(),
                author_id: self.user.clone(),
                content: content.to_string(),
            })
            .await
    }

    /// Delete one of the viewer's own comments and the likes pointing at it
    pub async fn delete_comment(&self, comment_id: &CommentId) -> AppResult<()> {
        self.ensure_open()?;
        let comment = self
            .store
            .get_comment(comment_id)
            .await?
            .filter(|c| c.post_id == self.post_id)
            .ok_or_else(|| AppError::NotFound(format!("comment {} in thread {}", comment_id, self.post_id)))?;

        if comment.author_id != self.user {
            return Err(AppError::Forbidden(format!(
                "comment {} belongs to another user",
                comment_id
            )));
        }

        self.store.delete_comment(comment_id).await?;
        if let Err(e) = self
            .toggler
            .remove_all_for_target(EdgeKind::Like, &comment_id.into())
            .await
        {
            warn!(comment = %comment_id, "comment deleted but its likes remain: {}", e);
        }
        Ok(())
    }

    /// Toggle the viewer's like on the post or one of its comments
    pub async fn toggle_like(&self, target_id: impl Into<TargetId>) -> AppResult<ToggleOutcome> {
        self.send_toggle(EdgeKind::Like, target_id.into()).await
    }

    pub async fn toggle_save(&self, post_id: &PostId) -> AppResult<ToggleOutcome> {
        self.send_toggle(EdgeKind::Save, post_id.into()).await
    }

    /// Next rolled-back toggle, or `None` once the thread is closed
    pub async fn next_failure(&self) -> Option<MutationFailure> {
        self.failures.lock().await.recv().await
    }

    pub fn try_next_failure(&self) -> Option<MutationFailure> {
        self.failures.try_lock().ok()?.try_recv().ok()
    }

    /// Cancel every subscription of this thread. Idempotent; once it returns
    /// no further view changes are published.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(ThreadMsg::Close { reply: Some(reply_tx) }).is_ok() {
            let _ = reply_rx.await;
        }

        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(post = %self.post_id, "thread task ended abnormally: {}", e);
            }
        }
        debug!(post = %self.post_id, "thread session closed");
    }

    async fn send_toggle(&self, kind: EdgeKind, target_id: TargetId) -> AppResult<ToggleOutcome> {
        self.ensure_open()?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ThreadMsg::Toggle {
                kind,
                target_id,
                reply: reply_tx,
            })
            .map_err(|_| self.closed_error())?;
        reply_rx.await.map_err(|_| self.closed_error())?
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.is_closed() {
            return Err(self.closed_error());
        }
        Ok(())
    }

    fn closed_error(&self) -> AppError {
        AppError::SessionClosed(format!("thread {}", self.post_id))
    }
}

impl Drop for ThreadSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(ThreadMsg::Close { reply: None });
        }
    }
}
