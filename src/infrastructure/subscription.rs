//! Live subscription plumbing shared by every store and aggregator.
//!
//! Stores hand out a [`Subscription`] for each `subscribe` call and push full
//! snapshots into a [`SnapshotSink`]. Cancelling a handle is idempotent and
//! flips a shared flag that the store checks immediately before every
//! delivery, so a callback that is already queued never reaches the sink.
//!
//! [`SubscriptionManager`] groups the handles opened under one scope key and
//! guarantees that they are all cancelled before a new scope opens.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Callback a store invokes with the full current result set
pub type SnapshotSink<T> = Arc<dyn Fn(Vec<T>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

type CancelFn = Box<dyn FnOnce() + Send>;

/// Cancelable handle for one live query. Dropping it cancels.
pub struct Subscription {
    id: SubscriptionId,
    label: String,
    active: Arc<AtomicBool>,
    on_cancel: Mutex<Option<CancelFn>>,
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    pub fn new(
        id: SubscriptionId,
        label: impl Into<String>,
        active: Arc<AtomicBool>,
        on_cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            active,
            on_cancel: Mutex::new(Some(Box::new(on_cancel))),
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Stop all further deliveries. Safe to call any number of times.
    pub fn cancel(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        let on_cancel = match self.on_cancel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(on_cancel) = on_cancel {
            on_cancel();
        }
        debug!(subscription = self.id.0, label = %self.label, "subscription cancelled");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Store-side record of one subscriber
pub struct Subscriber<F, T> {
    pub filter: F,
    active: Arc<AtomicBool>,
    sink: SnapshotSink<T>,
}

impl<F, T> Subscriber<F, T> {
    /// Deliver a snapshot unless the handle was cancelled in the meantime
    pub fn deliver(&self, snapshot: Vec<T>) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        (self.sink)(snapshot);
        true
    }
}

/// Registry of live subscribers for one collection, used by store backends
pub struct SubscriberRegistry<F, T> {
    next_id: Arc<AtomicU64>,
    subscribers: Arc<Mutex<HashMap<SubscriptionId, Arc<Subscriber<F, T>>>>>,
}

impl<F, T> Clone for SubscriberRegistry<F, T> {
    fn clone(&self) -> Self {
        Self {
            next_id: self.next_id.clone(),
            subscribers: self.subscribers.clone(),
        }
    }
}

impl<F, T> Default for SubscriberRegistry<F, T>
where
    F: Send + Sync + 'static,
    T: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F, T> SubscriberRegistry<F, T>
where
    F: Send + Sync + 'static,
    T: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Register a subscriber and return its handle plus the store-side record
    pub fn register(
        &self,
        label: impl Into<String>,
        filter: F,
        sink: SnapshotSink<T>,
    ) -> (Subscription, Arc<Subscriber<F, T>>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let active = Arc::new(AtomicBool::new(true));
        let subscriber = Arc::new(Subscriber {
            filter,
            active: active.clone(),
            sink,
        });

        self.lock().insert(id, subscriber.clone());

        let subscribers = self.subscribers.clone();
        let handle = Subscription::new(id, label, active, move || {
            let mut map = match subscribers.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.remove(&id);
        });

        (handle, subscriber)
    }

    /// Live subscribers whose filter satisfies `pred`
    pub fn matching(&self, pred: impl Fn(&F) -> bool) -> Vec<Arc<Subscriber<F, T>>> {
        self.lock()
            .values()
            .filter(|s| s.active.load(Ordering::SeqCst) && pred(&s.filter))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Arc<Subscriber<F, T>>>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Token captured by snapshot callbacks; compares against the manager's
/// current generation so a stale closure can recognise itself.
#[derive(Debug, Clone)]
pub struct ScopeToken {
    generation: u64,
    current: Arc<AtomicU64>,
}

impl ScopeToken {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Owns every subscription opened under one scope key.
///
/// Opening a new scope cancels the old scope's handles first; dropping the
/// manager tears everything down.
#[derive(Debug)]
pub struct SubscriptionManager<K> {
    scope: Option<K>,
    generation: Arc<AtomicU64>,
    handles: Vec<Subscription>,
}

impl<K: PartialEq + Debug> Default for SubscriptionManager<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: PartialEq + Debug> SubscriptionManager<K> {
    pub fn new() -> Self {
        Self {
            scope: None,
            generation: Arc::new(AtomicU64::new(0)),
            handles: Vec::new(),
        }
    }

    pub fn scope(&self) -> Option<&K> {
        self.scope.as_ref()
    }

    /// Switch to `key`. Returns `None` when `key` is already the open scope.
    pub fn open_scope(&mut self, key: K) -> Option<ScopeToken> {
        if self.scope.as_ref() == Some(&key) {
            return None;
        }
        self.teardown();
        debug!(scope = ?key, "opening subscription scope");
        self.scope = Some(key);
        Some(self.token())
    }

    /// Token for the scope that is currently open
    pub fn token(&self) -> ScopeToken {
        ScopeToken {
            generation: self.generation.load(Ordering::SeqCst),
            current: self.generation.clone(),
        }
    }

    pub fn track(&mut self, subscription: Subscription) {
        self.handles.push(subscription);
    }

    pub fn active_count(&self) -> usize {
        self.handles.iter().filter(|h| h.is_active()).count()
    }

    /// Cancel every handle and invalidate outstanding tokens
    pub fn teardown(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.cancel();
        }
        if let Some(scope) = self.scope.take() {
            debug!(scope = ?scope, "subscription scope torn down");
        }
    }
}

impl<K> Drop for SubscriptionManager<K> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for handle in self.handles.drain(..) {
            handle.cancel();
        }
    }
}
