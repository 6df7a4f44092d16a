//! Rate-limited work queue
//!
//! Semantics follow the classic controller work queue:
//! - a key is handed to at most one worker at a time
//! - adding a key that is already pending replaces the pending item
//! - adding a key that is being processed marks it dirty; it is re-queued
//!   when the worker calls [`WorkQueue::done`]
//! - a rate-limited requeue is dropped if the key was added again before
//!   its backoff elapsed
//! - after [`WorkQueue::shut_down`] adds are ignored and `get` returns `None`

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::trace;

use crate::event::{Action, ResourceKind};

/// One pending reconciliation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkItem {
    /// `namespace/name` or `name`
    pub key: String,
    /// Resource type the key belongs to
    pub resource_kind: ResourceKind,
    /// Notification that produced the item
    pub action: Action,
    /// Resource version seen in the notification, if any
    pub resource_version: Option<String>,
}

impl WorkItem {
    /// Create a work item
    pub fn new(
        key: impl Into<String>,
        resource_kind: ResourceKind,
        action: Action,
        resource_version: Option<String>,
    ) -> Self {
        Self {
            key: key.into(),
            resource_kind,
            action,
            resource_version,
        }
    }
}

/// Per-key exponential backoff: `base * 2^failures`, capped at `max`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ItemBackoff {
    /// Delay for the first requeue
    pub base: Duration,
    /// Upper bound
    pub max: Duration,
}

impl Default for ItemBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(1000),
        }
    }
}

impl ItemBackoff {
    /// Delay for an item that has already failed `failures` times
    pub fn delay(&self, failures: u32) -> Duration {
        // 2^31 * 5ms is far beyond any sane cap, so clamp the exponent
        let factor = 2u32.saturating_pow(failures.min(31));
        self.base.saturating_mul(factor).min(self.max)
    }
}

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    /// Latest item per key, for keys that are queued or dirty
    items: HashMap<String, WorkItem>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    /// Sequence number of the last `add` per key
    added: HashMap<String, u64>,
    next_seq: u64,
    /// Rate-limited requeues still waiting out their backoff, per key
    retrying: HashMap<String, u32>,
    shutting_down: bool,
}

impl State {
    /// Record `item` as the latest for its key; true if the key must be queued
    fn insert(&mut self, item: WorkItem) -> bool {
        self.next_seq += 1;
        let seq = self.next_seq;
        self.added.insert(item.key.clone(), seq);

        let key = item.key.clone();
        let already_known = self.items.insert(key.clone(), item).is_some();
        if already_known || self.processing.contains(&key) {
            // Either still queued, or dirty and picked up again by `done`
            return false;
        }
        self.queue.push_back(key);
        true
    }
}

struct Inner {
    state: Mutex<State>,
    notify: Notify,
    backoff: ItemBackoff,
}

/// Cloneable handle to a shared work queue
#[derive(Clone)]
pub struct WorkQueue {
    inner: Arc<Inner>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(ItemBackoff::default())
    }
}

impl WorkQueue {
    /// Create an empty queue with the given requeue backoff
    pub fn new(backoff: ItemBackoff) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                backoff,
            }),
        }
    }

    /// Enqueue `item`, coalescing with any pending item for the same key
    pub fn add(&self, item: WorkItem) {
        let mut state = self.inner.state.lock();
        if state.shutting_down {
            trace!(key = %item.key, "Queue shutting down, dropping add");
            return;
        }

        if state.insert(item) {
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Wait for the next item. Returns `None` once the queue is shut down.
    pub async fn get(&self) -> Option<WorkItem> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                if state.shutting_down {
                    return None;
                }
                while let Some(key) = state.queue.pop_front() {
                    if let Some(item) = state.items.remove(&key) {
                        state.processing.insert(key);
                        return Some(item);
                    }
                }
            }

            notified.await;
        }
    }

    /// Release `key` after processing; re-queues it if it was added meanwhile
    pub fn done(&self, key: &str) {
        let mut state = self.inner.state.lock();
        state.processing.remove(key);
        if state.items.contains_key(key) && !state.shutting_down {
            state.queue.push_back(key.to_string());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Re-add `item` after its per-key backoff and bump the failure count.
    ///
    /// The requeue is skipped when a newer item for the key was added in the
    /// meantime, so a stale retry never replaces or repeats newer work.
    pub fn add_rate_limited(&self, item: WorkItem) {
        let (delay, seen) = {
            let mut state = self.inner.state.lock();
            let seen = state.added.get(&item.key).copied();
            *state.retrying.entry(item.key.clone()).or_insert(0) += 1;
            let failures = state.failures.entry(item.key.clone()).or_insert(0);
            let delay = self.inner.backoff.delay(*failures);
            *failures += 1;
            (delay, seen)
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.requeue(item, seen);
        });
    }

    fn requeue(&self, item: WorkItem, seen: Option<u64>) {
        let mut state = self.inner.state.lock();
        if let Some(n) = state.retrying.get_mut(&item.key) {
            *n -= 1;
            if *n == 0 {
                state.retrying.remove(&item.key);
            }
        }
        if state.shutting_down {
            return;
        }
        if state.added.get(&item.key).copied() != seen {
            trace!(key = %item.key, "Newer item added during backoff, dropping retry");
            let idle = !state.retrying.contains_key(&item.key)
                && !state.failures.contains_key(&item.key);
            if idle {
                state.added.remove(&item.key);
            }
            return;
        }
        if state.insert(item) {
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Clear the failure history for `key`
    pub fn forget(&self, key: &str) {
        let mut state = self.inner.state.lock();
        state.failures.remove(key);
        // Sequence numbers must outlive pending retries or those could match again
        if !state.retrying.contains_key(key) {
            state.added.remove(key);
        }
    }

    /// Number of rate-limited requeues recorded for `key`
    pub fn num_requeues(&self, key: &str) -> u32 {
        self.inner
            .state
            .lock()
            .failures
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// Number of items waiting to be handed out
    pub fn len(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Whether no items are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting items and wake every waiting `get`
    pub fn shut_down(&self) {
        self.inner.state.lock().shutting_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Whether [`WorkQueue::shut_down`] has been called
    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().shutting_down
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(key: &str, action: Action, rv: &str) -> WorkItem {
        WorkItem::new(key, ResourceKind::Pods, action, Some(rv.to_string()))
    }

    #[tokio::test]
    async fn pending_items_coalesce_latest_wins() {
        let q = WorkQueue::default();
        q.add(item("default/a", Action::Create, "1"));
        q.add(item("default/a", Action::Update, "2"));
        q.add(item("default/b", Action::Create, "1"));

        assert_eq!(q.len(), 2);
        let first = q.get().await.unwrap();
        assert_eq!(first.key, "default/a");
        assert_eq!(first.action, Action::Update);
        assert_eq!(first.resource_version.as_deref(), Some("2"));
        assert_eq!(q.get().await.unwrap().key, "default/b");
    }

    #[tokio::test]
    async fn key_in_flight_is_not_handed_out_twice() {
        let q = WorkQueue::default();
        q.add(item("default/a", Action::Create, "1"));
        let got = q.get().await.unwrap();

        // Re-added while processing: stays parked until done
        q.add(item("default/a", Action::Update, "2"));
        assert_eq!(q.len(), 0);

        q.done(&got.key);
        assert_eq!(q.len(), 1);
        let again = q.get().await.unwrap();
        assert_eq!(again.resource_version.as_deref(), Some("2"));
        q.done(&again.key);
        assert!(q.is_empty());
    }

    #[tokio::test]
    async fn get_waits_for_add() {
        let q = WorkQueue::default();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;
        q.add(item("ns/x", Action::Delete, "3"));

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.key, "ns/x");
    }

    #[tokio::test]
    async fn shutdown_unblocks_get_and_ignores_adds() {
        let q = WorkQueue::default();
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move { q.get().await })
        };
        tokio::task::yield_now().await;

        q.shut_down();
        assert!(waiter.await.unwrap().is_none());
        assert!(q.is_shutting_down());

        q.add(item("ns/x", Action::Create, "1"));
        assert!(q.is_empty());
        assert!(q.get().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_adds_count_requeues_and_come_back() {
        let q = WorkQueue::default();
        q.add_rate_limited(item("ns/x", Action::Update, "4"));
        q.add_rate_limited(item("ns/x", Action::Update, "4"));
        assert_eq!(q.num_requeues("ns/x"), 2);

        let got = q.get().await.unwrap();
        assert_eq!(got.key, "ns/x");

        q.forget("ns/x");
        assert_eq!(q.num_requeues("ns/x"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_retry_does_not_replace_newer_item() {
        let q = WorkQueue::default();
        q.add(item("ns/x", Action::Create, "1"));
        let failed = q.get().await.unwrap();
        q.add_rate_limited(failed.clone());
        q.done(&failed.key);

        q.add(item("ns/x", Action::Update, "2"));
        tokio::time::sleep(Duration::from_secs(2)).await;

        let next = q.get().await.unwrap();
        assert_eq!(next.action, Action::Update);
        assert_eq!(next.resource_version.as_deref(), Some("2"));
        q.done(&next.key);
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_retry_does_not_rerun_after_newer_item_processed() {
        let q = WorkQueue::default();
        q.add(item("ns/x", Action::Create, "1"));
        let failed = q.get().await.unwrap();
        q.add_rate_limited(failed.clone());
        q.done(&failed.key);

        q.add(item("ns/x", Action::Update, "2"));
        let newer = q.get().await.unwrap();
        q.forget(&newer.key);
        q.done(&newer.key);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(q.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_without_newer_item_comes_back() {
        let q = WorkQueue::default();
        q.add(item("ns/x", Action::Create, "1"));
        let failed = q.get().await.unwrap();
        q.add_rate_limited(failed.clone());
        q.done(&failed.key);

        let again = q.get().await.unwrap();
        assert_eq!(again, failed);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let b = ItemBackoff::default();
        assert_eq!(b.delay(0), Duration::from_millis(5));
        assert_eq!(b.delay(1), Duration::from_millis(10));
        assert_eq!(b.delay(4), Duration::from_millis(80));
        assert_eq!(b.delay(40), Duration::from_secs(1000));
    }
}
