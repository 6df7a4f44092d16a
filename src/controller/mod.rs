//! Per-resource-type watch controller
//!
//! One [`ResourceController`] runs for every watched resource type. The
//! watch collaborator turns cache notifications into [`WorkItem`]s through
//! the `on_add`/`on_update`/`on_delete` handlers; worker tasks pull items
//! off the queue, look the object up in the cache, build the canonical
//! event and fan it out to the sinks.
//!
//! Processing of an item is awaited before the retry decision is made, so a
//! failure is always observed by the requeue logic.

mod queue;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
use mockall::automock;

use crate::event::{normalize, Action, CanonicalEvent, ResourceKind, ResourceObject};
use crate::metrics;
use crate::sink::{Notification, SinkSet};
use crate::{Error, Result, MAX_RETRIES};

pub use queue::{ItemBackoff, WorkItem, WorkQueue};

/// Read access to the local watch cache for one resource type
#[cfg_attr(test, automock)]
pub trait ObjectCache: Send + Sync {
    /// Look up an object by `namespace/name` (or `name`)
    fn get(&self, key: &str) -> Result<Option<ResourceObject>>;

    /// Whether the initial listing has completed
    fn has_synced(&self) -> bool;
}

/// Lifecycle of a controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerPhase {
    /// Constructed, handlers accept notifications
    Initializing,
    /// Waiting for the cache to sync
    Syncing,
    /// Workers are processing items
    Running,
    /// Stop requested, finishing in-flight items
    Draining,
    /// All workers exited
    Stopped,
}

impl fmt::Display for ControllerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initializing => "Initializing",
            Self::Syncing => "Syncing",
            Self::Running => "Running",
            Self::Draining => "Draining",
            Self::Stopped => "Stopped",
        };
        f.write_str(s)
    }
}

/// Controller tuning
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Number of worker tasks
    pub threadiness: usize,
    /// How long to wait for the cache to sync
    pub sync_timeout: Duration,
    /// How often to check the sync predicate
    pub sync_poll_interval: Duration,
    /// Requeues allowed before an item is dropped
    pub max_retries: u32,
    /// Delay applied to requeued items
    pub backoff: ItemBackoff,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threadiness: 1,
            sync_timeout: Duration::from_secs(60),
            sync_poll_interval: Duration::from_millis(100),
            max_retries: MAX_RETRIES,
            backoff: ItemBackoff::default(),
        }
    }
}

/// Watch controller for a single resource type
pub struct ResourceController {
    kind: ResourceKind,
    cache: Arc<dyn ObjectCache>,
    sinks: SinkSet,
    config: ControllerConfig,
    queue: WorkQueue,
    start_time: DateTime<Utc>,
    /// Last resource version dispatched per key
    observed: DashMap<String, String>,
    phase: RwLock<ControllerPhase>,
}

impl ResourceController {
    /// Create a controller; objects created before now count as replays
    pub fn new(
        kind: ResourceKind,
        cache: Arc<dyn ObjectCache>,
        sinks: SinkSet,
        config: ControllerConfig,
    ) -> Self {
        Self::with_start_time(kind, cache, sinks, config, Utc::now())
    }

    /// Create a controller with an explicit start time.
    ///
    /// `creationTimestamp` has whole-second precision, so the start time is
    /// truncated to the second. An object created during the startup second
    /// is treated as a replay: it may already have been in the initial list.
    pub fn with_start_time(
        kind: ResourceKind,
        cache: Arc<dyn ObjectCache>,
        sinks: SinkSet,
        config: ControllerConfig,
        start_time: DateTime<Utc>,
    ) -> Self {
        let queue = WorkQueue::new(config.backoff);
        Self {
            kind,
            cache,
            sinks,
            config,
            queue,
            start_time: start_time.trunc_subsecs(0),
            observed: DashMap::new(),
            phase: RwLock::new(ControllerPhase::Initializing),
        }
    }

    /// Resource type this controller watches
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ControllerPhase {
        *self.phase.read()
    }

    /// The controller's work queue
    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Instant before which creates are treated as replays
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    fn set_phase(&self, phase: ControllerPhase) {
        *self.phase.write() = phase;
        debug!(kind = %self.kind, phase = %phase, "Controller phase changed");
    }

    // =========================================================================
    // Notification handlers
    // =========================================================================

    /// An object appeared in the cache
    pub fn on_add(&self, key: &str, resource_version: Option<String>) {
        trace!(kind = %self.kind, key, "add");
        self.queue
            .add(WorkItem::new(key, self.kind, Action::Create, resource_version));
    }

    /// An object in the cache changed; identical versions are dropped
    pub fn on_update(&self, key: &str, old_version: Option<&str>, new_version: Option<String>) {
        if old_version.is_some() && old_version == new_version.as_deref() {
            trace!(kind = %self.kind, key, "Resync with unchanged resource version");
            metrics::record_update_skipped(self.kind.as_str());
            return;
        }
        self.queue
            .add(WorkItem::new(key, self.kind, Action::Update, new_version));
    }

    /// An object left the cache
    pub fn on_delete(&self, key: &str, resource_version: Option<String>) {
        trace!(kind = %self.kind, key, "delete");
        self.queue
            .add(WorkItem::new(key, self.kind, Action::Delete, resource_version));
    }

    // =========================================================================
    // Run loop
    // =========================================================================

    /// Wait for the cache, run workers until `shutdown` fires, then drain.
    ///
    /// Returns [`Error::CacheSync`] without starting workers when the cache
    /// does not sync in time.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        self.set_phase(ControllerPhase::Syncing);
        info!(kind = %self.kind, timeout = ?self.config.sync_timeout, "Waiting for cache sync");

        match self.wait_for_sync(&shutdown).await {
            Ok(true) => {}
            Ok(false) => {
                self.queue.shut_down();
                self.set_phase(ControllerPhase::Stopped);
                return Ok(());
            }
            Err(e) => {
                error!(kind = %self.kind, error = %e, "Cache sync failed, controller not started");
                self.queue.shut_down();
                self.set_phase(ControllerPhase::Stopped);
                return Err(e);
            }
        }

        let threadiness = self.config.threadiness.max(1);
        let mut workers = JoinSet::new();
        for _ in 0..threadiness {
            let controller = self.clone();
            workers.spawn(async move { controller.worker().await });
        }
        self.set_phase(ControllerPhase::Running);
        info!(kind = %self.kind, workers = threadiness, "Controller running");

        shutdown.cancelled().await;

        self.set_phase(ControllerPhase::Draining);
        self.queue.shut_down();
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(kind = %self.kind, error = %e, "Worker task failed");
            }
        }
        self.set_phase(ControllerPhase::Stopped);
        info!(kind = %self.kind, "Controller stopped");
        Ok(())
    }

    /// `Ok(true)` once synced, `Ok(false)` if stopped while waiting
    async fn wait_for_sync(&self, shutdown: &CancellationToken) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + self.config.sync_timeout;
        loop {
            if self.cache.has_synced() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::cache_sync(self.kind.as_str(), self.config.sync_timeout));
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(false),
                _ = tokio::time::sleep(self.config.sync_poll_interval) => {}
            }
        }
    }

    async fn worker(&self) {
        while let Some(item) = self.queue.get().await {
            self.process_next(item).await;
        }
    }

    async fn process_next(&self, item: WorkItem) {
        let key = item.key.clone();
        let result = self.process(&item).await;
        self.handle_result(item, result);
        self.queue.done(&key);
    }

    /// Requeue on failure while under the retry limit, otherwise drop
    fn handle_result(&self, item: WorkItem, result: Result<()>) {
        let Err(e) = result else {
            self.queue.forget(&item.key);
            return;
        };

        let requeues = self.queue.num_requeues(&item.key);
        if requeues < self.config.max_retries {
            warn!(
                kind = %self.kind,
                key = %item.key,
                attempt = requeues + 1,
                error = %e,
                "Error processing item, requeueing"
            );
            metrics::record_requeue(self.kind.as_str());
            self.queue.add_rate_limited(item);
        } else {
            error!(
                kind = %self.kind,
                key = %item.key,
                action = %item.action,
                error = %e,
                "Error processing item, giving up after max retries"
            );
            metrics::record_drop(self.kind.as_str());
            self.queue.forget(&item.key);
        }
    }

    /// Turn one work item into sink notifications
    async fn process(&self, item: &WorkItem) -> Result<()> {
        let Some(object) = self.cache.get(&item.key)? else {
            debug!(kind = %self.kind, key = %item.key, "Object no longer in cache, treating as deleted");
            return self.dispatch_delete(&item.key).await;
        };

        match item.action {
            Action::Create => {
                let event = normalize(&object, Action::Create);
                self.record_observed(&item.key, &object);

                let created = object
                    .metadata()
                    .and_then(|m| m.creation_timestamp.as_ref())
                    .map(|t| t.0);
                if created.is_some_and(|t| t > self.start_time) {
                    self.dispatch(Notification::Created, &event).await;
                } else {
                    metrics::record_replay(self.kind.as_str());
                    self.dispatch(Notification::Replayed, &event).await;
                }
            }
            Action::Update => {
                if let Some(rv) = object.resource_version() {
                    let unchanged = self
                        .observed
                        .get(&item.key)
                        .is_some_and(|seen| seen.as_str() == rv);
                    if unchanged {
                        trace!(kind = %self.kind, key = %item.key, rv, "Update already dispatched");
                        metrics::record_update_skipped(self.kind.as_str());
                        return Ok(());
                    }
                }
                let event = normalize(&object, Action::Update);
                self.record_observed(&item.key, &object);
                self.dispatch(Notification::Updated, &event).await;
            }
            Action::Delete => {
                warn!(kind = %self.kind, key = %item.key, "Delete notification for object still in cache");
                self.dispatch_delete(&item.key).await?;
            }
        }
        Ok(())
    }

    async fn dispatch_delete(&self, key: &str) -> Result<()> {
        let event = normalize(
            &ResourceObject::deleted(self.kind.as_str(), key),
            Action::Delete,
        );
        self.observed.remove(key);
        self.dispatch(Notification::Deleted, &event).await;
        Ok(())
    }

    async fn dispatch(&self, notification: Notification, event: &CanonicalEvent) {
        metrics::record_dispatch(&event.kind, event.action.as_str());
        self.sinks.dispatch(notification, event).await;
    }

    fn record_observed(&self, key: &str, object: &ResourceObject) {
        if let Some(rv) = object.resource_version() {
            self.observed.insert(key.to_string(), rv.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Sink, SinkKind, SinkRegistration};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};

    // =========================================================================
    // Test doubles
    // =========================================================================

    #[derive(Default)]
    struct MemoryCache {
        objects: Mutex<HashMap<String, ResourceObject>>,
        synced: AtomicBool,
    }

    impl MemoryCache {
        fn synced() -> Arc<Self> {
            let cache = Self::default();
            cache.synced.store(true, Ordering::SeqCst);
            Arc::new(cache)
        }

        fn put(&self, key: &str, object: ResourceObject) {
            self.objects.lock().insert(key.to_string(), object);
        }
    }

    impl ObjectCache for MemoryCache {
        fn get(&self, key: &str) -> Result<Option<ResourceObject>> {
            Ok(self.objects.lock().get(key).cloned())
        }

        fn has_synced(&self) -> bool {
            self.synced.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        seen: Mutex<Vec<(Notification, CanonicalEvent)>>,
    }

    impl RecordingSink {
        fn notifications(&self) -> Vec<Notification> {
            self.seen.lock().iter().map(|(n, _)| *n).collect()
        }

        fn events(&self) -> Vec<CanonicalEvent> {
            self.seen.lock().iter().map(|(_, e)| e.clone()).collect()
        }
    }

    #[async_trait]
    impl Sink for RecordingSink {
        fn kind(&self) -> SinkKind {
            SinkKind::Log
        }
        async fn init(&mut self) -> Result<()> {
            Ok(())
        }
        async fn on_created(&self, event: &CanonicalEvent) {
            self.seen.lock().push((Notification::Created, event.clone()));
        }
        async fn on_updated(&self, event: &CanonicalEvent) {
            self.seen.lock().push((Notification::Updated, event.clone()));
        }
        async fn on_deleted(&self, event: &CanonicalEvent) {
            self.seen.lock().push((Notification::Deleted, event.clone()));
        }
        async fn on_replayed(&self, event: &CanonicalEvent) {
            self.seen.lock().push((Notification::Replayed, event.clone()));
        }
    }

    fn sinks(recorder: &Arc<RecordingSink>) -> SinkSet {
        SinkSet::new(vec![SinkRegistration {
            kind: SinkKind::Log,
            enabled: true,
            handler: recorder.clone(),
        }])
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, hour, 0, 0).unwrap()
    }

    fn pod(name: &str, created: DateTime<Utc>, rv: &str) -> ResourceObject {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("default".to_string()),
                resource_version: Some(rv.to_string()),
                creation_timestamp: Some(Time(created)),
                ..Default::default()
            },
            ..Default::default()
        }
        .into()
    }

    fn controller(
        cache: Arc<dyn ObjectCache>,
        recorder: &Arc<RecordingSink>,
        start: DateTime<Utc>,
    ) -> ResourceController {
        ResourceController::with_start_time(
            ResourceKind::Pods,
            cache,
            sinks(recorder),
            ControllerConfig::default(),
            start,
        )
    }

    fn item(key: &str, action: Action) -> WorkItem {
        WorkItem::new(key, ResourceKind::Pods, action, None)
    }

    // =========================================================================
    // Processing
    // =========================================================================

    #[tokio::test]
    async fn absent_object_is_reported_as_deleted() {
        let recorder = Arc::new(RecordingSink::default());
        let ctrl = controller(MemoryCache::synced(), &recorder, at(10));

        ctrl.process(&item("default/web-1", Action::Create)).await.unwrap();

        let events = recorder.events();
        assert_eq!(recorder.notifications(), vec![Notification::Deleted]);
        assert_eq!(events[0].kind, "pods");
        assert_eq!(events[0].namespace, "default");
        assert_eq!(events[0].name, "web-1");
        assert_eq!(events[0].action, Action::Delete);
        assert_eq!(events[0].message, "pods:web-1 in namespace default has been DELETED");
    }

    #[tokio::test]
    async fn creates_before_start_are_replays_and_after_start_are_live() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        cache.put("default/old", pod("old", at(8), "1"));
        cache.put("default/new", pod("new", at(12), "2"));
        let ctrl = controller(cache, &recorder, at(10));

        ctrl.process(&item("default/old", Action::Create)).await.unwrap();
        ctrl.process(&item("default/new", Action::Create)).await.unwrap();

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Replayed, Notification::Created]
        );
        let live = &recorder.events()[1];
        assert_eq!(live.message, "pods:new in namespace default has been CREATED");
        assert_eq!(live.action, Action::Create);
    }

    #[tokio::test]
    async fn create_at_start_second_is_a_replay() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        cache.put("default/same", pod("same", at(10), "1"));
        let ctrl = controller(cache, &recorder, at(10));

        ctrl.process(&item("default/same", Action::Create)).await.unwrap();

        assert_eq!(recorder.notifications(), vec![Notification::Replayed]);
    }

    #[tokio::test]
    async fn start_time_is_compared_at_second_precision() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        let start = at(10) + chrono::Duration::milliseconds(700);
        cache.put("default/same-second", pod("same-second", at(10), "1"));
        cache.put(
            "default/next-second",
            pod("next-second", at(10) + chrono::Duration::seconds(1), "2"),
        );
        let ctrl = controller(cache, &recorder, start);
        assert_eq!(ctrl.start_time(), at(10));

        ctrl.process(&item("default/same-second", Action::Create)).await.unwrap();
        ctrl.process(&item("default/next-second", Action::Create)).await.unwrap();

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Replayed, Notification::Created]
        );
    }

    /// Story: the process restarts twice; objects that existed before each
    /// start are replayed but never announced as new.
    #[tokio::test]
    async fn restarts_do_not_duplicate_creates() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        cache.put("default/web-1", pod("web-1", at(8), "1"));

        for start in [at(9), at(11)] {
            let ctrl = controller(cache.clone(), &recorder, start);
            ctrl.process(&item("default/web-1", Action::Create)).await.unwrap();
        }

        assert_eq!(
            recorder.notifications(),
            vec![Notification::Replayed, Notification::Replayed]
        );
    }

    #[tokio::test]
    async fn update_with_unchanged_version_is_skipped() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        cache.put("default/web-1", pod("web-1", at(8), "5"));
        let ctrl = controller(cache.clone(), &recorder, at(10));

        ctrl.process(&item("default/web-1", Action::Update)).await.unwrap();
        ctrl.process(&item("default/web-1", Action::Update)).await.unwrap();
        assert_eq!(recorder.notifications(), vec![Notification::Updated]);

        cache.put("default/web-1", pod("web-1", at(8), "6"));
        ctrl.process(&item("default/web-1", Action::Update)).await.unwrap();
        assert_eq!(
            recorder.notifications(),
            vec![Notification::Updated, Notification::Updated]
        );
        assert_eq!(recorder.events()[1].resource_version, "6");
    }

    #[tokio::test]
    async fn delete_forgets_observed_version() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        cache.put("default/web-1", pod("web-1", at(8), "5"));
        let ctrl = controller(cache.clone(), &recorder, at(10));

        ctrl.process(&item("default/web-1", Action::Update)).await.unwrap();
        ctrl.process(&item("default/web-1", Action::Delete)).await.unwrap();
        ctrl.process(&item("default/web-1", Action::Update)).await.unwrap();

        assert_eq!(
            recorder.notifications(),
            vec![
                Notification::Updated,
                Notification::Deleted,
                Notification::Updated
            ]
        );
    }

    #[test]
    fn notification_with_identical_versions_is_not_queued() {
        let recorder = Arc::new(RecordingSink::default());
        let ctrl = controller(MemoryCache::synced(), &recorder, at(10));

        ctrl.on_update("default/web-1", Some("7"), Some("7".to_string()));
        assert!(ctrl.queue().is_empty());

        ctrl.on_update("default/web-1", Some("7"), Some("8".to_string()));
        ctrl.on_add("default/web-2", Some("1".to_string()));
        ctrl.on_delete("default/web-3", None);
        assert_eq!(ctrl.queue().len(), 3);
    }

    #[tokio::test]
    async fn failing_item_is_requeued_five_times_then_dropped() {
        let mut cache = MockObjectCache::new();
        cache
            .expect_get()
            .returning(|key| Err(Error::cache(key, "store unavailable")));
        cache.expect_has_synced().return_const(true);

        let recorder = Arc::new(RecordingSink::default());
        let ctrl = controller(Arc::new(cache), &recorder, at(10));
        let work = item("default/web-1", Action::Create);

        for attempt in 1..=MAX_RETRIES {
            let result = ctrl.process(&work).await;
            assert!(result.is_err());
            ctrl.handle_result(work.clone(), result);
            assert_eq!(ctrl.queue().num_requeues(&work.key), attempt);
        }

        let before = metrics::snapshot().items_dropped;
        let result = ctrl.process(&work).await;
        ctrl.handle_result(work.clone(), result);
        assert_eq!(ctrl.queue().num_requeues(&work.key), 0);
        assert!(metrics::snapshot().items_dropped > before);
        assert!(recorder.notifications().is_empty());
    }

    #[tokio::test]
    async fn success_forgets_retry_history() {
        let recorder = Arc::new(RecordingSink::default());
        let ctrl = controller(MemoryCache::synced(), &recorder, at(10));
        let work = item("default/web-1", Action::Create);

        ctrl.handle_result(work.clone(), Err(Error::cache(&work.key, "transient")));
        assert_eq!(ctrl.queue().num_requeues(&work.key), 1);
        ctrl.handle_result(work.clone(), Ok(()));
        assert_eq!(ctrl.queue().num_requeues(&work.key), 0);
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[tokio::test(start_paused = true)]
    async fn sync_timeout_stops_controller_without_workers() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = Arc::new(MemoryCache::default());
        let ctrl = Arc::new(ResourceController::with_start_time(
            ResourceKind::Nodes,
            cache,
            sinks(&recorder),
            ControllerConfig {
                sync_timeout: Duration::from_secs(2),
                ..Default::default()
            },
            at(10),
        ));

        let err = ctrl.clone().run(CancellationToken::new()).await.unwrap_err();
        match err {
            Error::CacheSync { kind, timeout } => {
                assert_eq!(kind, "nodes");
                assert_eq!(timeout, Duration::from_secs(2));
            }
            other => panic!("expected CacheSync, got {other}"),
        }
        assert_eq!(ctrl.phase(), ControllerPhase::Stopped);
        assert!(ctrl.queue().is_shutting_down());
    }

    #[tokio::test]
    async fn run_processes_items_and_drains_on_shutdown() {
        let recorder = Arc::new(RecordingSink::default());
        let cache = MemoryCache::synced();
        let live = Utc::now() + chrono::Duration::hours(1);
        cache.put("default/web-1", pod("web-1", live, "1"));

        let ctrl = Arc::new(ResourceController::new(
            ResourceKind::Pods,
            cache,
            sinks(&recorder),
            ControllerConfig {
                threadiness: 2,
                ..Default::default()
            },
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(ctrl.clone().run(shutdown.clone()));

        ctrl.on_add("default/web-1", Some("1".to_string()));
        ctrl.on_delete("default/gone", None);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while recorder.notifications().len() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "items not processed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(ctrl.phase(), ControllerPhase::Running);

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(ctrl.phase(), ControllerPhase::Stopped);

        let mut seen = recorder.notifications();
        seen.sort_by_key(|n| format!("{n:?}"));
        assert_eq!(seen, vec![Notification::Created, Notification::Deleted]);
    }
}
