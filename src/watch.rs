//! Watch driver: kube watcher + reflector feeding a [`ResourceController`]
//!
//! The reflector store is the controller's [`ObjectCache`]. Watch events are
//! translated into `on_add`/`on_update`/`on_delete` calls with a key to
//! resource version map, so objects that vanished while the watch was
//! disconnected show up as deletes after the next relist.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher::{self, Event};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::controller::{ObjectCache, ResourceController};
use crate::event::{object_key, split_key, ResourceObject};
use crate::Result;

/// Watcher timeout (seconds), kept below the client read timeout so idle
/// watches are closed by the API server first
pub const WATCH_TIMEOUT_SECS: u32 = 25;

/// Reflector-backed cache for one resource type
pub struct KubeObjectCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    store: Store<K>,
    synced: Arc<AtomicBool>,
}

impl<K> ObjectCache for KubeObjectCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + Into<ResourceObject> + 'static,
{
    fn get(&self, key: &str) -> Result<Option<ResourceObject>> {
        let (namespace, name) = split_key(key);
        let mut obj_ref = ObjectRef::<K>::new(name);
        if let Some(ns) = namespace {
            obj_ref = obj_ref.within(ns);
        }
        Ok(self.store.get(&obj_ref).map(|obj| (*obj).clone().into()))
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Translates watcher events into controller notifications
#[derive(Debug, Default)]
pub struct EventTranslator {
    /// Last known resource version per key
    known: HashMap<String, Option<String>>,
    /// Keys seen during an in-progress (re)list
    relist: Option<HashMap<String, Option<String>>>,
    synced: Arc<AtomicBool>,
}

impl EventTranslator {
    /// Create a translator that flips `synced` on the first completed list
    pub fn new(synced: Arc<AtomicBool>) -> Self {
        Self {
            known: HashMap::new(),
            relist: None,
            synced,
        }
    }

    /// Feed one watcher event to `controller`
    pub fn handle<K: Resource>(&mut self, event: Event<K>, controller: &ResourceController) {
        match event {
            Event::Init => {
                debug!(kind = %controller.kind(), "Listing started");
                self.relist = Some(HashMap::new());
            }
            Event::InitApply(obj) => {
                let (key, rv) = identity(&obj);
                self.relist
                    .get_or_insert_with(HashMap::new)
                    .insert(key, rv);
            }
            Event::InitDone => {
                // The reflector swaps in the listed objects on InitDone, so
                // notifications are held until the cache reflects them
                let listed = self.relist.take().unwrap_or_default();
                for (key, rv) in &listed {
                    self.notify_apply(key, rv.clone(), controller);
                }
                for (key, rv) in &self.known {
                    if !listed.contains_key(key) {
                        debug!(kind = %controller.kind(), key = %key, "Object missing after relist");
                        controller.on_delete(key, rv.clone());
                    }
                }
                self.known = listed;
                if !self.synced.swap(true, Ordering::AcqRel) {
                    info!(kind = %controller.kind(), objects = self.known.len(), "Watch cache synced");
                }
            }
            Event::Apply(obj) => {
                let (key, rv) = identity(&obj);
                self.notify_apply(&key, rv.clone(), controller);
                self.known.insert(key, rv);
            }
            Event::Delete(obj) => {
                let (key, rv) = identity(&obj);
                self.known.remove(&key);
                controller.on_delete(&key, rv);
            }
        }
    }

    fn notify_apply(&self, key: &str, rv: Option<String>, controller: &ResourceController) {
        match self.known.get(key) {
            Some(old) => controller.on_update(key, old.as_deref(), rv),
            None => controller.on_add(key, rv),
        }
    }
}

fn identity<K: Resource>(obj: &K) -> (String, Option<String>) {
    let meta = obj.meta();
    (object_key(meta), meta.resource_version.clone())
}

/// Writer half of a watch: owns the reflector writer and the sync flag
pub struct WatchDriver<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    writer: reflector::store::Writer<K>,
    synced: Arc<AtomicBool>,
}

/// Create a cache and the driver that fills it
pub fn watch_cache<K>() -> (Arc<KubeObjectCache<K>>, WatchDriver<K>)
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    let (store, writer) = reflector::store();
    let synced = Arc::new(AtomicBool::new(false));
    let cache = Arc::new(KubeObjectCache {
        store,
        synced: synced.clone(),
    });
    (cache, WatchDriver { writer, synced })
}

impl<K> WatchDriver<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Stream events from `api` into the cache and `controller` until stopped
    pub async fn run(
        self,
        api: Api<K>,
        controller: Arc<ResourceController>,
        shutdown: CancellationToken,
    ) {
        let kind = controller.kind();
        let config = watcher::Config::default().timeout(WATCH_TIMEOUT_SECS);
        let stream = reflector::reflector(
            self.writer,
            watcher::watcher(api, config).default_backoff(),
        );
        let mut stream = std::pin::pin!(stream);
        let mut translator = EventTranslator::new(self.synced);

        info!(%kind, "Starting watch");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = stream.next() => match next {
                    Some(Ok(event)) => translator.handle(event, &controller),
                    Some(Err(e)) => warn!(%kind, error = %e, "Watch error, will retry"),
                    None => {
                        warn!(%kind, "Watch stream ended");
                        break;
                    }
                },
            }
        }
        info!(%kind, "Watch stopped");
    }
}
