//! Orchestration: one controller and one watch per enabled resource type
//!
//! Every controller shares the process-wide stop signal. A controller whose
//! cache fails to sync stops its own watch and is reported in the
//! [`RunSummary`]; the others keep running.

use std::fmt::Debug;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Event as CoreEvent, Namespace, Node, PersistentVolume,
    PersistentVolumeClaim, Pod, ReplicationController, Secret, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::classify::{ClassificationTables, Classifier};
use crate::config::{Config, Settings};
use crate::controller::{ControllerConfig, ResourceController};
use crate::event::{ResourceKind, ResourceObject};
use crate::sink::SinkSet;
use crate::watch::watch_cache;
use crate::Error;

/// Outcome of a completed run
#[derive(Debug, Default)]
pub struct RunSummary {
    /// Controllers that stopped cleanly
    pub stopped: Vec<ResourceKind>,
    /// Controllers that failed, with the reason
    pub failed: Vec<(ResourceKind, Error)>,
}

/// Classifier with built-in tables and the configured escalation namespaces
pub fn classifier_from_config(config: &Config) -> Classifier {
    let tables = match &config.handlers.alert.escalation_namespaces {
        Some(namespaces) => ClassificationTables::builtin()
            .with_escalation_namespaces(namespaces.iter().cloned()),
        None => ClassificationTables::builtin(),
    };
    Classifier::new(Arc::new(tables))
}

/// Controller tuning from the `settings` config section
pub fn controller_config(settings: &Settings) -> ControllerConfig {
    ControllerConfig {
        threadiness: settings.threadiness,
        sync_timeout: settings.sync_timeout(),
        ..Default::default()
    }
}

/// Runs every enabled resource controller until the stop signal fires
pub struct Runner {
    client: Client,
    kinds: Vec<ResourceKind>,
    sinks: SinkSet,
    config: ControllerConfig,
}

impl Runner {
    /// Create a runner for `kinds`
    pub fn new(
        client: Client,
        kinds: Vec<ResourceKind>,
        sinks: SinkSet,
        config: ControllerConfig,
    ) -> Self {
        Self {
            client,
            kinds,
            sinks,
            config,
        }
    }

    /// Start all controllers and wait for them to finish
    pub async fn run(self, shutdown: CancellationToken) -> RunSummary {
        let mut controllers = JoinSet::new();
        let mut watches = JoinSet::new();

        info!(kinds = ?self.kinds, "Starting resource controllers");
        for kind in &self.kinds {
            let tasks = Tasks {
                sinks: self.sinks.clone(),
                config: self.config.clone(),
                shutdown: shutdown.clone(),
                controllers: &mut controllers,
                watches: &mut watches,
            };
            spawn_kind(*kind, self.client.clone(), tasks);
        }

        let mut summary = RunSummary::default();
        while let Some(joined) = controllers.join_next().await {
            match joined {
                Ok((kind, Ok(()))) => summary.stopped.push(kind),
                Ok((kind, Err(e))) => {
                    error!(%kind, error = %e, "Resource controller failed");
                    summary.failed.push((kind, e));
                }
                Err(e) => error!(error = %e, "Controller task panicked"),
            }
        }

        // Controllers only return after shutdown or a sync failure; both
        // stop the matching watch
        while let Some(joined) = watches.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Watch task panicked");
            }
        }

        info!(
            stopped = summary.stopped.len(),
            failed = summary.failed.len(),
            "All resource controllers finished"
        );
        summary
    }
}

struct Tasks<'a> {
    sinks: SinkSet,
    config: ControllerConfig,
    shutdown: CancellationToken,
    controllers: &'a mut JoinSet<(ResourceKind, crate::Result<()>)>,
    watches: &'a mut JoinSet<()>,
}

fn spawn_kind(kind: ResourceKind, client: Client, tasks: Tasks<'_>) {
    match kind {
        ResourceKind::Pods => spawn_typed::<Pod>(kind, Api::all(client), tasks),
        ResourceKind::Nodes => spawn_typed::<Node>(kind, Api::all(client), tasks),
        ResourceKind::Deployments => spawn_typed::<Deployment>(kind, Api::all(client), tasks),
        ResourceKind::DaemonSets => spawn_typed::<DaemonSet>(kind, Api::all(client), tasks),
        ResourceKind::ReplicaSets => spawn_typed::<ReplicaSet>(kind, Api::all(client), tasks),
        ResourceKind::ReplicationControllers => {
            spawn_typed::<ReplicationController>(kind, Api::all(client), tasks)
        }
        ResourceKind::Jobs => spawn_typed::<Job>(kind, Api::all(client), tasks),
        ResourceKind::PersistentVolumes => {
            spawn_typed::<PersistentVolume>(kind, Api::all(client), tasks)
        }
        ResourceKind::PersistentVolumeClaims => {
            spawn_typed::<PersistentVolumeClaim>(kind, Api::all(client), tasks)
        }
        ResourceKind::Namespaces => spawn_typed::<Namespace>(kind, Api::all(client), tasks),
        ResourceKind::Services => spawn_typed::<Service>(kind, Api::all(client), tasks),
        ResourceKind::Secrets => spawn_typed::<Secret>(kind, Api::all(client), tasks),
        ResourceKind::ConfigMaps => spawn_typed::<ConfigMap>(kind, Api::all(client), tasks),
        ResourceKind::Endpoints => spawn_typed::<Endpoints>(kind, Api::all(client), tasks),
        ResourceKind::Ingresses => spawn_typed::<Ingress>(kind, Api::all(client), tasks),
        ResourceKind::Roles => spawn_typed::<Role>(kind, Api::all(client), tasks),
        ResourceKind::RoleBindings => spawn_typed::<RoleBinding>(kind, Api::all(client), tasks),
        ResourceKind::ClusterRoles => spawn_typed::<ClusterRole>(kind, Api::all(client), tasks),
        ResourceKind::ClusterRoleBindings => {
            spawn_typed::<ClusterRoleBinding>(kind, Api::all(client), tasks)
        }
        ResourceKind::Events => spawn_typed::<CoreEvent>(kind, Api::all(client), tasks),
    }
}

fn spawn_typed<K>(kind: ResourceKind, api: Api<K>, tasks: Tasks<'_>)
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + Into<ResourceObject>
        + 'static,
{
    let (cache, driver) = watch_cache::<K>();
    let controller = Arc::new(ResourceController::new(
        kind,
        cache,
        tasks.sinks,
        tasks.config,
    ));

    let watch_stop = tasks.shutdown.child_token();
    tasks
        .watches
        .spawn(driver.run(api, controller.clone(), watch_stop.clone()));

    let shutdown = tasks.shutdown;
    tasks.controllers.spawn(async move {
        let result = controller.run(shutdown).await;
        if result.is_err() {
            watch_stop.cancel();
        }
        (kind, result)
    });
}
