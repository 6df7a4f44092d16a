//! The closed set of resource shapes the normalizer understands.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, Event as CoreEvent, Namespace, Node, PersistentVolume,
    PersistentVolumeClaim, Pod, ReplicationController, Secret, Service,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Watchable resource types, named by their plural API resource name.
///
/// The plural name is what ends up in [`CanonicalEvent::kind`](super::CanonicalEvent)
/// and what the configuration's `resources[].name` refers to.
#[allow(missing_docs)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Pods,
    Nodes,
    Deployments,
    DaemonSets,
    ReplicaSets,
    ReplicationControllers,
    Jobs,
    PersistentVolumes,
    PersistentVolumeClaims,
    Namespaces,
    Services,
    Secrets,
    ConfigMaps,
    Endpoints,
    Ingresses,
    Roles,
    RoleBindings,
    ClusterRoles,
    ClusterRoleBindings,
    Events,
}

impl ResourceKind {
    /// Every supported kind
    pub const ALL: [ResourceKind; 20] = [
        Self::Pods,
        Self::Nodes,
        Self::Deployments,
        Self::DaemonSets,
        Self::ReplicaSets,
        Self::ReplicationControllers,
        Self::Jobs,
        Self::PersistentVolumes,
        Self::PersistentVolumeClaims,
        Self::Namespaces,
        Self::Services,
        Self::Secrets,
        Self::ConfigMaps,
        Self::Endpoints,
        Self::Ingresses,
        Self::Roles,
        Self::RoleBindings,
        Self::ClusterRoles,
        Self::ClusterRoleBindings,
        Self::Events,
    ];

    /// Plural API resource name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pods => "pods",
            Self::Nodes => "nodes",
            Self::Deployments => "deployments",
            Self::DaemonSets => "daemonsets",
            Self::ReplicaSets => "replicasets",
            Self::ReplicationControllers => "replicationcontrollers",
            Self::Jobs => "jobs",
            Self::PersistentVolumes => "persistentvolumes",
            Self::PersistentVolumeClaims => "persistentvolumeclaims",
            Self::Namespaces => "namespaces",
            Self::Services => "services",
            Self::Secrets => "secrets",
            Self::ConfigMaps => "configmaps",
            Self::Endpoints => "endpoints",
            Self::Ingresses => "ingresses",
            Self::Roles => "roles",
            Self::RoleBindings => "rolebindings",
            Self::ClusterRoles => "clusterroles",
            Self::ClusterRoleBindings => "clusterrolebindings",
            Self::Events => "events",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| Error::config(format!("unknown resource type: {s}")))
    }
}

/// Minimal record reconstructed for an object that is no longer in the cache
#[derive(Clone, Debug, PartialEq)]
pub struct DeletedObject {
    /// Plural resource kind
    pub kind: String,
    /// Cache key, `namespace/name` or `name`
    pub key: String,
}

macro_rules! resource_objects {
    ($($variant:ident($ty:ty) => $kind:ident),* $(,)?) => {
        /// A cached object of one of the known shapes.
        ///
        /// `Deleted` stands in for objects that have already left the cache;
        /// `Unrecognized` carries any other shape so it can still be reported.
        #[derive(Clone, Debug, PartialEq)]
        pub enum ResourceObject {
            $(
                #[allow(missing_docs)]
                $variant($ty),
            )*
            /// Object already gone from the cache
            Deleted(DeletedObject),
            /// Shape outside the supported set
            Unrecognized {
                /// Raw kind as reported by the source
                kind: String,
                /// Object metadata
                metadata: ObjectMeta,
            },
        }

        impl ResourceObject {
            /// Object metadata, absent for deleted records
            pub fn metadata(&self) -> Option<&ObjectMeta> {
                match self {
                    $(Self::$variant(o) => Some(&o.metadata),)*
                    Self::Deleted(_) => None,
                    Self::Unrecognized { metadata, .. } => Some(metadata),
                }
            }

            /// Plural kind used for routing
            pub fn kind(&self) -> &str {
                match self {
                    $(Self::$variant(_) => ResourceKind::$kind.as_str(),)*
                    Self::Deleted(d) => &d.kind,
                    Self::Unrecognized { kind, .. } => kind,
                }
            }
        }

        $(
            impl From<$ty> for ResourceObject {
                fn from(o: $ty) -> Self {
                    Self::$variant(o)
                }
            }
        )*
    };
}

resource_objects! {
    Pod(Pod) => Pods,
    Node(Node) => Nodes,
    Deployment(Deployment) => Deployments,
    DaemonSet(DaemonSet) => DaemonSets,
    ReplicaSet(ReplicaSet) => ReplicaSets,
    ReplicationController(ReplicationController) => ReplicationControllers,
    Job(Job) => Jobs,
    PersistentVolume(PersistentVolume) => PersistentVolumes,
    PersistentVolumeClaim(PersistentVolumeClaim) => PersistentVolumeClaims,
    Namespace(Namespace) => Namespaces,
    Service(Service) => Services,
    Secret(Secret) => Secrets,
    ConfigMap(ConfigMap) => ConfigMaps,
    Endpoints(Endpoints) => Endpoints,
    Ingress(Ingress) => Ingresses,
    Role(Role) => Roles,
    RoleBinding(RoleBinding) => RoleBindings,
    ClusterRole(ClusterRole) => ClusterRoles,
    ClusterRoleBinding(ClusterRoleBinding) => ClusterRoleBindings,
    Event(CoreEvent) => Events,
}

impl ResourceObject {
    /// Build the stand-in record for an object missing from the cache
    pub fn deleted(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Deleted(DeletedObject {
            kind: kind.into(),
            key: key.into(),
        })
    }

    /// Resource version from metadata, if any
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata()?.resource_version.as_deref()
    }
}

/// Cache key for an object: `namespace/name`, or `name` when cluster-scoped
pub fn object_key(meta: &ObjectMeta) -> String {
    let name = meta.name.as_deref().unwrap_or_default();
    match meta.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => format!("{ns}/{name}"),
        _ => name.to_string(),
    }
}

/// Split a cache key into `(namespace, name)`
pub fn split_key(key: &str) -> (Option<&str>, &str) {
    match key.split_once('/') {
        Some((ns, name)) => (Some(ns), name),
        None => (None, key),
    }
}
