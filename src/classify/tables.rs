//! Built-in reason tables.

use std::collections::{HashMap, HashSet};

/// Description used when a `Killing` event reports a failed liveness probe
pub const LIVENESS_KILLING_DESCRIPTION: &str = "Container killed after failing its health check";

/// Description used when a `Killing` event reports a failed post-start hook
pub const POST_START_KILLING_DESCRIPTION: &str = "Container start failed: PostStartHook error";

const USER_REASONS: &[(&str, &str)] = &[
    ("HostPortConflict", "Host port conflict, configure a free port"),
    ("BackOff", "BackOff"),
    ("CrashLoopBackOff", "Container failed to start"),
    ("Killing", "Container was killed"),
];

const ADMIN_REASONS: &[(&str, &str)] = &[
    ("SystemOOM", "Node system ran out of memory"),
    ("FailedCreatePodContainer", "Failed to create container"),
    ("Evicted", "Pod evicted because of node pressure"),
    ("DeletingAllPods", "Deleting all pods on node"),
    ("FailedCreate", "FailedCreate"),
    ("ReplicaSetCreateError", "ReplicaSetCreateError"),
    ("EvictionThresholdMet", "Disk space low, attempting to reclaim"),
    ("FailedToStartNodeHealthcheck", "FailedToStartNodeHealthcheck"),
    ("NodeHasDiskPressure", "Kubelet is under disk pressure"),
    ("NodeNotReady", "Node is not ready"),
    ("NodeHasInsufficientMemory", "Node has insufficient memory"),
    ("InvalidDiskCapacity", "InvalidDiskCapacity"),
    ("FreeDiskSpaceFailed", "FreeDiskSpaceFailed"),
    ("InsufficientFreeCPU", "Insufficient free CPU"),
    ("InsufficientFreeMemory", "Insufficient free memory"),
    ("HostNetworkNotSupported", "HostNetworkNotSupported"),
    ("Failed", "Failed"),
    ("NodeNotSchedulable", "Node is not schedulable"),
    ("KubeletSetupFailed", "KubeletSetupFailed"),
    ("FailedAttachVolume", "FailedAttachVolume"),
    ("FailedDetachVolume", "FailedDetachVolume"),
    ("VolumeResizeFailed", "VolumeResizeFailed"),
    ("FileSystemResizeFailed", "FileSystemResizeFailed"),
    ("FailedUnMount", "FailedUnMount"),
    ("FailedUnmapDevice", "FailedUnmapDevice"),
    ("NodeSelectorMismatching", "NodeSelectorMismatching"),
    ("NilShaper", "NilShaper"),
    ("Rebooted", "Rebooted"),
    ("ContainerGCFailed", "ContainerGCFailed"),
    ("ErrImageNeverPull", "ErrImageNeverPull"),
    ("NetworkNotReady", "NetworkNotReady"),
    ("FailedKillPod", "FailedKillPod"),
    ("RemovingNode", "Node is being removed"),
    ("FailedMount", "FailedMount"),
    ("FailedScheduling", "Scheduling failed"),
];

const NORMAL_REASONS: &[(&str, &str)] = &[
    ("NodeSchedulable", "NodeSchedulable"),
    ("NodeReady", "NodeReady"),
    ("Pulling", "Pulling"),
    ("Scheduled", "Scheduled"),
    ("Pulled", "Pulled"),
    ("Started", "Started"),
    ("Created", "Created"),
    ("CREATE", "CREATE"),
    ("UPDATE", "UPDATE"),
    ("DELETE", "DELETE"),
    ("Starting", "Starting"),
    ("SuccessfulMountVolume", "SuccessfulMountVolume"),
    ("SuccessfulCreate", "SuccessfulCreate"),
    ("SuccessfulDelete", "SuccessfulDelete"),
    ("ScalingReplicaSet", "ScalingReplicaSet"),
    ("RegisteredNode", "RegisteredNode"),
    ("LeaderElection", "LeaderElection"),
    ("CreatedLoadBalancer", "CreatedLoadBalancer"),
    ("NodeHasNoDiskPressure", "Node has no disk pressure"),
    ("NodeHasSufficientMemory", "Node has sufficient memory"),
    ("NodeHasSufficientDisk", "Node has sufficient disk"),
    ("SandboxChanged", "SandboxChanged"),
    ("FailedCreatePodSandBox", "FailedCreatePodSandBox"),
    ("FailedPodSandBoxStatus", "FailedPodSandBoxStatus"),
];

const WARNING_REASONS: &[(&str, &str)] = &[
    ("Unhealthy", "Container health check reported Unhealthy"),
    ("FailedSync", "FailedSync"),
    ("FailedPostStartHook", "Container post-start hook failed"),
    ("FailedPreStopHook", "Container pre-stop hook failed"),
    ("ImageGCFailed", "ImageGCFailed"),
    ("FailedDaemonPod", "FailedDaemonPod"),
    ("NodeControllerEviction", "Marking pods on node for deletion"),
    ("NodeAllocatableEnforced", "NodeAllocatableEnforced"),
    ("ProbeWarning", "Health check reported a warning"),
    ("UnfinishedPreStopHook", "Pre-stop hook exceeded its timeout, container force-killed"),
];

const ESCALATION_NAMESPACES: &[&str] = &[
    "kube-system",
    "kube-public",
    "default",
    "ingress-nginx",
    "ingress-nginx-blue",
    "cre",
    "monitoring",
    "ops",
    "weave",
];

/// Reason lookup tables used by the classifier.
///
/// Built once at start-up and shared behind an `Arc`; never mutated.
#[derive(Clone, Debug)]
pub struct ClassificationTables {
    pub(crate) user: HashMap<String, String>,
    pub(crate) admin: HashMap<String, String>,
    pub(crate) normal: HashMap<String, String>,
    pub(crate) warning: HashMap<String, String>,
    pub(crate) escalation_namespaces: HashSet<String>,
}

impl Default for ClassificationTables {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ClassificationTables {
    /// The built-in reason tables and escalation namespaces
    pub fn builtin() -> Self {
        Self {
            user: to_map(USER_REASONS),
            admin: to_map(ADMIN_REASONS),
            normal: to_map(NORMAL_REASONS),
            warning: to_map(WARNING_REASONS),
            escalation_namespaces: ESCALATION_NAMESPACES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the escalation namespace set
    pub fn with_escalation_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.escalation_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Whether user-tier events in `namespace` go to admins
    pub fn escalates(&self, namespace: &str) -> bool {
        self.escalation_namespaces.contains(namespace)
    }
}

fn to_map(entries: &[(&str, &str)]) -> HashMap<String, String> {
    entries
        .iter()
        .map(|(reason, description)| (reason.to_string(), description.to_string()))
        .collect()
}
