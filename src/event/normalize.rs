//! Conversion of cached objects into [`CanonicalEvent`]s.

use k8s_openapi::api::core::v1::Event as CoreEvent;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use tracing::{debug, warn};

use super::resource::{split_key, DeletedObject, ResourceObject};
use super::{format_time, Action, CanonicalEvent, EMPTY_HOST};

/// Build the canonical record for `object` under `action`.
///
/// Never fails: shapes that cannot be fully read yield a partial record.
pub fn normalize(object: &ResourceObject, action: Action) -> CanonicalEvent {
    let mut event = CanonicalEvent {
        kind: object.kind().to_string(),
        action,
        ..Default::default()
    };

    if let Some(meta) = object.metadata() {
        event.namespace = meta.namespace.clone().unwrap_or_default();
        event.name = meta.name.clone().unwrap_or_default();
        event.resource_version = meta.resource_version.clone().unwrap_or_default();
        event.creation_timestamp = meta
            .creation_timestamp
            .as_ref()
            .map(format_time)
            .unwrap_or_default();
    }

    let is_update = action == Action::Update;
    let mut host = None;

    match object {
        ResourceObject::Pod(pod) => {
            host = pod.spec.as_ref().and_then(|s| s.node_name.clone());
            if is_update {
                event.last_timestamp = last_condition_time(
                    pod.status.as_ref().and_then(|s| s.conditions.as_deref()),
                    |c| c.last_transition_time.as_ref(),
                );
            }
        }
        ResourceObject::Node(node) => {
            host = node.metadata.name.clone();
            if is_update {
                event.last_timestamp = last_condition_time(
                    node.status.as_ref().and_then(|s| s.conditions.as_deref()),
                    |c| {
                        c.last_heartbeat_time
                            .as_ref()
                            .or(c.last_transition_time.as_ref())
                    },
                );
            }
        }
        ResourceObject::Deployment(d) if is_update => {
            event.last_timestamp = last_condition_time(
                d.status.as_ref().and_then(|s| s.conditions.as_deref()),
                |c| c.last_transition_time.as_ref(),
            );
        }
        ResourceObject::ReplicaSet(rs) if is_update => {
            event.last_timestamp = last_condition_time(
                rs.status.as_ref().and_then(|s| s.conditions.as_deref()),
                |c| c.last_transition_time.as_ref(),
            );
        }
        ResourceObject::ReplicationController(rc) if is_update => {
            event.last_timestamp = last_condition_time(
                rc.status.as_ref().and_then(|s| s.conditions.as_deref()),
                |c| c.last_transition_time.as_ref(),
            );
        }
        ResourceObject::Job(job) if is_update => {
            event.last_timestamp = last_condition_time(
                job.status.as_ref().and_then(|s| s.conditions.as_deref()),
                |c| c.last_transition_time.as_ref(),
            );
        }
        ResourceObject::PersistentVolumeClaim(pvc) if is_update => {
            event.last_timestamp = last_condition_time(
                pvc.status.as_ref().and_then(|s| s.conditions.as_deref()),
                |c| c.last_transition_time.as_ref(),
            );
        }
        ResourceObject::Service(svc) => {
            event.component = svc
                .spec
                .as_ref()
                .and_then(|s| s.type_.clone())
                .unwrap_or_default();
        }
        ResourceObject::Event(ev) => {
            host = fill_from_native_event(&mut event, ev);
        }
        ResourceObject::Deleted(deleted) => fill_from_deleted(&mut event, deleted),
        ResourceObject::Unrecognized { kind, .. } => {
            warn!(kind = %kind, name = %event.name, "Unrecognized object shape, emitting partial event");
        }
        _ => {}
    }

    event.host = host
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| EMPTY_HOST.to_string());

    if event.message.is_empty() {
        event.message = event.synthesized_message();
    }

    event
}

/// Copy native event fields; returns the reporting host
fn fill_from_native_event(event: &mut CanonicalEvent, ev: &CoreEvent) -> Option<String> {
    let involved = &ev.involved_object;
    event.involved_kind = involved.kind.clone().unwrap_or_default();
    event.involved_name = involved.name.clone().unwrap_or_default();
    event.involved_namespace = involved.namespace.clone().unwrap_or_default();
    event.involved_resource_version = involved.resource_version.clone().unwrap_or_default();

    event.reason = ev.reason.clone().unwrap_or_default();
    event.type_ = ev.type_.clone().unwrap_or_default();
    event.count = ev.count.unwrap_or_default();
    event.message = ev.message.clone().unwrap_or_default();
    event.first_timestamp = ev.first_timestamp.as_ref().map(format_time).unwrap_or_default();
    event.last_timestamp = match (&ev.last_timestamp, &ev.event_time) {
        (Some(t), _) => format_time(t),
        (None, Some(micro)) => super::format_datetime(&micro.0),
        (None, None) => String::new(),
    };

    let field_path = involved.field_path.as_deref().unwrap_or_default();
    match container_name(field_path) {
        Some(name) => event.service_name = name.to_string(),
        None => debug!(
            field_path = %field_path,
            involved = %event.involved_name,
            "No container name in involved field path"
        ),
    }

    let source = ev.source.as_ref();
    event.component = source
        .and_then(|s| s.component.clone())
        .unwrap_or_default();
    source.and_then(|s| s.host.clone())
}

fn fill_from_deleted(event: &mut CanonicalEvent, deleted: &DeletedObject) {
    let (namespace, name) = split_key(&deleted.key);
    event.namespace = namespace.unwrap_or_default().to_string();
    event.name = name.to_string();
}

/// Extract `<name>` from a field path such as `spec.containers{<name>}`
fn container_name(field_path: &str) -> Option<&str> {
    let (_, rest) = field_path.split_once("spec.containers{")?;
    let (name, _) = rest.split_once('}')?;
    (!name.is_empty()).then_some(name)
}

/// Timestamp of the last condition in `conditions`, formatted, or empty
fn last_condition_time<C>(
    conditions: Option<&[C]>,
    time_of: impl Fn(&C) -> Option<&Time>,
) -> String {
    conditions
        .and_then(|c| c.last())
        .and_then(time_of)
        .map(format_time)
        .unwrap_or_default()
}
