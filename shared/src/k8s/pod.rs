//! Builds the entry and worker pods of a role instance, per the naming,
//! labeling and env-injection contract.

use super::naming;
use super::OwnershipInfo;
use crate::api::{
    ENV_ENTRY_ADDRESS, ENV_GROUP_SIZE, ENV_WORKER_INDEX, LABEL_ENTRY, LABEL_GROUP_NAME, LABEL_NAME,
    LABEL_REVISION, LABEL_ROLE, LABEL_ROLE_ID, LABEL_WORKER_INDEX,
};
use crate::api::podgroup::{POD_GROUP_NAME_ANNOTATION, POD_GROUP_TASK_ANNOTATION};
use k8s_openapi::api::core::v1::{EnvVar, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

/// Labels applied to every pod derived from a `(group, role, roleIndex)`.
#[derive(Clone, Debug)]
pub struct RoleInstanceIdentity {
    pub ms_name: String,
    pub namespace: String,
    pub group_name: String,
    pub role_name: String,
    pub role_id: String,
    pub revision: String,
}

fn base_labels(identity: &RoleInstanceIdentity) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), identity.ms_name.clone());
    labels.insert(LABEL_GROUP_NAME.to_string(), identity.group_name.clone());
    labels.insert(LABEL_ROLE.to_string(), identity.role_name.clone());
    labels.insert(LABEL_ROLE_ID.to_string(), identity.role_id.clone());
    labels.insert(LABEL_REVISION.to_string(), identity.revision.clone());
    labels
}

fn gang_annotations(
    gang_enabled: bool,
    group_name: &str,
    role_id: &str,
) -> Option<BTreeMap<String, String>> {
    if !gang_enabled {
        return None;
    }
    let mut annotations = BTreeMap::new();
    annotations.insert(POD_GROUP_NAME_ANNOTATION.to_string(), group_name.to_string());
    annotations.insert(POD_GROUP_TASK_ANNOTATION.to_string(), role_id.to_string());
    Some(annotations)
}

fn inject_env(pod_spec: &mut PodSpec, group_size: i32, entry_address: &str, worker_index: i32) {
    let vars = [
        EnvVar {
            name: ENV_GROUP_SIZE.to_string(),
            value: Some(group_size.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: ENV_ENTRY_ADDRESS.to_string(),
            value: Some(entry_address.to_string()),
            ..Default::default()
        },
        EnvVar {
            name: ENV_WORKER_INDEX.to_string(),
            value: Some(worker_index.to_string()),
            ..Default::default()
        },
    ];
    for container in pod_spec
        .containers
        .iter_mut()
        .chain(pod_spec.init_containers.iter_mut().flatten())
    {
        let env = container.env.get_or_insert_with(Vec::new);
        for var in &vars {
            env.retain(|e| e.name != var.name);
            env.push(var.clone());
        }
    }
}

/// Builds the single entry pod of a role instance. `worker_replicas` is the
/// role's `workerReplicas`, used to compute `GROUP_SIZE`.
#[allow(clippy::too_many_arguments)]
pub fn build_entry_pod(
    identity: &RoleInstanceIdentity,
    ownership: OwnershipInfo,
    worker_replicas: i32,
    gang_enabled: bool,
    template: &PodSpec,
) -> Pod {
    let group_name = identity.group_name.clone();
    let role_id = identity.role_id.clone();
    let entry_pod_name = naming::entry_pod_name(&group_name, &role_id);

    let mut labels = base_labels(identity);
    labels.insert(LABEL_ENTRY.to_string(), "true".to_string());
    labels.insert(LABEL_WORKER_INDEX.to_string(), "0".to_string());

    let mut spec = template.clone();
    let entry_address = format!("{entry_pod_name}.{}", identity.namespace);
    inject_env(&mut spec, worker_replicas + 1, &entry_address, 0);
    spec.hostname = Some(entry_pod_name.clone());
    spec.subdomain = Some(entry_pod_name.clone());

    Pod {
        metadata: ObjectMeta {
            name: Some(entry_pod_name),
            namespace: Some(identity.namespace.clone()),
            labels: Some(labels),
            annotations: gang_annotations(gang_enabled, &group_name, &role_id),
            owner_references: Some(vec![ownership.as_owner_reference()]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

/// Builds worker pod `worker_index` (`1..=worker_replicas`) of a role instance.
pub fn build_worker_pod(
    identity: &RoleInstanceIdentity,
    ownership: OwnershipInfo,
    worker_replicas: i32,
    worker_index: i32,
    gang_enabled: bool,
    template: &PodSpec,
) -> Pod {
    let group_name = identity.group_name.clone();
    let role_id = identity.role_id.clone();
    let entry_pod_name = naming::entry_pod_name(&group_name, &role_id);
    let worker_pod_name = naming::worker_pod_name(&group_name, &role_id, worker_index);

    let mut labels = base_labels(identity);
    labels.insert(LABEL_WORKER_INDEX.to_string(), worker_index.to_string());

    let mut spec = template.clone();
    let entry_address = format!("{entry_pod_name}.{}", identity.namespace);
    inject_env(&mut spec, worker_replicas + 1, &entry_address, worker_index);

    Pod {
        metadata: ObjectMeta {
            name: Some(worker_pod_name),
            namespace: Some(identity.namespace.clone()),
            labels: Some(labels),
            annotations: gang_annotations(gang_enabled, &group_name, &role_id),
            owner_references: Some(vec![ownership.as_owner_reference()]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::OwnershipType;
    use k8s_openapi::api::core::v1::Container;

    fn identity() -> RoleInstanceIdentity {
        RoleInstanceIdentity {
            ms_name: "test-mi".to_string(),
            namespace: "default".to_string(),
            group_name: "test-mi-0".to_string(),
            role_name: "prefill".to_string(),
            role_id: "prefill-0".to_string(),
            revision: "abc123".to_string(),
        }
    }

    fn ownership() -> OwnershipInfo {
        OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".to_string(), "uid-1".to_string())
    }

    fn template() -> PodSpec {
        PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn entry_pod_has_entry_label_and_env() {
        let pod = build_entry_pod(&identity(), ownership(), 2, false, &template());
        assert_eq!(pod.metadata.name.as_deref(), Some("test-mi-0-prefill-0-0"));
        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_ENTRY), Some(&"true".to_string()));
        assert_eq!(labels.get(LABEL_WORKER_INDEX), Some(&"0".to_string()));
        let spec = pod.spec.unwrap();
        assert_eq!(spec.hostname.as_deref(), Some("test-mi-0-prefill-0-0"));
        let env = spec.containers[0].env.as_ref().unwrap();
        assert!(env.iter().any(|e| e.name == ENV_GROUP_SIZE && e.value.as_deref() == Some("3")));
        assert!(env.iter().any(|e| e.name == ENV_WORKER_INDEX && e.value.as_deref() == Some("0")));
    }

    #[test]
    fn worker_pod_carries_entry_address() {
        let pod = build_worker_pod(&identity(), ownership(), 2, 1, false, &template());
        assert_eq!(pod.metadata.name.as_deref(), Some("test-mi-0-prefill-0-1"));
        let spec = pod.spec.unwrap();
        let env = spec.containers[0].env.as_ref().unwrap();
        assert!(env
            .iter()
            .any(|e| e.name == ENV_ENTRY_ADDRESS && e.value.as_deref() == Some("test-mi-0-prefill-0-0.default")));
    }

    #[test]
    fn gang_annotations_present_only_when_enabled() {
        let pod = build_entry_pod(&identity(), ownership(), 0, true, &template());
        let annotations = pod.metadata.annotations.unwrap();
        assert_eq!(
            annotations.get(POD_GROUP_NAME_ANNOTATION),
            Some(&"test-mi-0".to_string())
        );
        let pod = build_entry_pod(&identity(), ownership(), 0, false, &template());
        assert!(pod.metadata.annotations.is_none());
    }
}
