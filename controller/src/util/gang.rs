//! The Gang Manager (spec §4.6): one `PodGroup` per infer group, aligned
//! with the group's current membership plan, cleared entirely when gang
//! scheduling is disabled.
//!
//! New component relative to the teacher (Akri integrates with no gang
//! scheduler) — grounded on the `PodGroup` CRD shape in
//! `shared::api::podgroup` and the same create-idempotent/delete-idempotent
//! idiom `pod_action.rs` uses.

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use log::trace;
use modelserving_shared::api::{GangScheduleSpec, PodGroup, PodGroupSpec, RoleSpec, API_GROUP, API_VERSION};
use modelserving_shared::k8s::{naming, OwnershipInfo};

use super::controller_ctx::ControllerContext;
use super::Result;

const FIELD_MANAGER: &str = "modelserving-controller";
pub const LABEL_NAME: &str = "model-serving/name";
pub const LABEL_GROUP_NAME: &str = "group-name";

/// The role-level `minMember` plan for one group (spec §9's resolved
/// ambiguity: the role-level definition is used uniformly).
pub fn compute_pod_group_spec(roles: &[RoleSpec], gang: &GangScheduleSpec) -> PodGroupSpec {
    let mut min_member = 0i32;
    let mut min_task_member = BTreeMap::new();
    let mut min_resources: BTreeMap<String, Quantity> = BTreeMap::new();

    for role in roles {
        // `minRoleReplicas` is a floor, not a ceiling: it can only raise
        // coverage, never shrink it below the role's own replica count.
        // `max(floor, role.replicas)` capped at `role.replicas` therefore
        // always settles at `role.replicas` — every instance of the role is
        // covered (§4.6, §8; DESIGN.md decision #1).
        let floor = gang.min_role_replicas.get(&role.name).copied().unwrap_or(role.replicas);
        let covered = floor.max(role.replicas).min(role.replicas);

        for i in 0..covered {
            let per_instance = 1 + role.worker_replicas;
            min_member += per_instance;
            min_task_member.insert(naming::role_id(&role.name, i), per_instance);
        }
        if covered > 0 {
            accumulate_resources(&mut min_resources, role, covered);
        }
    }

    PodGroupSpec {
        min_member,
        min_task_member,
        min_resources,
        network_topology: gang.network_topology.clone(),
    }
}

fn accumulate_resources(into: &mut BTreeMap<String, Quantity>, role: &RoleSpec, covered_instances: i32) {
    for _ in 0..covered_instances {
        add_pod_spec_requests(into, &role.entry_template);
        if let Some(worker_template) = &role.worker_template {
            for _ in 0..role.worker_replicas {
                add_pod_spec_requests(into, worker_template);
            }
        }
    }
}

fn add_pod_spec_requests(into: &mut BTreeMap<String, Quantity>, spec: &k8s_openapi::api::core::v1::PodSpec) {
    for container in &spec.containers {
        let Some(resources) = &container.resources else {
            continue;
        };
        let Some(requests) = &resources.requests else {
            continue;
        };
        for (name, quantity) in requests {
            into.entry(name.clone())
                .and_modify(|existing| *existing = add_quantity(existing, quantity))
                .or_insert_with(|| quantity.clone());
        }
    }
}

/// `Quantity` carries its value as an opaque string; summing means parsing
/// both as decimal and re-serializing. Non-numeric/unparsable quantities
/// are left as-is (first writer wins) rather than guessed at.
fn add_quantity(a: &Quantity, b: &Quantity) -> Quantity {
    match (a.0.parse::<f64>(), b.0.parse::<f64>()) {
        (Ok(x), Ok(y)) => Quantity((x + y).to_string()),
        _ => a.clone(),
    }
}

fn pod_group_name(group_name: &str) -> String {
    group_name.to_string()
}

/// Creates or updates the pod group for one infer group, patching only
/// when `minMember`/`minTaskMember`/`minResources` actually changed.
pub async fn reconcile_pod_group(
    ctx: Arc<ControllerContext>,
    ms_name: &str,
    namespace: &str,
    group_name: &str,
    roles: &[RoleSpec],
    gang: &GangScheduleSpec,
    ownership: OwnershipInfo,
) -> Result<()> {
    let desired_spec = compute_pod_group_spec(roles, gang);
    let api = ctx.pod_groups(namespace);
    let name = pod_group_name(group_name);

    if let Some(existing) = api.get(&name).await? {
        if existing.spec.min_member == desired_spec.min_member
            && existing.spec.min_task_member == desired_spec.min_task_member
            && existing.spec.min_resources == desired_spec.min_resources
        {
            trace!("pod group {name} unchanged, skipping patch");
            return Ok(());
        }
    }

    let mut labels = BTreeMap::new();
    labels.insert(LABEL_NAME.to_string(), ms_name.to_string());
    labels.insert(LABEL_GROUP_NAME.to_string(), group_name.to_string());

    let pod_group = PodGroup {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            owner_references: Some(vec![ownership.as_owner_reference()]),
            ..Default::default()
        },
        spec: desired_spec,
        status: None,
    };

    match api.apply(pod_group, FIELD_MANAGER).await {
        Ok(applied) => {
            trace!("pod group {} applied at resourceVersion {:?}", applied.name_any(), applied.resource_version());
            Ok(())
        }
        Err(e) if modelserving_shared::k8s::is_conflict(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Deletes the pod group for one infer group; used both for scale-down and
/// for clearing gang state when `gangSchedule` is unset (§4.6).
pub async fn delete_pod_group(ctx: Arc<ControllerContext>, namespace: &str, group_name: &str) -> Result<()> {
    let api = ctx.pod_groups(namespace);
    match api.delete(&pod_group_name(group_name)).await {
        Ok(_) => Ok(()),
        Err(e) if modelserving_shared::k8s::is_not_found(&e) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub const POD_GROUP_API_GROUP_VERSION: &str = "scheduling.x-k8s.io/v1alpha1";
/// Referenced so this module documents the CRD it expects to exist
/// alongside the modelserving CRD group, for operators reading this file.
pub const _MODELSERVING_API_GROUP_VERSION: (&str, &str) = (API_GROUP, API_VERSION);

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use std::collections::HashMap;

    fn role_with_requests(name: &str, replicas: i32, worker_replicas: i32, cpu: &str) -> RoleSpec {
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity(cpu.to_string()));
        let template = PodSpec {
            containers: vec![Container {
                name: "main".to_string(),
                resources: Some(ResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };
        RoleSpec {
            name: name.to_string(),
            replicas,
            entry_template: template.clone(),
            worker_replicas,
            worker_template: if worker_replicas > 0 { Some(template) } else { None },
        }
    }

    #[test]
    fn min_member_covers_full_replicas_when_floor_unset() {
        let roles = vec![role_with_requests("prefill", 3, 0, "1")];
        let gang = GangScheduleSpec {
            min_role_replicas: HashMap::new(),
            network_topology: None,
        };
        let spec = compute_pod_group_spec(&roles, &gang);
        assert_eq!(spec.min_member, 3);
        assert_eq!(spec.min_task_member.len(), 3);
    }

    #[test]
    fn min_member_floor_below_replicas_cannot_shrink_coverage() {
        let roles = vec![role_with_requests("decode", 4, 1, "1")];
        let mut floors = HashMap::new();
        floors.insert("decode".to_string(), 2);
        let gang = GangScheduleSpec {
            min_role_replicas: floors,
            network_topology: None,
        };
        let spec = compute_pod_group_spec(&roles, &gang);
        // floor=2 is below replicas=4, so all 4 instances are still covered:
        // 4 covered instances * (1 entry + 1 worker) = 8
        assert_eq!(spec.min_member, 8);
        assert_eq!(spec.min_task_member.len(), 4);
    }

    #[test]
    fn sums_cpu_requests_across_covered_instances() {
        let roles = vec![role_with_requests("prefill", 2, 0, "1")];
        let gang = GangScheduleSpec {
            min_role_replicas: HashMap::new(),
            network_topology: None,
        };
        let spec = compute_pod_group_spec(&roles, &gang);
        assert_eq!(spec.min_resources.get("cpu").unwrap().0, "2");
    }
}
