//! Role-instance creation and deletion (spec §4.5 "Role Creation").
//!
//! Every create path here accepts "already exists" as success and every
//! delete path accepts "not found" as success (§4.3 "Idempotence", §7).
//! Grounded on the teacher's `pod_action.rs`/`instance_action.rs` idiom of
//! building the desired object, then applying it via server-side apply
//! (the teacher's `KubeInterface::create_pod`/`create_service` calls are
//! themselves backed by `apply` further down its stack).

use std::sync::Arc;

use log::{trace, warn};
use modelserving_shared::api::RoleSpec;
use modelserving_shared::k8s::{self, naming, pod as pod_builder, revision, service as service_builder, OwnershipInfo};
use modelserving_shared::k8s::pod::RoleInstanceIdentity;

use super::controller_ctx::ControllerContext;
use super::{ControllerError, Result};

const FIELD_MANAGER: &str = "modelserving-controller";

/// Everything `create_role_instance`/`delete_role_instance` need to know
/// about the group+role instance they are acting on.
pub struct RoleInstanceTarget<'a> {
    pub ms_name: &'a str,
    pub namespace: &'a str,
    pub group_name: &'a str,
    pub role: &'a RoleSpec,
    pub role_index: i32,
    pub gang_enabled: bool,
    pub ownership: OwnershipInfo,
}

impl<'a> RoleInstanceTarget<'a> {
    pub fn role_id(&self) -> String {
        naming::role_id(&self.role.name, self.role_index)
    }

    pub fn entry_pod_name(&self) -> String {
        naming::entry_pod_name(self.group_name, &self.role_id())
    }

    pub fn worker_pod_names(&self) -> Vec<String> {
        (1..=self.role.worker_replicas)
            .map(|k| naming::worker_pod_name(self.group_name, &self.role_id(), k))
            .collect()
    }

    pub fn headless_service_name(&self) -> String {
        naming::headless_service_name(&self.entry_pod_name())
    }
}

/// Validates the projected names for a role instance (§4.5 step 2) before
/// anything is created.
pub fn validate_names(target: &RoleInstanceTarget) -> Result<()> {
    naming::validate_projected_names(
        &target.entry_pod_name(),
        &target.headless_service_name(),
        &target.worker_pod_names(),
    )
    .map_err(ControllerError::SpecRejected)
}

/// Creates the entry pod, the headless service (if a worker template is
/// present), and every worker pod of one role instance (§4.5 steps 3-6).
pub async fn create_role_instance(ctx: Arc<ControllerContext>, target: &RoleInstanceTarget<'_>) -> Result<()> {
    validate_names(target)?;

    let role_revision = revision::role_revision(target.role);
    let identity = RoleInstanceIdentity {
        ms_name: target.ms_name.to_string(),
        namespace: target.namespace.to_string(),
        group_name: target.group_name.to_string(),
        role_name: target.role.name.clone(),
        role_id: target.role_id(),
        revision: role_revision,
    };

    let pods_api = ctx.pods(target.namespace);
    let entry_pod = pod_builder::build_entry_pod(
        &identity,
        target.ownership.clone(),
        target.role.worker_replicas,
        target.gang_enabled,
        &target.role.entry_template,
    );
    apply_or_ok(pods_api.apply(entry_pod, FIELD_MANAGER).await).await?;

    if let Some(worker_template) = &target.role.worker_template {
        let services_api = ctx.services(target.namespace);
        let headless_service = service_builder::build_headless_service(
            target.ms_name,
            target.namespace,
            &target.entry_pod_name(),
            target.group_name,
            &target.role.name,
            &target.role_id(),
            target.ownership.clone(),
        );
        apply_or_ok(services_api.apply(headless_service, FIELD_MANAGER).await).await?;

        for k in 1..=target.role.worker_replicas {
            let worker_pod = pod_builder::build_worker_pod(
                &identity,
                target.ownership.clone(),
                target.role.worker_replicas,
                k,
                target.gang_enabled,
                worker_template,
            );
            apply_or_ok(pods_api.apply(worker_pod, FIELD_MANAGER).await).await?;
        }
    }

    Ok(())
}

/// Deletes every pod and the headless service of one role instance. Accepts
/// "not found" as success on every call (§4.3 Idempotence).
pub async fn delete_role_instance(ctx: Arc<ControllerContext>, target: &RoleInstanceTarget<'_>) -> Result<()> {
    let pods_api = ctx.pods(target.namespace);
    let services_api = ctx.services(target.namespace);

    delete_or_ok(pods_api.delete(&target.entry_pod_name()).await).await?;
    for worker_name in target.worker_pod_names() {
        delete_or_ok(pods_api.delete(&worker_name).await).await?;
    }
    delete_or_ok(services_api.delete(&target.headless_service_name()).await).await?;
    Ok(())
}

/// Deletes a role instance purely from its projected names, without needing
/// its `RoleSpec`. Used where the caller only has the store's record of a
/// role instance and not the owning `ModelServing`'s current template — the
/// role was dropped from the template entirely (§4.3 step 6), or the pod
/// lifecycle handler is rebuilding a role after `handleError`/`onDelete`
/// without re-reading the spec (§4.4).
pub async fn delete_role_instance_by_name(
    ctx: Arc<ControllerContext>,
    namespace: &str,
    group_name: &str,
    role_name: &str,
    role_index: i32,
    worker_replicas: i32,
) -> Result<()> {
    let role_id = naming::role_id(role_name, role_index);
    let entry_pod_name = naming::entry_pod_name(group_name, &role_id);
    let pods_api = ctx.pods(namespace);
    let services_api = ctx.services(namespace);

    delete_or_ok(pods_api.delete(&entry_pod_name).await).await?;
    for k in 1..=worker_replicas {
        let worker_pod_name = naming::worker_pod_name(group_name, &role_id, k);
        delete_or_ok(pods_api.delete(&worker_pod_name).await).await?;
    }
    delete_or_ok(services_api.delete(&naming::headless_service_name(&entry_pod_name)).await).await?;
    Ok(())
}

async fn apply_or_ok<T>(result: std::result::Result<T, kube::Error>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if k8s::is_conflict(&e) => {
            trace!("create raced with an existing object, treating as success: {e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn delete_or_ok<T>(result: std::result::Result<either::Either<T, kube::core::Status>, kube::Error>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if k8s::is_not_found(&e) => {
            trace!("delete target already gone, treating as success: {e}");
            Ok(())
        }
        Err(e) => {
            warn!("delete failed: {e}");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use modelserving_shared::k8s::OwnershipType;

    fn role(worker_replicas: i32) -> RoleSpec {
        RoleSpec {
            name: "prefill".to_string(),
            replicas: 2,
            entry_template: PodSpec {
                containers: vec![Container {
                    name: "main".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            },
            worker_replicas,
            worker_template: if worker_replicas > 0 {
                Some(PodSpec {
                    containers: vec![Container {
                        name: "main".to_string(),
                        ..Default::default()
                    }],
                    ..Default::default()
                })
            } else {
                None
            },
        }
    }

    #[test]
    fn derives_bit_exact_names() {
        let r = role(2);
        let target = RoleInstanceTarget {
            ms_name: "test-mi",
            namespace: "default",
            group_name: "test-mi-0",
            role: &r,
            role_index: 0,
            gang_enabled: false,
            ownership: OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".into(), "uid-1".into()),
        };
        assert_eq!(target.role_id(), "prefill-0");
        assert_eq!(target.entry_pod_name(), "test-mi-0-prefill-0-0");
        assert_eq!(
            target.worker_pod_names(),
            vec!["test-mi-0-prefill-0-1", "test-mi-0-prefill-0-2"]
        );
        assert_eq!(target.headless_service_name(), "test-mi-0-prefill-0-0");
    }

    #[test]
    fn validate_names_accepts_well_formed_names() {
        let r = role(0);
        let target = RoleInstanceTarget {
            ms_name: "test-mi",
            namespace: "default",
            group_name: "test-mi-0",
            role: &r,
            role_index: 0,
            gang_enabled: false,
            ownership: OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".into(), "uid-1".into()),
        };
        assert!(validate_names(&target).is_ok());
    }
}
