//! The Reconciler (spec §4.3): per-key handler that compares the desired
//! `ModelServing` spec against the authoritative store, then executes the
//! scale/rollout/repair plan by creating/deleting pods, services, and pod
//! groups, before invoking the Gang Manager and Status Writer.
//!
//! Grounded on the teacher's `discovery_configuration_controller.rs` for the
//! `Controller::new(...).reconcile_on(...).run(...)` wiring (this crate's
//! analogue of the teacher's `start_controller`/`error_policy` pair), and on
//! `instance_action.rs`'s "compute desired vs. observed, diff, act" shape for
//! the body of `reconcile`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::ListParams;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::finalizer::{finalizer, Event};
use kube::runtime::reflector::ObjectRef;
use kube::runtime::{watcher, Config};
use kube::ResourceExt;
use log::{info, trace, warn};
use tokio::sync::mpsc;

use modelserving_shared::api::ModelServing;
use modelserving_shared::k8s::api::Api;
use modelserving_shared::k8s::{naming, revision, rollout, OwnershipInfo, OwnershipType};

use super::controller_ctx::ControllerContext;
use super::pod_action::{self, RoleInstanceTarget};
use super::status;
use super::store::{self, GroupRecord, GroupStatus, MsKey};
use super::{gang, ControllerError, Result};

/// Periodic full resync interval once a key has converged, so drift that
/// produces no watch event (e.g. a manually deleted pod group) still heals.
const SUCCESS_REQUEUE: Duration = Duration::from_secs(5 * 60);
const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Finalizer guaranteeing `Event::Cleanup` fires once before a `ModelServing`
/// is actually removed, mirroring the teacher's `NODE_FINALIZER` usage in
/// `node_watcher.rs`. The cleanup itself only drops our own store/decision
/// state — the cluster objects are reclaimed by owner-reference GC (§9).
pub static MODEL_SERVING_FINALIZER: &str = "modelservings.modelserving.sh";

/// Starts the `ModelServing` controller loop. `pod_triggers` is fed by the
/// pod watcher (§4.1, §4.4) whenever a pod event implies one of our keys
/// needs a fresh sync; this is the reconciler's only other event source
/// besides the built-in watch of `ModelServing` itself. `workers` is the N
/// parallel reconcile fibers spec.md §2/§5 describe ("N parallel cooperative
/// workers... the work queue guarantees at most one concurrent reconcile per
/// key"), which `kube::runtime::Controller` implements via its applier's
/// concurrency limit — cross-key parallelism up to `workers`, serialized
/// per-key by construction of the underlying scheduler.
pub async fn start_controller(
    ctx: Arc<ControllerContext>,
    pod_triggers: mpsc::Receiver<ObjectRef<ModelServing>>,
    workers: usize,
) {
    let api = ctx.model_servings_all().as_inner();
    if let Err(e) = api.list(&ListParams::default().limit(1)).await {
        log::error!("ModelServing is not queryable; {e:?}");
        std::process::exit(1);
    }
    Controller::new(api, watcher::Config::default())
        .with_config(Config::default().concurrency(workers.max(1) as u16))
        .reconcile_on(tokio_stream::wrappers::ReceiverStream::new(pod_triggers))
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            if let Err(e) = result {
                warn!("reconcile failed: {e:?}");
            }
        })
        .await;
}

fn error_policy(ms: Arc<ModelServing>, error: &ControllerError, ctx: Arc<ControllerContext>) -> Action {
    let key = store::ms_key(ms.namespace().as_deref().unwrap_or_default(), &ms.name_any());
    let mut backoffs = ctx.error_backoffs.lock().unwrap();
    let previous = backoffs.get(&key).copied().unwrap_or(Duration::from_millis(500));
    let next = (previous * 2).min(MAX_BACKOFF);
    warn!(
        "reconcile failed for {key}, retrying in {:.1}s: {error}",
        next.as_secs_f32()
    );
    backoffs.insert(key, next);
    Action::requeue(next)
}

/// The per-key handler (§4.3 steps 1-9), entered through a finalizer so a
/// deletion always gets exactly one `Event::Cleanup` before the API server
/// actually removes the object.
pub async fn reconcile(ms: Arc<ModelServing>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = ms
        .namespace()
        .ok_or_else(|| ControllerError::Other(anyhow::anyhow!("ModelServing has no namespace")))?;
    trace!("reconciling {}", store::ms_key(&namespace, &ms.name_any()));
    let api = ctx.model_servings(&namespace).as_inner();
    finalizer(&api, MODEL_SERVING_FINALIZER, ms, |event| {
        reconcile_inner(event, namespace.clone(), ctx.clone())
    })
    .await
    .map_err(|e| ControllerError::FinalizerError(Box::new(e)))
}

async fn reconcile_inner(event: Event<ModelServing>, namespace: String, ctx: Arc<ControllerContext>) -> Result<Action> {
    let ms = match event {
        Event::Cleanup(ms) => {
            // Owner-reference GC reclaims every pod/service/pod group we
            // created; the store just stops tracking decision state (§9
            // "Owner references and cascading delete").
            let key = store::ms_key(&namespace, &ms.name_any());
            info!("ModelServing {key} deleted, dropping store state");
            ctx.store.remove_ms(&key).await;
            return Ok(Action::await_change());
        }
        Event::Apply(ms) => ms,
    };

    let ms_name = ms.name_any();
    let key = store::ms_key(&namespace, &ms_name);

    // §3/§7: this core integrates with exactly one gang scheduler; a
    // `ModelServing` naming any other `schedulerName` is a spec rejection,
    // mirroring the DNS-1035 name check in `pod_action::validate_names` —
    // condemn the whole key and wait for the spec to change rather than
    // busy-retrying an object that will never become reconcilable as-is.
    if ms.spec.scheduler_name != ctx.scheduler_name {
        warn!(
            "ModelServing {key} rejected: schedulerName {:?} does not match the controller's configured {:?}",
            ms.spec.scheduler_name, ctx.scheduler_name
        );
        return Ok(Action::await_change());
    }

    let target_revision = revision::group_revision(&ms.spec.template);
    let desired_replicas = ms.spec.replicas.max(0);
    let partition = ms.spec.rollout_strategy.partition.max(0);
    let max_unavailable = rollout::max_unavailable(desired_replicas, &ms.spec.rollout_strategy.max_unavailable);
    let max_surge = rollout::max_surge(desired_replicas, &ms.spec.rollout_strategy.max_surge);
    let surge_ceiling = desired_replicas + max_surge;
    let gang_enabled = ms.spec.template.gang_schedule.is_some();
    let ownership = OwnershipInfo::new(OwnershipType::ModelServing, ms_name.clone(), ms.uid().unwrap_or_default());

    let observed = ctx.store.groups(&key).await;

    // §4.3 step 4: partition observed groups by ordinal. Every group name we
    // ever write is produced by `naming::group_name`, so an "unparsable
    // ordinal" can only arise from a store entry another process corrupted;
    // treat it the same as out-of-range (condemned). Groups in the surge tail
    // (`desiredReplicas .. desiredReplicas + maxSurgeEffective`) are kept,
    // not condemned, as long as they already carry the target revision —
    // they are the surge capacity §4.3/§9 allocate at the tail while an
    // older in-range equivalent is still terminating.
    let mut valid_ordinals: HashSet<u32> = HashSet::new();
    let mut condemned_names: Vec<String> = Vec::new();
    for (name, record) in &observed {
        let ordinal = record.ordinal as i32;
        if ordinal < desired_replicas {
            valid_ordinals.insert(record.ordinal);
        } else if ordinal < surge_ceiling && record.matches_revision(&target_revision) {
            // surge group, left alone here; reaped below once no longer needed
        } else {
            condemned_names.push(name.clone());
        }
    }

    // §4.3 step 7: delete condemned groups unconditionally.
    for group_name in &condemned_names {
        delete_group(ctx.clone(), &namespace, &ms, &ownership, &key, group_name, gang_enabled).await?;
    }

    // §4.3 step 5: scale up every missing ordinal in [0, desiredReplicas).
    for ordinal in 0..desired_replicas as u32 {
        if valid_ordinals.contains(&ordinal) {
            continue;
        }
        create_group(ctx.clone(), &namespace, &ms, &ownership, &key, ordinal, &target_revision, gang_enabled).await?;
    }

    // §4.3 step 6: scale down / rollout of the remaining valid groups,
    // gated by the rollout budget computed from the store's current view
    // (freshly created groups above count as unavailable until observed
    // Ready, which is exactly the budget §8 "Rollout budget" wants).
    let observed = ctx.store.groups(&key).await;
    let status_now = status::compute_status(&observed, &target_revision, partition);
    let unavailable = desired_replicas - status_now.available_replicas;
    let mut valid_ordinals: Vec<(String, u32)> = observed
        .iter()
        .filter(|(_, g)| (g.ordinal as i32) < desired_replicas)
        .map(|(name, g)| (name.clone(), g.ordinal))
        .collect();
    valid_ordinals.sort_by_key(|(_, ordinal)| *ordinal);

    for (group_name, ordinal) in valid_ordinals {
        let Some(group) = observed.get(&group_name) else { continue };
        if group.matches_revision(&target_revision) {
            // Already at the target revision: heal any role-level gap
            // (missing instance from a rebuild, excess instance from a
            // role scale-down) without touching the group as a whole.
            reconcile_group_roles(ctx.clone(), &namespace, &ms, &ownership, &key, &group_name, gang_enabled).await?;
            continue;
        }
        let eligible = unavailable < max_unavailable && (ordinal as i32) >= partition;
        if !eligible {
            trace!("group {group_name} at old revision but gated by rollout budget, deferring");
            continue;
        }
        delete_group(ctx.clone(), &namespace, &ms, &ownership, &key, &group_name, gang_enabled).await?;
    }

    // §4.3/§9 "maxSurge": while any in-range group still lags the target
    // revision, create replacement groups in the tail
    // `[desiredReplicas, desiredReplicas + maxSurgeEffective)` so the
    // rollout can proceed without first dropping capacity. Once every
    // in-range group has caught up, the surge groups are no longer needed
    // and are retired.
    if max_surge > 0 {
        let observed = ctx.store.groups(&key).await;
        let outdated_in_range = observed
            .values()
            .filter(|g| (g.ordinal as i32) < desired_replicas && !g.matches_revision(&target_revision))
            .count() as i32;
        let surge_ordinals_in_use: HashSet<u32> = observed
            .values()
            .filter(|g| (g.ordinal as i32) >= desired_replicas)
            .map(|g| g.ordinal)
            .collect();

        if outdated_in_range == 0 {
            for (name, _) in observed.iter().filter(|(_, g)| (g.ordinal as i32) >= desired_replicas) {
                delete_group(ctx.clone(), &namespace, &ms, &ownership, &key, name, gang_enabled).await?;
            }
        } else {
            let to_create = (outdated_in_range - surge_ordinals_in_use.len() as i32).clamp(0, max_surge - surge_ordinals_in_use.len() as i32);
            let mut created = 0;
            let mut candidate = desired_replicas as u32;
            while created < to_create && candidate < surge_ceiling as u32 {
                if !surge_ordinals_in_use.contains(&candidate) {
                    create_group(ctx.clone(), &namespace, &ms, &ownership, &key, candidate, &target_revision, gang_enabled).await?;
                    created += 1;
                }
                candidate += 1;
            }
        }
    }

    // §4.3 step 8: Gang Manager, re-aligned against the now-settled group set.
    let observed = ctx.store.groups(&key).await;
    for group_name in observed.keys() {
        match &ms.spec.template.gang_schedule {
            Some(gang_spec) => {
                gang::reconcile_pod_group(
                    ctx.clone(),
                    &ms_name,
                    &namespace,
                    group_name,
                    &ms.spec.template.roles,
                    gang_spec,
                    ownership.clone(),
                )
                .await?;
            }
            None => {
                gang::delete_pod_group(ctx.clone(), &namespace, group_name).await?;
            }
        }
    }

    // §4.3 step 9: Status Writer.
    status::reconcile_status(
        ctx.clone(),
        &namespace,
        &ms_name,
        &ms.status.clone().unwrap_or_default(),
        &observed,
        &target_revision,
        partition,
    )
    .await?;

    crate::metrics::refresh_group_count(&ctx, &ms_name, &key).await;

    ctx.error_backoffs.lock().unwrap().remove(&key);
    Ok(Action::requeue(SUCCESS_REQUEUE))
}

/// Validates every projected name, then creates every role instance of a
/// brand-new group (§4.5). A naming-validation failure condemns the group
/// instead of aborting the whole sync (§7 "Spec rejection").
async fn create_group(
    ctx: Arc<ControllerContext>,
    namespace: &str,
    ms: &ModelServing,
    ownership: &OwnershipInfo,
    key: &MsKey,
    ordinal: u32,
    target_revision: &str,
    gang_enabled: bool,
) -> Result<()> {
    let ms_name = ms.name_any();
    let group_name = naming::group_name(&ms_name, ordinal);

    for role in &ms.spec.template.roles {
        for role_index in 0..role.replicas {
            let target = RoleInstanceTarget {
                ms_name: &ms_name,
                namespace,
                group_name: &group_name,
                role,
                role_index,
                gang_enabled,
                ownership: ownership.clone(),
            };
            if let Err(e) = pod_action::validate_names(&target) {
                warn!("group {group_name} condemned: {e}");
                ctx.store.ensure_group(key, &group_name, ordinal, target_revision).await;
                ctx.store.condemn_group(key, &group_name, &e.to_string()).await;
                return Ok(());
            }
        }
    }

    ctx.store.ensure_group(key, &group_name, ordinal, target_revision).await;

    for role in &ms.spec.template.roles {
        let role_revision = revision::role_revision(role);
        for role_index in 0..role.replicas {
            ctx.store
                .ensure_role_instance(
                    key,
                    &group_name,
                    &role.name,
                    role_index,
                    &role_revision,
                    role.worker_replicas,
                )
                .await;
            let target = RoleInstanceTarget {
                ms_name: &ms_name,
                namespace,
                group_name: &group_name,
                role,
                role_index,
                gang_enabled,
                ownership: ownership.clone(),
            };
            pod_action::create_role_instance(ctx.clone(), &target).await?;
        }
    }
    Ok(())
}

/// Tears down every role instance of a group, its pod group, and its store
/// record (§4.3 step 6/7, §4.6 "delete any stragglers"). Used for both
/// out-of-range (condemned) groups and in-range groups rolling to a new
/// revision — in both cases the next sync's scale-up pass (step 5) recreates
/// the ordinal fresh if it is still within `desiredReplicas`.
async fn delete_group(
    ctx: Arc<ControllerContext>,
    namespace: &str,
    ms: &ModelServing,
    ownership: &OwnershipInfo,
    key: &MsKey,
    group_name: &str,
    gang_enabled: bool,
) -> Result<()> {
    let ms_name = ms.name_any();
    ctx.store.set_group_status(key, group_name, GroupStatus::Deleting).await;

    if let Some(group) = ctx.store.group(key, group_name).await {
        delete_group_roles(ctx.clone(), namespace, &ms_name, &ms.spec.template.roles, ownership, group_name, &group, gang_enabled)
            .await?;
    }
    gang::delete_pod_group(ctx.clone(), namespace, group_name).await?;
    ctx.store.remove_group(key, group_name).await;
    Ok(())
}

async fn delete_group_roles(
    ctx: Arc<ControllerContext>,
    namespace: &str,
    ms_name: &str,
    role_specs: &[modelserving_shared::api::RoleSpec],
    ownership: &OwnershipInfo,
    group_name: &str,
    group: &GroupRecord,
    gang_enabled: bool,
) -> Result<()> {
    for (role_name, role_record) in &group.roles {
        let role_spec = role_specs.iter().find(|r| &r.name == role_name);
        for (role_index, instance) in &role_record.instances {
            match role_spec {
                Some(role) => {
                    let target = RoleInstanceTarget {
                        ms_name,
                        namespace,
                        group_name,
                        role,
                        role_index: *role_index,
                        gang_enabled,
                        ownership: ownership.clone(),
                    };
                    pod_action::delete_role_instance(ctx.clone(), &target).await?;
                }
                // The role was dropped from the template entirely (not just
                // resized) between the instance's creation and now. Rebuild
                // enough of a role instance target from the store's own
                // record of `worker_replicas` to still delete every pod.
                None => {
                    pod_action::delete_role_instance_by_name(
                        ctx.clone(),
                        namespace,
                        group_name,
                        role_name,
                        *role_index,
                        instance.worker_replicas,
                    )
                    .await?;
                }
            }
        }
    }
    Ok(())
}

/// Heals a group already at the target revision: creates any role instance
/// missing from the store (a fresh group's initial build, or a role a pod
/// lifecycle handler tore down for a rebuild per §4.4 `onDelete`), and
/// deletes any instance beyond the role's current `replicas` (role
/// scale-down, §8 scenario 4). Does not touch roles whose whole group is
/// still rolling to a new revision — that path is handled by the group-level
/// delete/recreate above, since a role shape change also changes the group's
/// revision.
async fn reconcile_group_roles(
    ctx: Arc<ControllerContext>,
    namespace: &str,
    ms: &ModelServing,
    ownership: &OwnershipInfo,
    key: &MsKey,
    group_name: &str,
    gang_enabled: bool,
) -> Result<()> {
    let ms_name = ms.name_any();
    let Some(group) = ctx.store.group(key, group_name).await else {
        return Ok(());
    };

    for role in &ms.spec.template.roles {
        let role_revision = revision::role_revision(role);
        let existing: HashSet<i32> = group
            .roles
            .get(&role.name)
            .map(|r| r.instances.keys().copied().collect())
            .unwrap_or_default();

        for role_index in 0..role.replicas {
            if existing.contains(&role_index) {
                continue;
            }
            ctx.store
                .ensure_role_instance(key, group_name, &role.name, role_index, &role_revision, role.worker_replicas)
                .await;
            let target = RoleInstanceTarget {
                ms_name: &ms_name,
                namespace,
                group_name,
                role,
                role_index,
                gang_enabled,
                ownership: ownership.clone(),
            };
            pod_action::create_role_instance(ctx.clone(), &target).await?;
        }

        for role_index in existing.into_iter().filter(|i| *i >= role.replicas) {
            pod_action::delete_role_instance_by_name(ctx.clone(), namespace, group_name, &role.name, role_index, role.worker_replicas)
                .await?;
            ctx.store.remove_role_instance(key, group_name, &role.name, role_index).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, PodSpec};
    use modelserving_shared::api::{InferGroupTemplate, RecoveryPolicy, RolloutStrategy};
    use modelserving_shared::api::ModelServingSpec;
    use modelserving_shared::api::RoleSpec;
    use modelserving_shared::k8s::api::IntoApi;

    fn role(name: &str, replicas: i32, worker_replicas: i32) -> RoleSpec {
        RoleSpec {
            name: name.to_string(),
            replicas,
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

    fn ms(name: &str, replicas: i32, roles: Vec<RoleSpec>) -> ModelServing {
        let mut m = ModelServing::new(
            name,
            ModelServingSpec {
                replicas,
                template: InferGroupTemplate {
                    roles,
                    gang_schedule: None,
                    restart_grace_period_seconds: 0,
                },
                rollout_strategy: RolloutStrategy::default(),
                recovery_policy: RecoveryPolicy::None,
                scheduler_name: "modelserving-scheduler".to_string(),
            },
        );
        m.metadata.namespace = Some("default".to_string());
        m.metadata.uid = Some("uid-1".to_string());
        m
    }

    #[tokio::test]
    async fn create_group_populates_store_for_every_role_instance() {
        let ctx = test_ctx();
        let ms = ms("test-mi", 1, vec![role("prefill", 2, 1)]);
        let key = store::ms_key("default", "test-mi");
        let ownership = OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".to_string(), "uid-1".to_string());
        create_group(ctx.clone(), "default", &ms, &ownership, &key, 0, "rev1", false)
            .await
            .unwrap();
        let groups = ctx.store.groups(&key).await;
        let group = groups.get("test-mi-0").unwrap();
        let role = group.roles.get("prefill").unwrap();
        assert_eq!(role.instances.len(), 2);
    }

    #[tokio::test]
    async fn reconcile_group_roles_drops_instances_beyond_new_replicas() {
        let ctx = test_ctx();
        let key = store::ms_key("default", "test-mi");
        let ownership = OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".to_string(), "uid-1".to_string());

        // Start with `prefill.replicas = 3` (role instances 0, 1, 2).
        let wide_ms = ms("test-mi", 1, vec![role("prefill", 3, 0)]);
        create_group(ctx.clone(), "default", &wide_ms, &ownership, &key, 0, "rev1", false)
            .await
            .unwrap();
        let groups = ctx.store.groups(&key).await;
        assert_eq!(groups["test-mi-0"].roles["prefill"].instances.len(), 3);

        // Narrow to `prefill.replicas = 1` (spec.md §8 scenario 4, "Role
        // scale-down"): instances 1 and 2 must be torn down, 0 stays.
        let narrow_ms = ms("test-mi", 1, vec![role("prefill", 1, 0)]);
        reconcile_group_roles(ctx.clone(), "default", &narrow_ms, &ownership, &key, "test-mi-0", false)
            .await
            .unwrap();

        let groups = ctx.store.groups(&key).await;
        let instances = &groups["test-mi-0"].roles["prefill"].instances;
        assert_eq!(instances.len(), 1);
        assert!(instances.contains_key(&0));
    }

    #[tokio::test]
    async fn delete_group_clears_store_and_roles() {
        let ctx = test_ctx();
        let key = store::ms_key("default", "test-mi");
        let ownership = OwnershipInfo::new(OwnershipType::ModelServing, "test-mi".to_string(), "uid-1".to_string());
        let wide_ms = ms("test-mi", 1, vec![role("prefill", 2, 1)]);
        create_group(ctx.clone(), "default", &wide_ms, &ownership, &key, 0, "rev1", false)
            .await
            .unwrap();
        assert!(ctx.store.group(&key, "test-mi-0").await.is_some());

        delete_group(ctx.clone(), "default", &wide_ms, &ownership, &key, "test-mi-0", false)
            .await
            .unwrap();

        assert!(ctx.store.group(&key, "test-mi-0").await.is_none());
    }

    fn test_ctx() -> Arc<ControllerContext> {
        let (tx, _rx) = mpsc::channel(1);
        let mock = MockTestClient::default();
        Arc::new(ControllerContext::new(
            Arc::new(mock),
            "modelserving-scheduler".to_string(),
            tx,
        ))
    }

    // A minimal mock client good enough to exercise store mutation paths
    // that don't actually reach the API server in these tests (role
    // instance creation still issues create calls, so its `pods()`/
    // `services()` mocks must tolerate them).
    #[derive(Default)]
    struct MockTestClient;

    impl IntoApi<ModelServing> for MockTestClient {
        fn all(&self) -> Box<dyn Api<ModelServing>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
        fn namespaced(&self, _namespace: &str) -> Box<dyn Api<ModelServing>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
        fn default_namespaced(&self) -> Box<dyn Api<ModelServing>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
    }
    impl IntoApi<k8s_openapi::api::core::v1::Pod> for MockTestClient {
        fn all(&self) -> Box<dyn Api<k8s_openapi::api::core::v1::Pod>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
        fn namespaced(&self, _namespace: &str) -> Box<dyn Api<k8s_openapi::api::core::v1::Pod>> {
            let mut api = modelserving_shared::k8s::api::MockApi::new();
            api.expect_apply().returning(|pod, _| Ok(pod));
            api.expect_delete()
                .returning(|_| Ok(either::Either::Right(kube::core::Status::default())));
            Box::new(api)
        }
        fn default_namespaced(&self) -> Box<dyn Api<k8s_openapi::api::core::v1::Pod>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
    }
    impl IntoApi<k8s_openapi::api::core::v1::Service> for MockTestClient {
        fn all(&self) -> Box<dyn Api<k8s_openapi::api::core::v1::Service>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
        fn namespaced(&self, _namespace: &str) -> Box<dyn Api<k8s_openapi::api::core::v1::Service>> {
            let mut api = modelserving_shared::k8s::api::MockApi::new();
            api.expect_apply().returning(|svc, _| Ok(svc));
            api.expect_delete()
                .returning(|_| Ok(either::Either::Right(kube::core::Status::default())));
            Box::new(api)
        }
        fn default_namespaced(&self) -> Box<dyn Api<k8s_openapi::api::core::v1::Service>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
    }
    impl IntoApi<modelserving_shared::api::PodGroup> for MockTestClient {
        fn all(&self) -> Box<dyn Api<modelserving_shared::api::PodGroup>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
        fn namespaced(&self, _namespace: &str) -> Box<dyn Api<modelserving_shared::api::PodGroup>> {
            let mut api = modelserving_shared::k8s::api::MockApi::new();
            api.expect_delete()
                .returning(|_| Ok(either::Either::Right(kube::core::Status::default())));
            Box::new(api)
        }
        fn default_namespaced(&self) -> Box<dyn Api<modelserving_shared::api::PodGroup>> {
            Box::new(modelserving_shared::k8s::api::MockApi::new())
        }
    }
}
